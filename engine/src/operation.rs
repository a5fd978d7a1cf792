//! Outgoing operations planned from the store's sync state.
//!
//! Each cycle snapshots the pending work into a list of [`PushOp`]s while
//! holding the store lock, then releases the lock and sends them one by one.
//! Every op carries the revision it was built from so the acknowledgement
//! can tell whether the record changed in the meantime.

use crate::entity::Record;
use crate::{Entity, EntityStore, LocalId, RemoteId, Revision};

/// A single remote write.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOp<T> {
    /// Record has never been accepted by the server
    Create {
        local_id: LocalId,
        revision: Revision,
        payload: T,
    },
    /// Record exists remotely and has unsynced edits
    Update {
        local_id: LocalId,
        remote_id: RemoteId,
        revision: Revision,
        payload: T,
    },
    /// Record was deleted locally
    Delete {
        local_id: LocalId,
        remote_id: RemoteId,
    },
}

impl<T: Entity> PushOp<T> {
    pub fn local_id(&self) -> LocalId {
        match self {
            PushOp::Create { local_id, .. }
            | PushOp::Update { local_id, .. }
            | PushOp::Delete { local_id, .. } => *local_id,
        }
    }

    pub fn remote_id(&self) -> Option<RemoteId> {
        match self {
            PushOp::Create { .. } => None,
            PushOp::Update { remote_id, .. } | PushOp::Delete { remote_id, .. } => {
                Some(*remote_id)
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PushOp::Create { .. } => "create",
            PushOp::Update { .. } => "update",
            PushOp::Delete { .. } => "delete",
        }
    }

    /// Build the write a dirty record needs, from its current fields.
    fn for_dirty(record: &Record<T>) -> Self {
        match record.remote_id() {
            None => PushOp::Create {
                local_id: record.local_id(),
                revision: record.revision(),
                payload: record.fields().clone(),
            },
            Some(remote_id) => PushOp::Update {
                local_id: record.local_id(),
                remote_id,
                revision: record.revision(),
                payload: record.fields().clone(),
            },
        }
    }
}

/// Pending work for the next cycle: remote deletes first, then pushes.
#[derive(Debug, Clone, PartialEq)]
pub struct PushPlan<T> {
    pub deletes: Vec<PushOp<T>>,
    pub pushes: Vec<PushOp<T>>,
}

impl<T: Entity> PushPlan<T> {
    /// Snapshot the store's tombstones and dirty records.
    pub fn from_store(store: &EntityStore<T>) -> Self {
        let deletes = store
            .tombstones()
            .into_iter()
            .filter_map(|record| {
                record.remote_id().map(|remote_id| PushOp::Delete {
                    local_id: record.local_id(),
                    remote_id,
                })
            })
            .collect();

        let pushes = store.dirty().into_iter().map(PushOp::for_dirty).collect();

        Self { deletes, pushes }
    }

    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.pushes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deletes.len() + self.pushes.len()
    }
}
