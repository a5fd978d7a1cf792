//! Entity records and their sync metadata.
//!
//! A [`Record`] wraps the domain fields of an [`Entity`] together with the
//! state the sync engine needs: the server-assigned id (if any), the dirty
//! flag, the tombstone flag and a revision counter. Records are only ever
//! handed out by shared reference; all mutation goes through the
//! [`EntityStore`](crate::EntityStore) so the dirty flag cannot be bypassed.

use crate::{LocalId, RemoteId, Revision, Timestamp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use uuid::Uuid;

/// A top-level synchronized type (campaigns, characters).
pub trait Entity:
    Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Collection name, also the REST path segment (`/campaigns`).
    const COLLECTION: &'static str;

    /// Give ids to children that don't have one yet and point them at
    /// `parent_id`. Called by the service when it stores an entity.
    fn link_children(&mut self, _parent_id: RemoteId, _next_id: &mut dyn FnMut() -> RemoteId) {}

    /// Take over the child ids the server assigned when it stored `sent`,
    /// returned as `stored`. `self` is the current local copy, which may
    /// have been edited since `sent` was pushed.
    fn adopt_child_ids(&mut self, _sent: &Self, _stored: &Self) {}
}

/// Where the current field values of a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Edited locally
    Local,
    /// Written by a pull from the remote service
    Remote,
}

/// Metadata associated with a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// When the local record was created (milliseconds since epoch)
    pub created_at: Timestamp,
    /// When the fields last changed (milliseconds since epoch)
    pub updated_at: Timestamp,
    /// When the record was last confirmed by the remote service
    pub synced_at: Option<Timestamp>,
    /// Whether the current fields are a local edit or a pulled copy
    pub origin: Origin,
}

impl Metadata {
    fn new(timestamp: Timestamp, origin: Origin) -> Self {
        Self {
            created_at: timestamp,
            updated_at: timestamp,
            synced_at: match origin {
                Origin::Local => None,
                Origin::Remote => Some(timestamp),
            },
            origin,
        }
    }
}

/// A locally held entity plus its sync state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Entity")]
pub struct Record<T> {
    local_id: LocalId,
    remote_id: Option<RemoteId>,
    fields: T,
    dirty: bool,
    pending_delete: bool,
    revision: Revision,
    metadata: Metadata,
}

impl<T: Entity> Record<T> {
    /// A record created on this device; dirty and without a remote id.
    pub(crate) fn new_local(fields: T, timestamp: Timestamp) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            remote_id: None,
            fields,
            dirty: true,
            pending_delete: false,
            revision: 1,
            metadata: Metadata::new(timestamp, Origin::Local),
        }
    }

    /// A clean record inserted from a pull.
    pub(crate) fn from_remote(remote_id: RemoteId, fields: T, timestamp: Timestamp) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            remote_id: Some(remote_id),
            fields,
            dirty: false,
            pending_delete: false,
            revision: 0,
            metadata: Metadata::new(timestamp, Origin::Remote),
        }
    }

    pub fn local_id(&self) -> LocalId {
        self.local_id
    }

    pub fn remote_id(&self) -> Option<RemoteId> {
        self.remote_id
    }

    pub fn fields(&self) -> &T {
        &self.fields
    }

    /// True iff the local copy has edits the server has not acknowledged.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// True iff the record was deleted locally and the delete is not yet synced.
    pub fn is_pending_delete(&self) -> bool {
        self.pending_delete
    }

    /// Created locally and never accepted by the server.
    pub fn is_local_only(&self) -> bool {
        self.remote_id.is_none()
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Apply a local edit. Always marks the record dirty.
    pub(crate) fn mutate<R>(&mut self, f: impl FnOnce(&mut T) -> R, timestamp: Timestamp) -> R {
        let out = f(&mut self.fields);
        self.touch(timestamp);
        out
    }

    /// Idempotent: marking an already dirty record only bumps the revision.
    pub(crate) fn touch(&mut self, timestamp: Timestamp) {
        self.dirty = true;
        self.revision += 1;
        self.metadata.updated_at = timestamp;
        self.metadata.origin = Origin::Local;
    }

    pub(crate) fn mark_deleted(&mut self, timestamp: Timestamp) {
        self.pending_delete = true;
        self.metadata.updated_at = timestamp;
    }

    /// Server-assigned ids are not an edit: neither dirty nor revision move.
    pub(crate) fn adopt_child_ids(&mut self, sent: &T, stored: &T) {
        self.fields.adopt_child_ids(sent, stored);
    }

    pub(crate) fn set_remote_id(&mut self, remote_id: RemoteId) {
        self.remote_id = Some(remote_id);
    }

    pub(crate) fn clear_dirty(&mut self, timestamp: Timestamp) {
        self.dirty = false;
        self.metadata.synced_at = Some(timestamp);
    }

    /// Overwrite all fields with the server's copy.
    pub(crate) fn replace_from_remote(&mut self, fields: T, timestamp: Timestamp) {
        self.fields = fields;
        self.dirty = false;
        self.metadata.updated_at = timestamp;
        self.metadata.synced_at = Some(timestamp);
        self.metadata.origin = Origin::Remote;
    }
}

/// Wire shape of an entity: the server id next to the flattened fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "T: Entity")]
pub struct RemoteEntity<T> {
    pub id: RemoteId,
    #[serde(flatten)]
    pub fields: T,
}

impl<T: Entity> RemoteEntity<T> {
    pub fn new(id: RemoteId, fields: T) -> Self {
        Self { id, fields }
    }
}
