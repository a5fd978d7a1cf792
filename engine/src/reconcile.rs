//! Reconciliation of pulled server state into the local store.
//!
//! # Algorithm
//!
//! 1. Index the pulled list by remote id (a repeated id keeps the last copy)
//! 2. For every pulled entity, pick an action against the local record
//!    holding that id: insert, replace, or keep the local copy
//! 3. For every local record whose remote id is missing from the pull,
//!    remove it unless it is dirty
//! 4. Apply the planned actions to the store
//!
//! Dirty records are never overwritten or removed by a pull, and local-only
//! records (never pushed) are never touched. [`ReconcileMode::ReplaceAll`]
//! exists to reproduce the older delete-and-reinsert behavior when comparing
//! against it; it discards unsynced edits.

use crate::entity::RemoteEntity;
use crate::error::Result;
use crate::{Entity, EntityStore, LocalId, RemoteId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How pulled data is merged into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Id-keyed diff; dirty and local-only records are preserved (default)
    #[default]
    PreserveDirty,
    /// Drop every local record and reinsert the pulled list
    ReplaceAll,
}

/// One planned change to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Action<T> {
    /// Pulled entity has no local counterpart
    Insert { remote_id: RemoteId, fields: T },
    /// Local clean copy differs from the server's
    Replace { local_id: LocalId, fields: T },
    /// Local clean copy already matches
    Unchanged { local_id: LocalId },
    /// Local copy has unsynced edits; the server's copy is ignored
    KeepDirty { local_id: LocalId },
    /// Local copy is deleted and the delete has not reached the server yet
    KeepPendingDelete { local_id: LocalId },
    /// The server no longer has this entity
    Remove { local_id: LocalId },
}

/// Summary of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    /// Dirty records the pull did not touch
    pub kept_dirty: Vec<LocalId>,
    pub kept_pending_delete: usize,
}

impl ReconcileReport {
    /// Number of records whose state changed.
    pub fn changed(&self) -> usize {
        self.inserted + self.updated + self.removed
    }
}

/// Merges pulled entities into a store.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    mode: ReconcileMode,
}

impl Reconciler {
    pub fn new(mode: ReconcileMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ReconcileMode {
        self.mode
    }

    /// Decide what to do with each pulled and local entity without changing
    /// anything.
    pub fn plan<T: Entity>(
        &self,
        store: &EntityStore<T>,
        pulled: Vec<RemoteEntity<T>>,
    ) -> Vec<Action<T>> {
        let pulled = index_pulled(pulled);
        match self.mode {
            ReconcileMode::PreserveDirty => plan_preserving(store, pulled),
            ReconcileMode::ReplaceAll => plan_replace_all(store, pulled),
        }
    }

    /// Plan and apply.
    pub fn reconcile<T: Entity>(
        &self,
        store: &mut EntityStore<T>,
        pulled: Vec<RemoteEntity<T>>,
    ) -> Result<ReconcileReport> {
        let actions = self.plan(store, pulled);
        apply(store, actions)
    }
}

fn index_pulled<T: Entity>(pulled: Vec<RemoteEntity<T>>) -> BTreeMap<RemoteId, T> {
    let mut indexed = BTreeMap::new();
    for entity in pulled {
        if indexed.insert(entity.id, entity.fields).is_some() {
            tracing::warn!(
                collection = T::COLLECTION,
                remote_id = entity.id,
                "pull returned the same id twice, keeping the last copy"
            );
        }
    }
    indexed
}

fn plan_preserving<T: Entity>(
    store: &EntityStore<T>,
    pulled: BTreeMap<RemoteId, T>,
) -> Vec<Action<T>> {
    let mut actions = Vec::with_capacity(pulled.len());

    // Local records the server no longer lists
    for record in store.records() {
        let Some(remote_id) = record.remote_id() else {
            continue;
        };
        if pulled.contains_key(&remote_id) {
            continue;
        }
        let local_id = record.local_id();
        if record.is_dirty() && !record.is_pending_delete() {
            actions.push(Action::KeepDirty { local_id });
        } else {
            actions.push(Action::Remove { local_id });
        }
    }

    for (remote_id, fields) in pulled {
        let action = match store.get_by_remote(remote_id) {
            None => Action::Insert { remote_id, fields },
            Some(record) if record.is_pending_delete() => Action::KeepPendingDelete {
                local_id: record.local_id(),
            },
            Some(record) if record.is_dirty() => Action::KeepDirty {
                local_id: record.local_id(),
            },
            Some(record) if record.fields() == &fields => Action::Unchanged {
                local_id: record.local_id(),
            },
            Some(record) => Action::Replace {
                local_id: record.local_id(),
                fields,
            },
        };
        actions.push(action);
    }

    actions
}

fn plan_replace_all<T: Entity>(
    store: &EntityStore<T>,
    pulled: BTreeMap<RemoteId, T>,
) -> Vec<Action<T>> {
    store
        .records()
        .map(|record| Action::Remove {
            local_id: record.local_id(),
        })
        .chain(
            pulled
                .into_iter()
                .map(|(remote_id, fields)| Action::Insert { remote_id, fields }),
        )
        .collect()
}

fn apply<T: Entity>(store: &mut EntityStore<T>, actions: Vec<Action<T>>) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    // Removals first so a reinserted id is free again.
    let (removals, rest): (Vec<_>, Vec<_>) = actions
        .into_iter()
        .partition(|a| matches!(a, Action::Remove { .. }));

    for action in removals.into_iter().chain(rest) {
        match action {
            Action::Remove { local_id } => {
                if let Some(record) = store.purge(local_id) {
                    if record.is_dirty() {
                        tracing::warn!(
                            collection = T::COLLECTION,
                            %local_id,
                            remote_id = ?record.remote_id(),
                            "discarding unsynced edits"
                        );
                    }
                    report.removed += 1;
                }
            }
            Action::Insert { remote_id, fields } => {
                store.insert_remote(remote_id, fields)?;
                report.inserted += 1;
            }
            Action::Replace { local_id, fields } => {
                if store.replace_fields(local_id, fields)? {
                    report.updated += 1;
                } else {
                    report.unchanged += 1;
                }
            }
            Action::Unchanged { .. } => report.unchanged += 1,
            Action::KeepDirty { local_id } => report.kept_dirty.push(local_id),
            Action::KeepPendingDelete { .. } => report.kept_pending_delete += 1,
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Campaign;

    fn pulled(entries: &[(RemoteId, &str)]) -> Vec<RemoteEntity<Campaign>> {
        entries
            .iter()
            .map(|(id, title)| RemoteEntity::new(*id, Campaign::titled(*title)))
            .collect()
    }

    #[test]
    fn clean_records_take_server_values() {
        let mut store = EntityStore::new();
        let id = store.insert_remote(1, Campaign::titled("Old")).unwrap();

        let report = Reconciler::default()
            .reconcile(&mut store, pulled(&[(1, "Server")]))
            .unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(store.get(id).unwrap().fields().title, "Server");
    }

    #[test]
    fn dirty_records_are_kept() {
        let mut store = EntityStore::new();
        let id = store.insert_remote(7, Campaign::titled("Synced")).unwrap();
        store.update(id, |c| c.title = "Old".into()).unwrap();

        let report = Reconciler::default()
            .reconcile(&mut store, pulled(&[(7, "Server")]))
            .unwrap();

        assert_eq!(report.kept_dirty, vec![id]);
        let record = store.get(id).unwrap();
        assert_eq!(record.fields().title, "Old");
        assert!(record.is_dirty());
    }

    #[test]
    fn missing_ids_are_removed_unless_dirty() {
        let mut store = EntityStore::new();
        let clean = store.insert_remote(1, Campaign::titled("Clean")).unwrap();
        let dirty = store.insert_remote(2, Campaign::titled("Dirty")).unwrap();
        store.mark_dirty(dirty).unwrap();
        let draft = store.create(Campaign::titled("Draft"));

        let report = Reconciler::default()
            .reconcile(&mut store, Vec::new())
            .unwrap();

        assert_eq!(report.removed, 1);
        assert!(store.get(clean).is_none());
        assert!(store.get(dirty).is_some());
        assert!(store.get(draft).is_some());
    }

    #[test]
    fn new_server_entities_are_inserted_clean() {
        let mut store: EntityStore<Campaign> = EntityStore::new();

        let report = Reconciler::default()
            .reconcile(&mut store, pulled(&[(4, "Four"), (5, "Five")]))
            .unwrap();

        assert_eq!(report.inserted, 2);
        assert!(store.dirty().is_empty());
        assert_eq!(store.get_by_remote(5).unwrap().fields().title, "Five");
    }

    #[test]
    fn tombstones_survive_pull() {
        let mut store = EntityStore::new();
        let id = store.insert_remote(3, Campaign::titled("Doomed")).unwrap();
        store.delete(id).unwrap();

        let report = Reconciler::default()
            .reconcile(&mut store, pulled(&[(3, "Doomed")]))
            .unwrap();

        assert_eq!(report.kept_pending_delete, 1);
        assert!(store.get_including_deleted(id).unwrap().is_pending_delete());
        assert!(store.get(id).is_none());
    }

    #[test]
    fn tombstone_absent_from_pull_is_purged() {
        let mut store = EntityStore::new();
        let id = store.insert_remote(3, Campaign::titled("Doomed")).unwrap();
        store.delete(id).unwrap();

        Reconciler::default()
            .reconcile(&mut store, Vec::new())
            .unwrap();

        assert!(store.get_including_deleted(id).is_none());
    }

    #[test]
    fn duplicate_pulled_ids_keep_last() {
        let mut store: EntityStore<Campaign> = EntityStore::new();

        Reconciler::default()
            .reconcile(&mut store, pulled(&[(1, "First"), (1, "Second")]))
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get_by_remote(1).unwrap().fields().title, "Second");
    }

    #[test]
    fn unchanged_records_are_left_alone() {
        let mut store = EntityStore::new();
        let id = store.insert_remote(1, Campaign::titled("Same")).unwrap();
        let (_, mut rx) = store.subscribe(crate::Interest::Entity(id));

        let report = Reconciler::default()
            .reconcile(&mut store, pulled(&[(1, "Same")]))
            .unwrap();

        assert_eq!(report.unchanged, 1);
        assert_eq!(report.changed(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn replace_all_discards_dirty_edits() {
        let mut store = EntityStore::new();
        let id = store.insert_remote(7, Campaign::titled("Synced")).unwrap();
        store.update(id, |c| c.title = "Old".into()).unwrap();
        store.create(Campaign::titled("Draft"));

        let report = Reconciler::new(ReconcileMode::ReplaceAll)
            .reconcile(&mut store, pulled(&[(7, "Server")]))
            .unwrap();

        assert_eq!(report.removed, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(store.len(), 1);
        let record = store.get_by_remote(7).unwrap();
        assert_eq!(record.fields().title, "Server");
        assert!(!record.is_dirty());
    }

    #[test]
    fn plan_does_not_touch_store() {
        let mut store = EntityStore::new();
        store.insert_remote(1, Campaign::titled("Old")).unwrap();

        let actions = Reconciler::default().plan(&store, pulled(&[(1, "New"), (2, "Two")]));

        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], Action::Replace { .. }));
        assert!(matches!(actions[1], Action::Insert { remote_id: 2, .. }));
        assert_eq!(store.get_by_remote(1).unwrap().fields().title, "Old");
    }

    mod property_tests {
        use super::*;
        use crate::entity::Record;
        use proptest::prelude::*;
        use std::collections::{HashMap, HashSet};

        #[derive(Debug, Clone)]
        enum Local {
            Absent,
            Clean(String),
            Dirty(String),
            Tombstone,
        }

        fn arb_local() -> impl Strategy<Value = Local> {
            prop_oneof![
                Just(Local::Absent),
                "[a-z]{1,6}".prop_map(Local::Clean),
                "[a-z]{1,6}".prop_map(Local::Dirty),
                Just(Local::Tombstone),
            ]
        }

        fn build_store(locals: &[Local]) -> EntityStore<Campaign> {
            let mut store = EntityStore::new();
            for (i, state) in locals.iter().enumerate() {
                let id = i as RemoteId + 1;
                match state {
                    Local::Absent => {}
                    Local::Clean(title) => {
                        store.insert_remote(id, Campaign::titled(title.as_str())).unwrap();
                    }
                    Local::Dirty(title) => {
                        let local_id = store.insert_remote(id, Campaign::titled("base")).unwrap();
                        store.update(local_id, |c| c.title = title.clone()).unwrap();
                    }
                    Local::Tombstone => {
                        let local_id = store.insert_remote(id, Campaign::titled("gone")).unwrap();
                        store.delete(local_id).unwrap();
                    }
                }
            }
            store
        }

        proptest! {
            #[test]
            fn prop_pull_never_discards_dirty(
                locals in prop::collection::vec(arb_local(), 1..12),
                server in prop::collection::vec(prop::option::of("[a-z]{1,6}"), 1..12),
                drafts in 0usize..3,
            ) {
                let mut store = build_store(&locals);
                let draft_ids: Vec<_> = (0..drafts)
                    .map(|i| store.create(Campaign::titled(format!("draft {i}"))))
                    .collect();

                let before: HashMap<RemoteId, Record<Campaign>> = store
                    .records()
                    .filter_map(|r| r.remote_id().map(|id| (id, r.clone())))
                    .collect();
                let pulled: Vec<_> = server
                    .iter()
                    .enumerate()
                    .filter_map(|(i, title)| {
                        title
                            .as_ref()
                            .map(|t| RemoteEntity::new(i as RemoteId + 1, Campaign::titled(t.as_str())))
                    })
                    .collect();
                let on_server: HashMap<RemoteId, Campaign> =
                    pulled.iter().map(|e| (e.id, e.fields.clone())).collect();

                Reconciler::default().reconcile(&mut store, pulled).unwrap();

                for (id, old) in &before {
                    let now = store.get_by_remote(*id);
                    if old.is_dirty() && !old.is_pending_delete() {
                        let now = now.unwrap();
                        prop_assert_eq!(now.fields(), old.fields());
                        prop_assert!(now.is_dirty());
                    } else if !on_server.contains_key(id) {
                        prop_assert!(now.is_none());
                    }
                }

                for (id, fields) in &on_server {
                    let protected = before
                        .get(id)
                        .is_some_and(|r| r.is_dirty() || r.is_pending_delete());
                    if !protected {
                        let now = store.get_by_remote(*id).unwrap();
                        prop_assert_eq!(now.fields(), fields);
                        prop_assert!(!now.is_dirty());
                    }
                }

                for draft in &draft_ids {
                    prop_assert!(store.get(*draft).is_some());
                }

                let mut seen = HashSet::new();
                for record in store.records() {
                    if let Some(id) = record.remote_id() {
                        prop_assert!(seen.insert(id));
                    }
                }
            }

            #[test]
            fn prop_reconcile_is_idempotent(
                locals in prop::collection::vec(arb_local(), 1..10),
                server in prop::collection::vec(prop::option::of("[a-z]{1,6}"), 1..10),
            ) {
                let mut store = build_store(&locals);
                let pulled: Vec<_> = server
                    .iter()
                    .enumerate()
                    .filter_map(|(i, title)| {
                        title
                            .as_ref()
                            .map(|t| RemoteEntity::new(i as RemoteId + 1, Campaign::titled(t.as_str())))
                    })
                    .collect();

                Reconciler::default().reconcile(&mut store, pulled.clone()).unwrap();
                let second = Reconciler::default().reconcile(&mut store, pulled).unwrap();

                prop_assert_eq!(second.changed(), 0);
            }
        }
    }
}
