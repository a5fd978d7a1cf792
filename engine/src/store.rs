//! Store - the on-device collection of records for one entity type.
//!
//! The store is the only place records change. Local edits go through
//! [`EntityStore::update`], which sets the dirty flag in the same call; the
//! sync coordinator uses the crate-private methods to acknowledge pushes and
//! to apply pulled state.
//!
//! A store opened with [`EntityStore::open`] is backed by a file. Local
//! edits are written through as they happen; the coordinator persists after
//! every acknowledgment and after each reconciliation.

use crate::entity::Record;
use crate::error::Result;
use crate::notify::{ChangeKind, EventReceiver, Interest, Notifier, StoreEvent, SubscriptionId};
use crate::snapshot::StoreSnapshot;
use crate::{now, Entity, LocalId, RemoteId, Revision, StoreError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A store shared between the UI and the sync coordinator.
pub type SharedStore<T> = Arc<Mutex<EntityStore<T>>>;

/// Local records of one collection, keyed by local id.
#[derive(Debug)]
pub struct EntityStore<T: Entity> {
    records: HashMap<LocalId, Record<T>>,
    /// At most one local record per remote id
    by_remote: HashMap<RemoteId, LocalId>,
    notifier: Arc<Notifier>,
    /// Backing file, if any
    path: Option<PathBuf>,
}

impl<T: Entity> Default for EntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> EntityStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            by_remote: HashMap::new(),
            notifier: Arc::new(Notifier::new()),
            path: None,
        }
    }

    /// Open a file-backed store, restoring what was last written to `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = if path.exists() {
            Self::load(&path)?
        } else {
            Self::new()
        };
        store.path = Some(path);
        Ok(store)
    }

    /// The backing file of a store made by [`EntityStore::open`].
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create an empty store wrapped for sharing.
    pub fn shared() -> SharedStore<T> {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Wrap this store for sharing.
    pub fn into_shared(self) -> SharedStore<T> {
        Arc::new(Mutex::new(self))
    }

    pub fn collection(&self) -> &'static str {
        T::COLLECTION
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Get a record by local id. Tombstoned records are hidden.
    pub fn get(&self, local_id: LocalId) -> Option<&Record<T>> {
        self.records.get(&local_id).filter(|r| !r.is_pending_delete())
    }

    /// Get a record including tombstones.
    pub fn get_including_deleted(&self, local_id: LocalId) -> Option<&Record<T>> {
        self.records.get(&local_id)
    }

    /// Get the record holding a given server id.
    pub fn get_by_remote(&self, remote_id: RemoteId) -> Option<&Record<T>> {
        self.by_remote
            .get(&remote_id)
            .and_then(|local_id| self.records.get(local_id))
    }

    /// All visible records, oldest first.
    pub fn all(&self) -> Vec<&Record<T>> {
        self.query().all()
    }

    /// Records with unsynced edits (tombstones excluded).
    pub fn dirty(&self) -> Vec<&Record<T>> {
        self.query().dirty_only().all()
    }

    /// Records deleted locally whose delete has not reached the server.
    pub fn tombstones(&self) -> Vec<&Record<T>> {
        let mut tombstones: Vec<_> = self
            .records
            .values()
            .filter(|r| r.is_pending_delete())
            .collect();
        sort_by_creation(&mut tombstones);
        tombstones
    }

    /// Query visible records.
    pub fn query(&self) -> QueryBuilder<'_, T> {
        QueryBuilder::new(&self.records)
    }

    /// Count of visible records.
    pub fn len(&self) -> usize {
        self.records
            .values()
            .filter(|r| !r.is_pending_delete())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of records the next cycle has to push or delete.
    pub fn pending_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.is_dirty() || r.is_pending_delete())
            .count()
    }

    // ---------------------------------------------------------------------
    // Local mutations
    // ---------------------------------------------------------------------

    /// Create a record on this device. It is dirty and has no remote id
    /// until the next successful push.
    pub fn create(&mut self, fields: T) -> LocalId {
        let record = Record::new_local(fields, now());
        let local_id = record.local_id();
        self.records.insert(local_id, record);
        self.emit(local_id, None, ChangeKind::Created);
        self.write_through();
        local_id
    }

    /// Edit a record's fields. The dirty flag is set before this returns.
    pub fn update<R>(&mut self, local_id: LocalId, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let record = self.visible_mut(local_id)?;
        let out = record.mutate(f, now());
        let remote_id = record.remote_id();
        self.emit(local_id, remote_id, ChangeKind::Updated);
        self.write_through();
        Ok(out)
    }

    /// Flag a record as needing a push without changing its fields.
    pub fn mark_dirty(&mut self, local_id: LocalId) -> Result<()> {
        let record = self.visible_mut(local_id)?;
        record.touch(now());
        let remote_id = record.remote_id();
        self.emit(local_id, remote_id, ChangeKind::Updated);
        self.write_through();
        Ok(())
    }

    /// Delete a record locally.
    ///
    /// A record the server has never seen is dropped at once. Anything else
    /// becomes a tombstone that the next cycle sends as a remote delete.
    pub fn delete(&mut self, local_id: LocalId) -> Result<()> {
        let remote_id = self.visible_mut(local_id)?.remote_id();

        match remote_id {
            None => {
                self.records.remove(&local_id);
            }
            Some(_) => {
                if let Some(record) = self.records.get_mut(&local_id) {
                    record.mark_deleted(now());
                }
            }
        }

        self.emit(local_id, remote_id, ChangeKind::Deleted);
        self.write_through();
        Ok(())
    }

    fn visible_mut(&mut self, local_id: LocalId) -> Result<&mut Record<T>> {
        let record = self
            .records
            .get_mut(&local_id)
            .ok_or(StoreError::NotFound(local_id))?;
        if record.is_pending_delete() {
            return Err(StoreError::PendingDelete(local_id));
        }
        Ok(record)
    }

    // ---------------------------------------------------------------------
    // Subscriptions
    // ---------------------------------------------------------------------

    pub fn subscribe(&self, interest: Interest) -> (SubscriptionId, EventReceiver) {
        self.notifier.subscribe(interest)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    fn emit(&self, local_id: LocalId, remote_id: Option<RemoteId>, kind: ChangeKind) {
        self.notifier.notify(StoreEvent {
            collection: T::COLLECTION,
            local_id,
            remote_id,
            kind,
        });
    }

    // ---------------------------------------------------------------------
    // Sync-only mutations
    // ---------------------------------------------------------------------

    /// Record a successful push.
    ///
    /// `remote_id` is the id returned by a create. `sent` is the payload
    /// that was pushed and `stored` the server's copy of it; child ids the
    /// server assigned are taken over even if the record changed since. The
    /// dirty flag is cleared only if no edit landed while the push was in
    /// flight, i.e. the record still has the revision that was sent.
    /// Returns whether it was cleared.
    pub(crate) fn acknowledge_push(
        &mut self,
        local_id: LocalId,
        pushed_revision: Revision,
        remote_id: Option<RemoteId>,
        sent: &T,
        stored: &T,
    ) -> Result<bool> {
        if !self.records.contains_key(&local_id) {
            return Err(StoreError::NotFound(local_id));
        }

        if let Some(remote_id) = remote_id {
            self.assign_remote_id(local_id, remote_id)?;
        }

        let Some(record) = self.records.get_mut(&local_id) else {
            return Err(StoreError::NotFound(local_id));
        };
        record.adopt_child_ids(sent, stored);
        let cleared = record.revision() == pushed_revision;
        if cleared {
            record.clear_dirty(now());
        }
        let remote_id = record.remote_id();
        self.emit(local_id, remote_id, ChangeKind::Synced);
        Ok(cleared)
    }

    fn assign_remote_id(&mut self, local_id: LocalId, remote_id: RemoteId) -> Result<()> {
        if let Some(owner) = self.by_remote.get(&remote_id) {
            if *owner != local_id {
                return Err(StoreError::DuplicateRemoteId {
                    remote_id,
                    owner: *owner,
                });
            }
            return Ok(());
        }

        let record = self
            .records
            .get_mut(&local_id)
            .ok_or(StoreError::NotFound(local_id))?;
        if let Some(previous) = record.remote_id() {
            self.by_remote.remove(&previous);
        }
        record.set_remote_id(remote_id);
        self.by_remote.insert(remote_id, local_id);
        Ok(())
    }

    /// Insert a clean record received from the server.
    pub(crate) fn insert_remote(&mut self, remote_id: RemoteId, fields: T) -> Result<LocalId> {
        if let Some(owner) = self.by_remote.get(&remote_id) {
            return Err(StoreError::DuplicateRemoteId {
                remote_id,
                owner: *owner,
            });
        }
        let record = Record::from_remote(remote_id, fields, now());
        let local_id = record.local_id();
        self.records.insert(local_id, record);
        self.by_remote.insert(remote_id, local_id);
        self.emit(local_id, Some(remote_id), ChangeKind::Replaced);
        Ok(local_id)
    }

    /// Overwrite a record's fields with the server's copy.
    ///
    /// Returns false (and leaves the record alone) if the fields are already
    /// identical.
    pub(crate) fn replace_fields(&mut self, local_id: LocalId, fields: T) -> Result<bool> {
        let record = self
            .records
            .get_mut(&local_id)
            .ok_or(StoreError::NotFound(local_id))?;
        if record.fields() == &fields && !record.is_dirty() {
            return Ok(false);
        }
        record.replace_from_remote(fields, now());
        let remote_id = record.remote_id();
        self.emit(local_id, remote_id, ChangeKind::Replaced);
        Ok(true)
    }

    /// Drop a record entirely (remote deletion observed, or tombstone synced).
    pub(crate) fn purge(&mut self, local_id: LocalId) -> Option<Record<T>> {
        let record = self.records.remove(&local_id)?;
        if let Some(remote_id) = record.remote_id() {
            self.by_remote.remove(&remote_id);
        }
        self.emit(local_id, record.remote_id(), ChangeKind::Removed);
        Some(record)
    }

    /// Every record regardless of state, for reconciliation.
    pub(crate) fn records(&self) -> impl Iterator<Item = &Record<T>> {
        self.records.values()
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Export the current state, including dirty flags and tombstones.
    pub fn export_state(&self) -> StoreSnapshot<T> {
        let mut snapshot = StoreSnapshot::new(T::COLLECTION);
        for record in self.records.values() {
            snapshot.add_record(record.clone());
        }
        snapshot
    }

    /// Replace the current state with a snapshot.
    ///
    /// Subscriptions survive the import.
    pub fn import_state(&mut self, snapshot: StoreSnapshot<T>) -> Result<()> {
        snapshot.validate()?;

        let mut records = HashMap::with_capacity(snapshot.records.len());
        let mut by_remote = HashMap::new();
        for (local_id, record) in snapshot.records {
            if let Some(remote_id) = record.remote_id() {
                if let Some(owner) = by_remote.insert(remote_id, local_id) {
                    return Err(StoreError::DuplicateRemoteId { remote_id, owner });
                }
            }
            records.insert(local_id, record);
        }

        self.records = records;
        self.by_remote = by_remote;
        Ok(())
    }

    /// Write to the backing file. A no-op for stores without one.
    pub fn persist(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.save(path),
            None => Ok(()),
        }
    }

    /// Persist, logging instead of failing. The in-memory state stays
    /// authoritative and the next write retries.
    pub(crate) fn write_through(&self) {
        if let Err(error) = self.persist() {
            tracing::warn!(collection = T::COLLECTION, %error, "failed to persist store");
        }
    }

    /// Write the store to `path` as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.export_state().write_to(path)
    }

    /// Load a store previously written by [`EntityStore::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let snapshot = StoreSnapshot::read_from(path)?;
        let mut store = Self::new();
        store.import_state(snapshot)?;
        Ok(store)
    }
}

fn sort_by_creation<T: Entity>(records: &mut [&Record<T>]) {
    records.sort_by(|a, b| {
        a.metadata()
            .created_at
            .cmp(&b.metadata().created_at)
            .then_with(|| a.local_id().cmp(&b.local_id()))
    });
}

/// Builder for querying records in a store.
#[derive(Debug)]
pub struct QueryBuilder<'a, T: Entity> {
    records: &'a HashMap<LocalId, Record<T>>,
    include_deleted: bool,
    dirty_only: bool,
}

impl<'a, T: Entity> QueryBuilder<'a, T> {
    fn new(records: &'a HashMap<LocalId, Record<T>>) -> Self {
        Self {
            records,
            include_deleted: false,
            dirty_only: false,
        }
    }

    /// Include tombstoned records in results.
    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Only records with unsynced edits.
    pub fn dirty_only(mut self) -> Self {
        self.dirty_only = true;
        self
    }

    fn matching(&self) -> impl Iterator<Item = &'a Record<T>> + '_ {
        self.records.values().filter(move |r| {
            (self.include_deleted || !r.is_pending_delete()) && (!self.dirty_only || r.is_dirty())
        })
    }

    /// All matching records, oldest first.
    pub fn all(self) -> Vec<&'a Record<T>> {
        let mut records: Vec<_> = self.matching().collect();
        sort_by_creation(&mut records);
        records
    }

    pub fn count(self) -> usize {
        self.matching().count()
    }

    /// Matching records whose fields satisfy `predicate`, oldest first.
    pub fn filter<F>(self, predicate: F) -> Vec<&'a Record<T>>
    where
        F: Fn(&T) -> bool,
    {
        let mut records: Vec<_> = self.matching().filter(|r| predicate(r.fields())).collect();
        sort_by_creation(&mut records);
        records
    }
}
