//! The sync cycle for one collection.
//!
//! A cycle runs four phases in order:
//!
//! 1. **Deletes** - send every tombstone as a remote delete
//! 2. **Pushes** - send every dirty record, a create if it has no remote id
//!    and an update otherwise
//! 3. **Pull** - fetch the server's full list
//! 4. **Reconcile** - merge the list into the store
//!
//! Phases 1 and 2 are skipped when the remote cannot be contacted at all.
//! Failures in those phases, including server answers the store refuses,
//! are recorded per record and never abort the cycle. A failed pull aborts
//! before anything is merged. A file-backed store is written after every
//! acknowledgment and after the merge.
//!
//! Remote calls are issued one at a time and the store lock is never held
//! across one, so the UI can keep editing while a cycle runs. Cycles for the
//! same collection are serialized: a second call to [`SyncCoordinator::sync`]
//! waits for the running one to finish and then runs in full.

use crate::error::{PushError, SyncError};
use crate::operation::{PushOp, PushPlan};
use crate::reconcile::{ReconcileMode, ReconcileReport, Reconciler};
use crate::remote::RemoteClient;
use crate::{Entity, LocalId, RemoteId, Revision, SharedStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Knobs for a coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    pub reconcile_mode: ReconcileMode,
}

/// A remote write that did not go through.
#[derive(Debug, Clone, PartialEq)]
pub struct PushFailure {
    pub local_id: LocalId,
    pub remote_id: Option<RemoteId>,
    /// "create", "update" or "delete"
    pub op: &'static str,
    pub error: PushError,
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// The reachability check failed, so nothing was sent
    pub offline: bool,
    pub created: usize,
    /// Successful updates
    pub pushed: usize,
    /// Tombstones resolved
    pub deleted: usize,
    /// Acknowledged records that were edited again while in flight
    pub requeued: usize,
    pub push_failures: Vec<PushFailure>,
    pub reconcile: ReconcileReport,
}

impl SyncReport {
    /// True if any remote call was rejected for missing credentials.
    pub fn requires_login(&self) -> bool {
        self.push_failures
            .iter()
            .any(|f| f.error.is_not_authenticated())
    }

    /// Everything sent was accepted.
    pub fn is_clean(&self) -> bool {
        !self.offline && self.push_failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ack {
    Clean,
    /// Edited again while the push was in flight
    StillDirty,
    /// Gone from the store
    Missing,
}

/// Runs sync cycles for the collection of `T`.
pub struct SyncCoordinator<T: Entity, R: RemoteClient> {
    store: SharedStore<T>,
    remote: Arc<R>,
    options: SyncOptions,
    /// Held for the duration of a cycle; tokio's mutex is fair, so waiting
    /// callers run in arrival order.
    cycle: Mutex<()>,
}

impl<T: Entity, R: RemoteClient> SyncCoordinator<T, R> {
    pub fn new(store: SharedStore<T>, remote: Arc<R>) -> Self {
        Self::with_options(store, remote, SyncOptions::default())
    }

    pub fn with_options(store: SharedStore<T>, remote: Arc<R>, options: SyncOptions) -> Self {
        Self {
            store,
            remote,
            options,
            cycle: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &SharedStore<T> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn options(&self) -> SyncOptions {
        self.options
    }

    /// True while a cycle holds the lock.
    pub fn is_syncing(&self) -> bool {
        self.cycle.try_lock().is_err()
    }

    /// Run one full cycle.
    ///
    /// Only a failed pull (or a broken store invariant) is returned as an
    /// error. Push failures are reported in [`SyncReport::push_failures`]
    /// and leave the affected records dirty for the next cycle.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let _cycle = self.cycle.lock().await;
        let collection = T::COLLECTION;
        let mut report = SyncReport::default();

        let plan = PushPlan::from_store(&*self.store.lock().await);
        tracing::debug!(
            collection,
            deletes = plan.deletes.len(),
            pushes = plan.pushes.len(),
            "sync cycle started"
        );

        if !plan.is_empty() {
            if self.remote.is_reachable().await {
                self.run_deletes(plan.deletes, &mut report).await;
                self.run_pushes(plan.pushes, &mut report).await;
            } else {
                tracing::info!(
                    collection,
                    pending = plan.len(),
                    "remote unreachable, skipping push"
                );
                report.offline = true;
            }
        }

        report.reconcile = self.pull().await?;

        tracing::info!(
            collection,
            created = report.created,
            pushed = report.pushed,
            deleted = report.deleted,
            failed = report.push_failures.len(),
            inserted = report.reconcile.inserted,
            updated = report.reconcile.updated,
            removed = report.reconcile.removed,
            kept_dirty = report.reconcile.kept_dirty.len(),
            "sync cycle finished"
        );
        Ok(report)
    }

    /// Pull and reconcile without pushing.
    pub async fn refresh(&self) -> Result<ReconcileReport, SyncError> {
        let _cycle = self.cycle.lock().await;
        self.pull().await
    }

    // ---------------------------------------------------------------------
    // Phases
    // ---------------------------------------------------------------------

    async fn run_deletes(&self, deletes: Vec<PushOp<T>>, report: &mut SyncReport) {
        for op in deletes {
            let PushOp::Delete { local_id, remote_id } = op else {
                continue;
            };

            match self.remote.delete::<T>(remote_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!(
                        collection = T::COLLECTION,
                        %local_id,
                        remote_id,
                        "already deleted remotely"
                    );
                }
                Err(error) => {
                    self.record_failure(report, local_id, Some(remote_id), "delete", error.into());
                    continue;
                }
            }

            let mut store = self.store.lock().await;
            store.purge(local_id);
            store.write_through();
            report.deleted += 1;
        }
    }

    async fn run_pushes(&self, pushes: Vec<PushOp<T>>, report: &mut SyncReport) {
        for op in pushes {
            match op {
                PushOp::Create {
                    local_id,
                    revision,
                    payload,
                } => {
                    self.push_create(local_id, revision, &payload, report).await;
                }
                PushOp::Update {
                    local_id,
                    remote_id,
                    revision,
                    payload,
                } => match self.remote.update(remote_id, &payload).await {
                    Ok(stored) => {
                        match self
                            .acknowledge(local_id, revision, None, &payload, &stored.fields)
                            .await
                        {
                            Ok(Ack::Clean) => report.pushed += 1,
                            Ok(Ack::StillDirty) => {
                                report.pushed += 1;
                                report.requeued += 1;
                            }
                            Ok(Ack::Missing) => report.pushed += 1,
                            Err(error) => self.record_failure(
                                report,
                                local_id,
                                Some(remote_id),
                                "update",
                                PushError::Rejected(error),
                            ),
                        }
                    }
                    Err(e) if e.is_not_found() => {
                        // Deleted on the server while edited here; the local
                        // edit wins and the record is created again.
                        tracing::info!(
                            collection = T::COLLECTION,
                            %local_id,
                            remote_id,
                            "record deleted remotely while dirty, recreating"
                        );
                        self.push_create(local_id, revision, &payload, report).await;
                    }
                    Err(error) => {
                        self.record_failure(report, local_id, Some(remote_id), "update", error.into());
                    }
                },
                PushOp::Delete { .. } => {}
            }
        }
    }

    async fn push_create(
        &self,
        local_id: LocalId,
        revision: Revision,
        payload: &T,
        report: &mut SyncReport,
    ) {
        let created = match self.remote.create(payload).await {
            Ok(created) => created,
            Err(error) => {
                self.record_failure(report, local_id, None, "create", error.into());
                return;
            }
        };

        let ack = self
            .acknowledge(local_id, revision, Some(created.id), payload, &created.fields)
            .await;
        match ack {
            Ok(Ack::Clean) => report.created += 1,
            Ok(Ack::StillDirty) => {
                report.created += 1;
                report.requeued += 1;
            }
            Ok(Ack::Missing) => {
                // Deleted locally while the create was in flight.
                tracing::info!(
                    collection = T::COLLECTION,
                    %local_id,
                    remote_id = created.id,
                    "record deleted during create, removing remote copy"
                );
                self.remove_orphan(local_id, created.id, report).await;
            }
            Err(error) => {
                // The new remote copy cannot be attached to this record. Drop
                // it so the record is created again once the store agrees.
                self.record_failure(report, local_id, None, "create", PushError::Rejected(error));
                self.remove_orphan(local_id, created.id, report).await;
            }
        }
    }

    async fn remove_orphan(&self, local_id: LocalId, remote_id: RemoteId, report: &mut SyncReport) {
        if let Err(error) = self.remote.delete::<T>(remote_id).await {
            self.record_failure(report, local_id, Some(remote_id), "delete", error.into());
        }
    }

    /// Apply a successful push to the store and persist it.
    async fn acknowledge(
        &self,
        local_id: LocalId,
        revision: Revision,
        remote_id: Option<RemoteId>,
        sent: &T,
        stored: &T,
    ) -> Result<Ack, StoreError> {
        let mut store = self.store.lock().await;
        let ack = match store.acknowledge_push(local_id, revision, remote_id, sent, stored) {
            Ok(true) => Ack::Clean,
            Ok(false) => {
                tracing::debug!(
                    collection = T::COLLECTION,
                    %local_id,
                    "edited during push, staying dirty"
                );
                Ack::StillDirty
            }
            Err(StoreError::NotFound(_)) => return Ok(Ack::Missing),
            Err(e) => return Err(e),
        };
        store.write_through();
        Ok(ack)
    }

    async fn pull(&self) -> Result<ReconcileReport, SyncError> {
        let pulled = self.remote.fetch_all::<T>().await.map_err(|error| {
            tracing::warn!(collection = T::COLLECTION, %error, "pull failed");
            SyncError::Pull(error)
        })?;

        tracing::debug!(
            collection = T::COLLECTION,
            count = pulled.len(),
            "pulled remote state"
        );

        let mut store = self.store.lock().await;
        let report = Reconciler::new(self.options.reconcile_mode).reconcile(&mut store, pulled)?;
        store.write_through();
        Ok(report)
    }

    fn record_failure(
        &self,
        report: &mut SyncReport,
        local_id: LocalId,
        remote_id: Option<RemoteId>,
        op: &'static str,
        error: PushError,
    ) {
        tracing::warn!(
            collection = T::COLLECTION,
            %local_id,
            ?remote_id,
            op,
            %error,
            "push failed, record stays pending"
        );
        report.push_failures.push(PushFailure {
            local_id,
            remote_id,
            op,
            error,
        });
    }
}
