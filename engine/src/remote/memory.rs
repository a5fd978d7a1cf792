//! In-memory remote service for tests and simulation.
//!
//! Behaves like the REST service (server-assigned ids, child ids, full
//! replacement on update) and lets callers inject failures per operation or
//! per entity id.

use super::{RemoteClient, RemoteResult};
use crate::entity::RemoteEntity;
use crate::{Entity, RemoteError, RemoteId};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Remote operation kinds, for failure injection and call logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    FetchAll,
    FetchOne,
    Create,
    Update,
    Delete,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: RemoteOp,
    pub collection: &'static str,
    pub id: Option<RemoteId>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    op: RemoteOp,
    /// Only calls targeting this id fail; `None` matches every call
    id: Option<RemoteId>,
    error: RemoteError,
    /// Remaining failures; `None` fails forever
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: HashMap<&'static str, BTreeMap<RemoteId, Value>>,
    next_id: RemoteId,
    next_child_id: RemoteId,
    failures: Vec<FailureRule>,
    calls: Vec<Call>,
    offline: bool,
    authenticated: bool,
}

impl MemoryState {
    fn take_failure(&mut self, op: RemoteOp, id: Option<RemoteId>) -> Option<RemoteError> {
        if self.offline {
            return Some(RemoteError::RequestFailed("offline".into()));
        }
        if !self.authenticated {
            return Some(RemoteError::NotAuthenticated);
        }

        let index = self
            .failures
            .iter()
            .position(|rule| rule.op == op && (rule.id.is_none() || rule.id == id))?;
        let rule = &mut self.failures[index];
        let error = rule.error.clone();
        let exhausted = match rule.remaining.as_mut() {
            Some(remaining) => {
                *remaining -= 1;
                *remaining == 0
            }
            None => false,
        };
        if exhausted {
            self.failures.remove(index);
        }
        Some(error)
    }

    fn store<T: Entity>(&mut self, id: RemoteId, mut fields: T) -> RemoteResult<RemoteEntity<T>> {
        let next_child_id = &mut self.next_child_id;
        fields.link_children(id, &mut || {
            *next_child_id += 1;
            *next_child_id
        });
        let value =
            serde_json::to_value(&fields).map_err(|e| RemoteError::DecodingFailed(e.to_string()))?;
        self.collections
            .entry(T::COLLECTION)
            .or_default()
            .insert(id, value);
        Ok(RemoteEntity::new(id, fields))
    }

    fn load<T: Entity>(&self, id: RemoteId) -> RemoteResult<RemoteEntity<T>> {
        let value = self
            .collections
            .get(T::COLLECTION)
            .and_then(|c| c.get(&id))
            .ok_or(RemoteError::ServerError(404))?;
        let fields = serde_json::from_value(value.clone())
            .map_err(|e| RemoteError::DecodingFailed(e.to_string()))?;
        Ok(RemoteEntity::new(id, fields))
    }
}

/// A fake remote service held entirely in memory.
#[derive(Debug)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
    latency: Mutex<Option<Duration>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                authenticated: true,
                ..MemoryState::default()
            }),
            latency: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---------------------------------------------------------------------
    // Server-side setup and inspection
    // ---------------------------------------------------------------------

    /// Put an entity on the server with a chosen id, bypassing the API.
    pub fn seed<T: Entity>(&self, id: RemoteId, fields: T) {
        let mut state = self.state();
        state.next_id = state.next_id.max(id);
        if let Err(e) = state.store(id, fields) {
            tracing::warn!(error = %e, "failed to seed memory remote");
        }
    }

    /// Delete an entity on the server, as another device would.
    pub fn remove<T: Entity>(&self, id: RemoteId) -> bool {
        self.state()
            .collections
            .get_mut(T::COLLECTION)
            .map(|c| c.remove(&id).is_some())
            .unwrap_or(false)
    }

    /// The server's current copy of an entity.
    pub fn get<T: Entity>(&self, id: RemoteId) -> Option<T> {
        self.state().load::<T>(id).ok().map(|e| e.fields)
    }

    /// Ids the server holds for `T`'s collection, ascending.
    pub fn ids<T: Entity>(&self) -> Vec<RemoteId> {
        self.state()
            .collections
            .get(T::COLLECTION)
            .map(|c| c.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    // ---------------------------------------------------------------------
    // Failure injection
    // ---------------------------------------------------------------------

    /// Fail the next `times` calls of `op`.
    pub fn fail_next(&self, op: RemoteOp, times: usize, error: RemoteError) {
        if times == 0 {
            return;
        }
        self.state().failures.push(FailureRule {
            op,
            id: None,
            error,
            remaining: Some(times),
        });
    }

    /// Fail every call of `op` targeting `id` until cleared.
    pub fn fail_id(&self, op: RemoteOp, id: RemoteId, error: RemoteError) {
        self.state().failures.push(FailureRule {
            op,
            id: Some(id),
            error,
            remaining: None,
        });
    }

    /// Fail every call of `op` until cleared.
    pub fn fail_always(&self, op: RemoteOp, error: RemoteError) {
        self.state().failures.push(FailureRule {
            op,
            id: None,
            error,
            remaining: None,
        });
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Simulate losing connectivity: reachability checks fail and every call errors.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Simulate an expired or revoked token.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.state().authenticated = authenticated;
    }

    /// Delay every call, to make cycles overlap in tests.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(|p| p.into_inner()) = latency;
    }

    async fn begin(
        &self,
        op: RemoteOp,
        collection: &'static str,
        id: Option<RemoteId>,
    ) -> RemoteResult<()> {
        let latency = *self.latency.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        state.calls.push(Call { op, collection, id });
        match state.take_failure(op, id) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteClient for MemoryRemote {
    async fn fetch_all<T: Entity>(&self) -> RemoteResult<Vec<RemoteEntity<T>>> {
        self.begin(RemoteOp::FetchAll, T::COLLECTION, None).await?;
        let state = self.state();
        let ids: Vec<RemoteId> = state
            .collections
            .get(T::COLLECTION)
            .map(|c| c.keys().copied().collect())
            .unwrap_or_default();
        ids.into_iter().map(|id| state.load(id)).collect()
    }

    async fn fetch_one<T: Entity>(&self, id: RemoteId) -> RemoteResult<RemoteEntity<T>> {
        self.begin(RemoteOp::FetchOne, T::COLLECTION, Some(id)).await?;
        self.state().load(id)
    }

    async fn create<T: Entity>(&self, payload: &T) -> RemoteResult<RemoteEntity<T>> {
        self.begin(RemoteOp::Create, T::COLLECTION, None).await?;
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        state.store(id, payload.clone())
    }

    async fn update<T: Entity>(&self, id: RemoteId, payload: &T) -> RemoteResult<RemoteEntity<T>> {
        self.begin(RemoteOp::Update, T::COLLECTION, Some(id)).await?;
        let mut state = self.state();
        let exists = state
            .collections
            .get(T::COLLECTION)
            .is_some_and(|c| c.contains_key(&id));
        if !exists {
            return Err(RemoteError::ServerError(404));
        }
        state.store(id, payload.clone())
    }

    async fn delete<T: Entity>(&self, id: RemoteId) -> RemoteResult<()> {
        self.begin(RemoteOp::Delete, T::COLLECTION, Some(id)).await?;
        let removed = self
            .state()
            .collections
            .get_mut(T::COLLECTION)
            .and_then(|c| c.remove(&id));
        match removed {
            Some(_) => Ok(()),
            None => Err(RemoteError::ServerError(404)),
        }
    }

    async fn is_reachable(&self) -> bool {
        !self.state().offline
    }
}
