//! Error types for the Grimoire engine.

use crate::{LocalId, RemoteId};
use thiserror::Error;

/// Errors surfaced by a [`RemoteClient`](crate::RemoteClient).
///
/// `NotAuthenticated` is kept apart from `ServerError` so callers can drop
/// into a logged-out state without string matching.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("decoding failed: {0}")]
    DecodingFailed(String),

    #[error("server error: status {0}")]
    ServerError(u16),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("no data in response")]
    NoData,
}

impl RemoteError {
    /// Whether the server reported that the target does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::ServerError(404))
    }
}

/// Errors from the local entity store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("entity not found: {0}")]
    NotFound(LocalId),

    #[error("remote id {remote_id} already belongs to local entity {owner}")]
    DuplicateRemoteId { remote_id: RemoteId, owner: LocalId },

    #[error("entity {0} is pending deletion")]
    PendingDelete(LocalId),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("snapshot collection mismatch: expected {expected}, got {actual}")]
    CollectionMismatch { expected: String, actual: String },

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Why a single remote write did not stick.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PushError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The server accepted the write but its answer clashes with the store,
    /// e.g. it handed out an id another local record still holds.
    #[error("response rejected by store: {0}")]
    Rejected(StoreError),
}

impl PushError {
    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, PushError::Remote(RemoteError::NotAuthenticated))
    }
}

/// Errors that abort a sync cycle.
///
/// Push failures never show up here; they are reported per entity in the
/// [`SyncReport`](crate::SyncReport).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("pull failed: {0}")]
    Pull(RemoteError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Whether the cycle failed because the credentials were rejected.
    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, SyncError::Pull(RemoteError::NotAuthenticated))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn error_display() {
        let err = RemoteError::ServerError(500);
        assert_eq!(err.to_string(), "server error: status 500");

        let err = RemoteError::NotAuthenticated;
        assert_eq!(err.to_string(), "not authenticated");

        let owner = Uuid::nil();
        let err = StoreError::DuplicateRemoteId {
            remote_id: 7,
            owner,
        };
        assert_eq!(
            err.to_string(),
            format!("remote id 7 already belongs to local entity {owner}")
        );
    }

    #[test]
    fn not_found_detection() {
        assert!(RemoteError::ServerError(404).is_not_found());
        assert!(!RemoteError::ServerError(500).is_not_found());
        assert!(!RemoteError::NoData.is_not_found());
    }

    #[test]
    fn push_error_wraps_remote_errors() {
        let err: PushError = RemoteError::NotAuthenticated.into();
        assert!(err.is_not_authenticated());
        assert_eq!(err.to_string(), "not authenticated");

        let err = PushError::Rejected(StoreError::NotFound(Uuid::nil()));
        assert!(!err.is_not_authenticated());
    }

    #[test]
    fn pull_auth_failure_is_flagged() {
        assert!(SyncError::Pull(RemoteError::NotAuthenticated).is_not_authenticated());
        assert!(!SyncError::Pull(RemoteError::RequestFailed("reset".into())).is_not_authenticated());
    }
}
