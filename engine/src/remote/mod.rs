//! Remote client façade.
//!
//! The coordinator talks to the service only through [`RemoteClient`]. Two
//! implementations ship with the crate: [`HttpRemote`] for the real REST API
//! and [`MemoryRemote`] for tests and offline demos.

mod http;
mod memory;

pub use http::HttpRemote;
pub use memory::{Call, MemoryRemote, RemoteOp};

use crate::entity::RemoteEntity;
use crate::{Entity, RemoteError, RemoteId};
use async_trait::async_trait;

/// Result type for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// CRUD surface of the remote service, per entity collection.
#[async_trait]
pub trait RemoteClient: Send + Sync + 'static {
    /// `GET /{collection}` - the server's full list.
    async fn fetch_all<T: Entity>(&self) -> RemoteResult<Vec<RemoteEntity<T>>>;

    /// `GET /{collection}/{id}`
    async fn fetch_one<T: Entity>(&self, id: RemoteId) -> RemoteResult<RemoteEntity<T>>;

    /// `POST /{collection}` - returns the stored entity with its new id.
    async fn create<T: Entity>(&self, payload: &T) -> RemoteResult<RemoteEntity<T>>;

    /// `PUT /{collection}/{id}` - full replacement.
    async fn update<T: Entity>(&self, id: RemoteId, payload: &T) -> RemoteResult<RemoteEntity<T>>;

    /// `DELETE /{collection}/{id}`
    async fn delete<T: Entity>(&self, id: RemoteId) -> RemoteResult<()>;

    /// Cheap connectivity check run before the push phase. False only when
    /// the service cannot be contacted at all.
    async fn is_reachable(&self) -> bool {
        true
    }
}
