//! Both synchronized collections behind one handle.

use crate::config::ClientConfig;
use crate::coordinator::{SyncCoordinator, SyncOptions, SyncReport};
use crate::error::{Result, SyncError};
use crate::model::{Campaign, Character};
use crate::remote::RemoteClient;
use crate::{Entity, EntityStore, SharedStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Per-collection results of [`Workspace::refresh_all`].
#[derive(Debug)]
pub struct WorkspaceReport {
    pub campaigns: std::result::Result<SyncReport, SyncError>,
    pub characters: std::result::Result<SyncReport, SyncError>,
}

impl WorkspaceReport {
    pub fn is_ok(&self) -> bool {
        self.campaigns.is_ok() && self.characters.is_ok()
    }

    /// True if either collection hit a 401, in its pushes or its pull.
    pub fn requires_login(&self) -> bool {
        [&self.campaigns, &self.characters]
            .into_iter()
            .any(|result| match result {
                Ok(report) => report.requires_login(),
                Err(e) => e.is_not_authenticated(),
            })
    }
}

/// The campaign and character stores with their coordinators.
pub struct Workspace<R: RemoteClient> {
    campaigns: SyncCoordinator<Campaign, R>,
    characters: SyncCoordinator<Character, R>,
}

impl<R: RemoteClient> Workspace<R> {
    /// Empty in-memory stores.
    pub fn new(remote: Arc<R>, options: SyncOptions) -> Self {
        Self::with_stores(EntityStore::shared(), EntityStore::shared(), remote, options)
    }

    pub fn with_stores(
        campaigns: SharedStore<Campaign>,
        characters: SharedStore<Character>,
        remote: Arc<R>,
        options: SyncOptions,
    ) -> Self {
        Self {
            campaigns: SyncCoordinator::with_options(campaigns, remote.clone(), options),
            characters: SyncCoordinator::with_options(characters, remote, options),
        }
    }

    /// Build from configuration. With `config.store_dir` set, both stores
    /// are file-backed: restored from there and kept up to date as edits and
    /// sync results land.
    pub fn open(remote: Arc<R>, config: &ClientConfig) -> Result<Self> {
        let options = SyncOptions {
            reconcile_mode: config.reconcile_mode,
        };
        let campaigns = open_store::<Campaign>(config.store_path(Campaign::COLLECTION))?;
        let characters = open_store::<Character>(config.store_path(Character::COLLECTION))?;

        Ok(Self::with_stores(
            campaigns.into_shared(),
            characters.into_shared(),
            remote,
            options,
        ))
    }

    pub fn campaigns(&self) -> &SyncCoordinator<Campaign, R> {
        &self.campaigns
    }

    pub fn characters(&self) -> &SyncCoordinator<Character, R> {
        &self.characters
    }

    /// Sync both collections concurrently. One collection failing does not
    /// stop the other.
    pub async fn refresh_all(&self) -> WorkspaceReport {
        let (campaigns, characters) = tokio::join!(self.campaigns.sync(), self.characters.sync());
        WorkspaceReport {
            campaigns,
            characters,
        }
    }

    /// Flush both stores to their backing files, surfacing write errors
    /// that write-through only logs. No-op for in-memory stores.
    pub async fn save(&self) -> Result<()> {
        self.campaigns.store().lock().await.persist()?;
        self.characters.store().lock().await.persist()?;
        Ok(())
    }
}

fn open_store<T: Entity>(path: Option<PathBuf>) -> Result<EntityStore<T>> {
    let Some(path) = path else {
        return Ok(EntityStore::new());
    };
    let store = EntityStore::open(&path)?;
    tracing::debug!(
        collection = T::COLLECTION,
        path = %path.display(),
        pending = store.pending_count(),
        "opened store"
    );
    Ok(store)
}
