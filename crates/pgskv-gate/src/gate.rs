//! Process-wide entry point.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pgskv_common::{GateConfig, GateResult};
use pgskv_store::{MemoryStore, SkvClient};
use tracing::info;

use crate::adapter::Adapter;
use crate::catalog::CatalogManager;
use crate::session::{Session, SessionId};

/// The gate: one adapter and one catalog shared by every session.
#[derive(Debug)]
pub struct Gate {
    manager: Arc<CatalogManager>,
    next_session_id: AtomicU64,
}

impl Gate {
    /// Starts the gate over `client` and bootstraps the primary cluster.
    pub fn open(client: Arc<dyn SkvClient>, config: GateConfig) -> GateResult<Self> {
        let adapter = Arc::new(Adapter::start(client, config)?);
        let manager = Arc::new(CatalogManager::new(adapter));
        manager.init_primary_cluster()?;
        info!("gate opened");
        Ok(Self { manager, next_session_id: AtomicU64::new(1) })
    }

    /// Starts the gate over an in-process store.
    pub fn open_memory(config: GateConfig) -> GateResult<Self> {
        Self::open(MemoryStore::shared(), config)
    }

    /// Starts the gate over an in-process store with configuration from a
    /// TOML file.
    pub fn open_memory_with_config_file(path: impl AsRef<Path>) -> GateResult<Self> {
        Self::open_memory(GateConfig::from_file(path.as_ref())?)
    }

    /// Shared catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<CatalogManager> {
        &self.manager
    }

    /// Opens a new, disconnected session.
    pub fn create_session(&self) -> Session {
        let id = SessionId::new(self.next_session_id.fetch_add(1, Ordering::Relaxed));
        Session::new(id, Arc::clone(&self.manager))
    }
}
