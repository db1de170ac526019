//! ArchiveService: transport-agnostic owner of the record store.
//!
//! This service owns:
//! - The record store (and through it, the slot allocator)
//! - Health tracking
//! - Shutdown coordination
//!
//! Transports delegate to the store via [`ArchiveService::store`].

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::config::ServerConfig;
use crate::health::Health;
use crate::store::{RecordStore, StoreError};
use crate::version::VersionInfo;

/// Snapshot of service health for transports to query.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub state: Health,
    pub students: usize,
    pub staff: usize,
    pub version: VersionInfo,
}

pub struct ArchiveService {
    store: Arc<RecordStore>,
    health: RwLock<Health>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    version: VersionInfo,
}

impl ArchiveService {
    pub fn new(store: RecordStore) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            store: Arc::new(store),
            health: RwLock::new(Health::Starting),
            shutdown_tx,
            shutdown_rx,
            version: VersionInfo::new(),
        }
    }

    /// Open the store described by `config` and mark the service ready.
    pub fn from_config(config: &ServerConfig) -> Result<Self, StoreError> {
        let store = match &config.data_dir {
            Some(dir) => RecordStore::open(dir)?,
            None => {
                tracing::warn!("No data directory configured - records are kept in memory only");
                RecordStore::in_memory()
            }
        };
        let mut version = VersionInfo::new();
        if let Some(deployment) = &config.deployment {
            version = version.with_deployment(deployment.clone());
        }
        Ok(Self::new(store).with_version(version).with_health(Health::Ready))
    }

    pub fn with_health(mut self, health: Health) -> Self {
        self.health = RwLock::new(health);
        self
    }

    pub fn with_version(mut self, version: VersionInfo) -> Self {
        self.version = version;
        self
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub async fn set_health(&self, health: Health) {
        *self.health.write().await = health;
    }

    pub async fn health(&self) -> HealthSnapshot {
        let state = *self.health.read().await;
        let (students, staff) = self.store.counts().await;
        HealthSnapshot {
            state,
            students,
            staff,
            version: self.version.clone(),
        }
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }
}
