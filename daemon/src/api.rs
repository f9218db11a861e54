//! C6 — CoreApi: the thin programmatic surface the HTTP shim binds to.
//! Pure delegation and validation; no protocol concerns live here.

use std::sync::Arc;

use coord_common::wire::{LockMode, LogEntry};

use crate::cache_engine::{CacheEngine, CacheSnapshot};
use crate::error::CoordError;
use crate::lock_manager::LockManager;
use crate::replicator::LogReplicator;

pub struct CoreApi {
    pub replicator: Arc<LogReplicator>,
    pub lock_manager: Arc<LockManager>,
    pub cache_engine: Arc<CacheEngine>,
}

impl CoreApi {
    pub fn new(replicator: Arc<LogReplicator>, lock_manager: Arc<LockManager>, cache_engine: Arc<CacheEngine>) -> Self {
        Self {
            replicator,
            lock_manager,
            cache_engine,
        }
    }

    pub async fn health(&self) -> bool {
        true
    }

    pub fn node_id(&self) -> &str {
        self.replicator.node_id()
    }

    pub async fn term(&self) -> u64 {
        self.replicator.current_term().await
    }

    pub async fn leader(&self) -> Option<String> {
        self.replicator.current_leader().await
    }

    pub async fn heartbeat(&self, from: &str, term: u64) {
        self.replicator.receive_heartbeat(from, term).await;
    }

    /// Raw log append: fails closed with `NotLeader` rather than
    /// forwarding, unlike `acquire_lock`/`release_lock` which forward to
    /// the current leader on a follower.
    pub async fn append(&self, command: coord_common::wire::Command) -> Result<u64, CoordError> {
        self.replicator.append(command).await
    }

    pub async fn log_range(&self, start: u64, end: u64) -> Result<Vec<LogEntry>, CoordError> {
        self.replicator.log_range(start, end).await
    }

    pub async fn acquire_lock(&self, resource: &str, owner: &str, mode: LockMode) -> Result<bool, CoordError> {
        self.lock_manager.acquire(resource, owner, mode).await
    }

    pub async fn release_lock(&self, resource: &str, owner: &str) -> Result<bool, CoordError> {
        self.lock_manager.release(resource, owner).await
    }

    pub async fn wait_for(&self) -> Vec<(String, String)> {
        self.lock_manager.wait_for_edges().await
    }

    pub async fn cache_get(&self, key: &str) -> Result<Option<String>, CoordError> {
        self.cache_engine.get(key).await
    }

    pub async fn cache_put(&self, key: &str, value: String) -> Result<(), CoordError> {
        self.cache_engine.put(key, value).await
    }

    pub async fn cache_invalidate(&self, key: &str) {
        self.cache_engine.handle_invalidate(key).await;
    }

    pub async fn cache_fetch(&self, key: &str) -> Option<(String, coord_common::cache::CacheState)> {
        self.cache_engine.handle_fetch(key).await
    }

    pub async fn cache_state(&self) -> CacheSnapshot {
        self.cache_engine.snapshot().await
    }
}
