//! C4 — LockManager: shared/exclusive lock state with a FIFO wait queue,
//! leader-forwarding of mutating requests, and leader-side distributed
//! deadlock detection over the aggregated wait-for graph.

mod graph;
mod state;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use coord_common::sync::Mutex;
use coord_common::wire::{Command, LockMode};
use log::{info, warn};

use crate::config::NodeConfig;
use crate::error::CoordError;
use crate::replicator::LogReplicator;
use crate::transport::PeerTransport;
use state::LockState;

#[derive(Default)]
pub struct LockMetrics {
    pub acquires: AtomicU64,
    pub releases: AtomicU64,
    pub deadlocks_detected: AtomicU64,
}

pub struct LockManager {
    config: Arc<NodeConfig>,
    replicator: Arc<LogReplicator>,
    transport: Arc<dyn PeerTransport>,
    resources: Mutex<HashMap<String, LockState>>,
    pub metrics: LockMetrics,
}

fn validate_resource(resource: &str) -> Result<(), CoordError> {
    if resource.trim().is_empty() {
        return Err(CoordError::InvalidInput("resource must not be empty".into()));
    }
    Ok(())
}

fn validate_owner(owner: &str) -> Result<(), CoordError> {
    if owner.trim().is_empty() {
        return Err(CoordError::InvalidInput("owner must not be empty".into()));
    }
    Ok(())
}

impl LockManager {
    pub fn new(config: Arc<NodeConfig>, replicator: Arc<LogReplicator>, transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            config,
            replicator,
            transport,
            resources: Mutex::new(HashMap::new()),
            metrics: LockMetrics::default(),
        }
    }

    /// Appends an `AcquireLock` command if leader, or forwards the request
    /// to the current leader over HTTP otherwise. Returns whether the
    /// request was accepted for replication, not whether it was granted —
    /// granting happens asynchronously as `StateApplier` replays the log.
    /// A forwarding failure (no known leader, leader unreachable) returns
    /// `Ok(false)` rather than an error, so the client retries at the
    /// application layer; only malformed input and a direct-leader append
    /// failure surface as `Err`.
    pub async fn acquire(&self, resource: &str, owner: &str, mode: LockMode) -> Result<bool, CoordError> {
        validate_resource(resource)?;
        validate_owner(owner)?;

        if self.replicator.is_leader().await {
            self.replicator
                .append(Command::AcquireLock {
                    resource: resource.to_string(),
                    owner: owner.to_string(),
                    mode,
                })
                .await?;
            return Ok(true);
        }
        Ok(self
            .forward_to_leader(
                "/locks/acquire",
                serde_json::json!({"resource": resource, "owner": owner, "mode": mode}),
            )
            .await)
    }

    pub async fn release(&self, resource: &str, owner: &str) -> Result<bool, CoordError> {
        validate_resource(resource)?;
        validate_owner(owner)?;

        if self.replicator.is_leader().await {
            self.replicator
                .append(Command::ReleaseLock {
                    resource: resource.to_string(),
                    owner: owner.to_string(),
                })
                .await?;
            return Ok(true);
        }
        Ok(self
            .forward_to_leader("/locks/release", serde_json::json!({"resource": resource, "owner": owner}))
            .await)
    }

    /// Forwards a mutating request to the current leader, returning
    /// whether the leader reported acceptance. Any failure to identify or
    /// reach a leader collapses to `false` rather than an error.
    async fn forward_to_leader(&self, path: &str, body: serde_json::Value) -> bool {
        let Some(leader) = self.replicator.current_leader().await else {
            return false;
        };
        if leader == self.config.node_id {
            // Leadership changed between the initial check and now; caller
            // should retry as leader rather than forward to self.
            return false;
        }
        match self.transport.post(&leader, path, body).await {
            Ok(response) => response.get("success").and_then(|v| v.as_bool()).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Applied by `StateApplier` as it replays the log in order. Never
    /// fails: unknown owners/resources simply create fresh state.
    pub async fn apply_acquire(&self, resource: &str, owner: &str, mode: LockMode) {
        let mut resources = self.resources.lock().await;
        resources.entry(resource.to_string()).or_default().apply_acquire(owner, mode);
        drop(resources);
        self.metrics.acquires.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn apply_release(&self, resource: &str, owner: &str) {
        let mut resources = self.resources.lock().await;
        if let Some(state) = resources.get_mut(resource) {
            state.apply_release(owner);
            if state.is_empty() {
                resources.remove(resource);
            }
        }
        drop(resources);
        self.metrics.releases.fetch_add(1, Ordering::Relaxed);
    }

    /// Locally-known wait-for edges across every resource, exposed over
    /// `/locks/wait_for` so the leader can aggregate them from every peer.
    pub async fn wait_for_edges(&self) -> Vec<(String, String)> {
        let resources = self.resources.lock().await;
        resources.values().flat_map(|s| s.wait_for_edges()).collect()
    }

    pub async fn snapshot(&self) -> HashMap<String, (Option<LockMode>, Vec<String>, usize)> {
        let resources = self.resources.lock().await;
        resources
            .iter()
            .map(|(resource, state)| (resource.clone(), (state.mode, state.holders.clone(), state.queue.len())))
            .collect()
    }

    /// Leader-only: aggregates wait-for edges from every peer plus its own,
    /// runs cycle detection, and — if a cycle is found — injects a single
    /// `ReleaseLock` for the cycle's first owner against one resource it
    /// holds, breaking the cycle. At most one victim is released per pass.
    pub async fn run_deadlock_detection(&self) {
        if !self.replicator.is_leader().await {
            return;
        }

        let mut edges = self.wait_for_edges().await;
        for peer in &self.config.peers {
            match self.transport.get(peer, "/locks/wait_for").await {
                Ok(value) => {
                    if let Some(peer_edges) = value.as_array() {
                        for edge in peer_edges {
                            if let (Some(waiter), Some(holder)) = (
                                edge.get(0).and_then(|v| v.as_str()),
                                edge.get(1).and_then(|v| v.as_str()),
                            ) {
                                edges.push((waiter.to_string(), holder.to_string()));
                            }
                        }
                    }
                }
                Err(e) => warn!("deadlock detection: failed to fetch wait_for from {peer}: {e}"),
            }
        }

        let Some(cycle) = graph::detect_cycle(&edges) else {
            return;
        };
        let Some(victim) = cycle.first() else { return };

        let victim_resource = {
            let resources = self.resources.lock().await;
            resources
                .iter()
                .find(|(_, state)| state.holders.iter().any(|h| h == victim))
                .map(|(resource, _)| resource.clone())
        };

        if let Some(resource) = victim_resource {
            info!("deadlock detected (cycle: {cycle:?}); releasing {victim}'s hold on {resource}");
            match self
                .replicator
                .append(Command::ReleaseLock {
                    resource,
                    owner: victim.clone(),
                })
                .await
            {
                Ok(_) => {
                    self.metrics.deadlocks_detected.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => warn!("deadlock victim release failed to append: {e}"),
            }
        }
    }
}
