//! A4 — installs the process-global Prometheus recorder and mirrors each
//! engine's atomic counters into it on a fixed cadence, so the same numbers
//! backing `/locks/wait_for` and `/cache/state` are also visible over
//! `/metrics` in Prometheus exposition format.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::cache_engine::CacheEngine;
use crate::lock_manager::LockManager;

pub fn install() -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_counter!("cache_hits_total", "CacheEngine local read hits");
    describe_counter!("cache_misses_total", "CacheEngine local read misses");
    describe_counter!("cache_invalidations_sent_total", "Invalidate RPCs attempted by this node");
    describe_counter!(
        "cache_invalidations_received_total",
        "Invalidate RPCs received from peers"
    );
    describe_counter!("cache_state_transitions_total", "CacheLine state transitions observed locally");
    describe_counter!("lock_acquires_total", "AcquireLock commands applied");
    describe_counter!("lock_releases_total", "ReleaseLock commands applied");
    describe_counter!("lock_deadlocks_detected_total", "Deadlock cycles broken by the leader");
    Ok(handle)
}

/// One pass of mirroring atomic deltas into the global recorder. The
/// atomics themselves are monotonic counters, so this publishes the
/// absolute value each tick; `metrics::counter!` treats repeated calls as
/// increments, so we track the last-published value to publish only the
/// delta.
pub struct MetricsMirror {
    cache_engine: Arc<CacheEngine>,
    lock_manager: Arc<LockManager>,
    last_hits: std::sync::atomic::AtomicU64,
    last_misses: std::sync::atomic::AtomicU64,
    last_sent: std::sync::atomic::AtomicU64,
    last_received: std::sync::atomic::AtomicU64,
    last_state_transitions: std::sync::atomic::AtomicU64,
    last_acquires: std::sync::atomic::AtomicU64,
    last_releases: std::sync::atomic::AtomicU64,
    last_deadlocks: std::sync::atomic::AtomicU64,
}

impl MetricsMirror {
    pub fn new(cache_engine: Arc<CacheEngine>, lock_manager: Arc<LockManager>) -> Self {
        Self {
            cache_engine,
            lock_manager,
            last_hits: 0.into(),
            last_misses: 0.into(),
            last_sent: 0.into(),
            last_received: 0.into(),
            last_state_transitions: 0.into(),
            last_acquires: 0.into(),
            last_releases: 0.into(),
            last_deadlocks: 0.into(),
        }
    }

    pub fn tick(&self) {
        publish_delta(&self.last_hits, self.cache_engine.metrics.hits.load(Ordering::Relaxed), "cache_hits_total");
        publish_delta(
            &self.last_misses,
            self.cache_engine.metrics.misses.load(Ordering::Relaxed),
            "cache_misses_total",
        );
        publish_delta(
            &self.last_sent,
            self.cache_engine.metrics.invalidations_sent.load(Ordering::Relaxed),
            "cache_invalidations_sent_total",
        );
        publish_delta(
            &self.last_received,
            self.cache_engine.metrics.invalidations_received.load(Ordering::Relaxed),
            "cache_invalidations_received_total",
        );
        publish_delta(
            &self.last_state_transitions,
            self.cache_engine.metrics.state_transitions.load(Ordering::Relaxed),
            "cache_state_transitions_total",
        );
        publish_delta(
            &self.last_acquires,
            self.lock_manager.metrics.acquires.load(Ordering::Relaxed),
            "lock_acquires_total",
        );
        publish_delta(
            &self.last_releases,
            self.lock_manager.metrics.releases.load(Ordering::Relaxed),
            "lock_releases_total",
        );
        publish_delta(
            &self.last_deadlocks,
            self.lock_manager.metrics.deadlocks_detected.load(Ordering::Relaxed),
            "lock_deadlocks_detected_total",
        );
    }
}

fn publish_delta(last: &std::sync::atomic::AtomicU64, current: u64, name: &'static str) {
    let previous = last.swap(current, Ordering::Relaxed);
    if current > previous {
        counter!(name).increment(current - previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::log_backend::InMemoryLogBackend;
    use crate::replicator::LogReplicator;
    use crate::transport::MockPeerTransport;
    use std::sync::atomic::Ordering as O;

    #[tokio::test]
    async fn tick_only_publishes_forward_progress() {
        let config = Arc::new(NodeConfig {
            node_id: "node1".into(),
            peers: vec![],
            http_port: 8000,
            log_backend_url: None,
            docker_env: false,
            log_level: "info".into(),
        });
        let transport = Arc::new(MockPeerTransport::new());
        let cache = Arc::new(CacheEngine::new(config.clone(), transport.clone()));
        cache.metrics.hits.store(5, O::Relaxed);

        let replicator = Arc::new(LogReplicator::new(config.clone(), InMemoryLogBackend::new(), transport.clone()));
        let lock_manager = Arc::new(LockManager::new(config, replicator, transport));

        let mirror = MetricsMirror::new(cache.clone(), lock_manager);
        mirror.tick();
        assert_eq!(mirror.last_hits.load(O::Relaxed), 5);

        mirror.tick();
        assert_eq!(mirror.last_hits.load(O::Relaxed), 5);
    }
}
