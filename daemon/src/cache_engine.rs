//! C5 — CacheEngine: per-key MESI cache coherence with LRU eviction.
//!
//! The mutex is never held across a peer RPC: callers that need to
//! broadcast (invalidate, fetch) snapshot the peer list under the mutex,
//! release it, run the RPCs, then reacquire the mutex to install results.
//! Holding the mutex across an RPC would block every other reader/writer
//! on the latency of a peer that might be slow or down.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use coord_common::cache::CacheState;
use coord_common::sync::Mutex;
use coord_common::time::now_millis;
use lru::LruCache;

use crate::config::NodeConfig;
use crate::error::CoordError;
use crate::transport::PeerTransport;

#[derive(Debug, Clone)]
struct CacheLine {
    state: CacheState,
    value: Option<String>,
    #[allow(dead_code)]
    updated_at_millis: u64,
}

#[derive(Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub invalidations_sent: AtomicU64,
    pub invalidations_received: AtomicU64,
    pub state_transitions: AtomicU64,
}

/// Diagnostic snapshot of the whole cache, returned by `cache_state()`.
#[derive(Debug, serde::Serialize)]
pub struct CacheSnapshot {
    pub entries: Vec<(String, CacheState)>,
    pub hits: u64,
    pub misses: u64,
    pub invalidations_sent: u64,
    pub invalidations_received: u64,
    pub state_transitions: u64,
}

pub struct CacheEngine {
    config: Arc<NodeConfig>,
    transport: Arc<dyn PeerTransport>,
    lines: Mutex<LruCache<String, CacheLine>>,
    pub metrics: CacheMetrics,
}

const DEFAULT_CAPACITY: usize = 1024;

impl CacheEngine {
    pub fn new(config: Arc<NodeConfig>, transport: Arc<dyn PeerTransport>) -> Self {
        Self::with_capacity(config, transport, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(config: Arc<NodeConfig>, transport: Arc<dyn PeerTransport>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap());
        Self {
            config,
            transport,
            lines: Mutex::new(LruCache::new(capacity)),
            metrics: CacheMetrics::default(),
        }
    }

    /// Local read. On a hit in any non-Invalid state, returns the cached
    /// value and — per the documented simplification — promotes an
    /// `Exclusive` line to `Shared` without contacting peers. On a miss,
    /// fetches from peers (see `fetch_from_peers`) and installs the result
    /// as `Shared`; if no peer has the key either, the caller must `put` it.
    pub async fn get(&self, key: &str) -> Result<Option<String>, CoordError> {
        validate_key(key)?;

        {
            let mut lines = self.lines.lock().await;
            if let Some(line) = lines.get_mut(key) {
                if line.state != CacheState::Invalid {
                    if line.state == CacheState::Exclusive {
                        line.state = CacheState::Shared;
                        self.metrics.state_transitions.fetch_add(1, Ordering::Relaxed);
                    }
                    self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(line.value.clone());
                }
            }
        }

        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        let fetched = self.fetch_from_peers(key).await;
        if let Some(ref value) = fetched {
            let mut lines = self.lines.lock().await;
            lines.put(
                key.to_string(),
                CacheLine {
                    state: CacheState::Shared,
                    value: Some(value.clone()),
                    updated_at_millis: now_millis(),
                },
            );
        }
        Ok(fetched)
    }

    /// Local write: installs `value` as `Modified`. If the prior state was
    /// `Shared`, `Invalid`, or absent, every peer's copy is invalidated
    /// first — `invalidations_sent` counts every attempt, not every
    /// success. If the prior state was already `Exclusive` or `Modified`,
    /// this node already holds the only copy, so the install happens
    /// directly with no broadcast.
    pub async fn put(&self, key: &str, value: String) -> Result<(), CoordError> {
        validate_key(key)?;

        let prior_state = {
            let lines = self.lines.lock().await;
            lines.peek(key).map(|l| l.state)
        };

        let already_exclusive = matches!(prior_state, Some(CacheState::Exclusive) | Some(CacheState::Modified));
        if !already_exclusive {
            for peer in &self.config.peers {
                self.metrics.invalidations_sent.fetch_add(1, Ordering::Relaxed);
                let body = serde_json::json!({"key": key});
                if let Err(e) = self.transport.post(peer, "/cache/invalidate", body).await {
                    log::debug!("invalidate {key} on {peer} failed: {e}");
                }
            }
        }

        if prior_state != Some(CacheState::Modified) {
            self.metrics.state_transitions.fetch_add(1, Ordering::Relaxed);
        }
        let mut lines = self.lines.lock().await;
        lines.put(
            key.to_string(),
            CacheLine {
                state: CacheState::Modified,
                value: Some(value),
                updated_at_millis: now_millis(),
            },
        );
        Ok(())
    }

    /// Invoked by the HTTP shim when a peer's `put` invalidates our copy.
    /// Always transitions the line (if present) to `Invalid`, never errors.
    pub async fn handle_invalidate(&self, key: &str) {
        let mut lines = self.lines.lock().await;
        if let Some(line) = lines.get_mut(key) {
            line.state = CacheState::Invalid;
        }
        self.metrics.invalidations_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Invoked by the HTTP shim when a peer asks to fetch our copy of
    /// `key`. Returns `None` if absent or `Invalid`; otherwise returns the
    /// value and the state it was in *before* this call. Serving a fetch
    /// while holding `Modified`/`Exclusive` downgrades this copy to
    /// `Shared` — this is what keeps `M`/`E` unique across the cluster.
    pub async fn handle_fetch(&self, key: &str) -> Option<(String, CacheState)> {
        let mut lines = self.lines.lock().await;
        let line = lines.get_mut(key)?;
        if line.state == CacheState::Invalid {
            return None;
        }
        let state_before = line.state;
        let value = line.value.clone()?;
        if matches!(state_before, CacheState::Modified | CacheState::Exclusive) {
            line.state = CacheState::Shared;
            self.metrics.state_transitions.fetch_add(1, Ordering::Relaxed);
        }
        Some((value, state_before))
    }

    async fn fetch_from_peers(&self, key: &str) -> Option<String> {
        for peer in &self.config.peers {
            if let Ok(response) = self.transport.get(peer, &format!("/cache/fetch?key={key}")).await {
                if let Some(value) = response.get("value").and_then(|v| v.as_str()) {
                    return Some(value.to_string());
                }
            }
        }
        None
    }

    pub async fn state_of(&self, key: &str) -> CacheState {
        let lines = self.lines.lock().await;
        lines.peek(key).map(|l| l.state).unwrap_or(CacheState::Invalid)
    }

    /// Full diagnostic snapshot: every cached key's state plus the running
    /// counters, exposed over `/cache/state`.
    pub async fn snapshot(&self) -> CacheSnapshot {
        let lines = self.lines.lock().await;
        CacheSnapshot {
            entries: lines.iter().map(|(k, line)| (k.clone(), line.state)).collect(),
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            invalidations_sent: self.metrics.invalidations_sent.load(Ordering::Relaxed),
            invalidations_received: self.metrics.invalidations_received.load(Ordering::Relaxed),
            state_transitions: self.metrics.state_transitions.load(Ordering::Relaxed),
        }
    }

    pub async fn len(&self) -> usize {
        self.lines.lock().await.len()
    }
}

fn validate_key(key: &str) -> Result<(), CoordError> {
    if key.trim().is_empty() {
        return Err(CoordError::InvalidInput("key must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockPeerTransport;
    use serde_json::json;

    fn make_engine(peers: Vec<&str>) -> (CacheEngine, Arc<MockPeerTransport>) {
        let config = Arc::new(NodeConfig {
            node_id: "node1".into(),
            peers: peers.into_iter().map(String::from).collect(),
            http_port: 8000,
            log_backend_url: None,
            docker_env: false,
            log_level: "info".into(),
        });
        let transport = Arc::new(MockPeerTransport::new());
        let engine = CacheEngine::new(config, transport.clone());
        (engine, transport)
    }

    #[tokio::test]
    async fn get_rejects_blank_key() {
        let (engine, _) = make_engine(vec![]);
        assert!(matches!(engine.get("").await, Err(CoordError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn put_then_get_hits_locally_as_modified() {
        let (engine, _) = make_engine(vec![]);
        engine.put("k1", "v1".to_string()).await.unwrap();
        assert_eq!(engine.state_of("k1").await, CacheState::Modified);
        let value = engine.get("k1").await.unwrap();
        assert_eq!(value, Some("v1".to_string()));
    }

    #[tokio::test]
    async fn exclusive_read_promotes_to_shared_without_peer_contact() {
        let (engine, transport) = make_engine(vec!["node2".into()]);
        engine.put("k1", "v1".to_string()).await.unwrap();
        // put() installs Modified; simulate an externally-installed Exclusive line:
        {
            let mut lines = engine.lines.lock().await;
            lines.get_mut("k1").unwrap().state = CacheState::Exclusive;
        }
        let _ = engine.get("k1").await.unwrap();
        assert_eq!(engine.state_of("k1").await, CacheState::Shared);
        assert_eq!(transport.responses.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn miss_fetches_from_peer_and_installs_as_shared() {
        let (engine, transport) = make_engine(vec!["node2".into()]);
        transport.set("node2", "/cache/fetch?key=k1", Some(json!({"value": "remote"})));
        let value = engine.get("k1").await.unwrap();
        assert_eq!(value, Some("remote".to_string()));
        assert_eq!(engine.state_of("k1").await, CacheState::Shared);
    }

    #[tokio::test]
    async fn put_invalidates_every_peer_attempted_regardless_of_outcome() {
        let (engine, transport) = make_engine(vec!["node2".into(), "node3".into()]);
        transport.set("node2", "/cache/invalidate", Some(json!({"ok": true})));
        // node3 has no mock response configured -> treated as unreachable.
        engine.put("k1", "v1".to_string()).await.unwrap();
        assert_eq!(engine.metrics.invalidations_sent.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn handle_invalidate_marks_line_invalid() {
        let (engine, _) = make_engine(vec![]);
        engine.put("k1", "v1".to_string()).await.unwrap();
        engine.handle_invalidate("k1").await;
        assert_eq!(engine.state_of("k1").await, CacheState::Invalid);
    }

    #[tokio::test]
    async fn handle_fetch_does_not_return_invalid_lines() {
        let (engine, _) = make_engine(vec![]);
        engine.put("k1", "v1".to_string()).await.unwrap();
        engine.handle_invalidate("k1").await;
        assert!(engine.handle_fetch("k1").await.is_none());
    }

    #[tokio::test]
    async fn handle_fetch_downgrades_modified_to_shared_and_reports_prior_state() {
        let (engine, _) = make_engine(vec![]);
        engine.put("k1", "v1".to_string()).await.unwrap();
        assert_eq!(engine.state_of("k1").await, CacheState::Modified);

        let (value, state_before) = engine.handle_fetch("k1").await.unwrap();
        assert_eq!(value, "v1");
        assert_eq!(state_before, CacheState::Modified);
        assert_eq!(engine.state_of("k1").await, CacheState::Shared);
    }

    #[tokio::test]
    async fn second_put_on_an_already_modified_key_does_not_invalidate_again() {
        let (engine, transport) = make_engine(vec!["node2".into()]);
        transport.set("node2", "/cache/invalidate", Some(json!({"status": "invalidated"})));

        engine.put("k1", "v1".to_string()).await.unwrap();
        assert_eq!(engine.metrics.invalidations_sent.load(Ordering::Relaxed), 1);

        engine.put("k1", "v2".to_string()).await.unwrap();
        assert_eq!(engine.metrics.invalidations_sent.load(Ordering::Relaxed), 1);
        assert_eq!(engine.get("k1").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn lru_eviction_drops_least_recently_used_key() {
        let engine = CacheEngine::with_capacity(
            Arc::new(NodeConfig {
                node_id: "node1".into(),
                peers: vec![],
                http_port: 8000,
                log_backend_url: None,
                docker_env: false,
                log_level: "info".into(),
            }),
            Arc::new(MockPeerTransport::new()),
            2,
        );
        engine.put("k1", "v1".to_string()).await.unwrap();
        engine.put("k2", "v2".to_string()).await.unwrap();
        engine.put("k3", "v3".to_string()).await.unwrap();
        assert_eq!(engine.len().await, 2);
        assert_eq!(engine.state_of("k1").await, CacheState::Invalid);
    }
}
