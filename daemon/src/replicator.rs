//! C2 — LogReplicator: leader election by heartbeat timeout, and
//! append/tail of the externally-stored ordered log.
//!
//! Election is a simplified Raft-like scheme: whichever node has sent the
//! most recent heartbeat with the highest term is leader; there is no vote
//! phase, and durability is delegated entirely to the external log backend.
//! This is a known simplification: there is no true quorum, so a
//! partitioned minority can believe itself leader.

use std::sync::Arc;

use coord_common::sync::Mutex;
use coord_common::time::now_secs_f64;
use coord_common::wire::LogEntry;
use log::{debug, warn};
use tokio::sync::broadcast;

use crate::config::NodeConfig;
use crate::error::CoordError;
use crate::log_backend::{LogBackend, LogBackendError};
use crate::transport::PeerTransport;

const TAIL_CHANNEL_CAPACITY: usize = 1024;

struct ReplicatorState {
    term: u64,
    leader_id: Option<String>,
    last_heartbeat_at: f64,
    apply_index: u64,
}

pub struct LogReplicator {
    node_id: String,
    config: Arc<NodeConfig>,
    backend: Arc<dyn LogBackend>,
    transport: Arc<dyn PeerTransport>,
    state: Mutex<ReplicatorState>,
    tail_tx: broadcast::Sender<(u64, LogEntry)>,
}

impl LogReplicator {
    pub fn new(config: Arc<NodeConfig>, backend: Arc<dyn LogBackend>, transport: Arc<dyn PeerTransport>) -> Self {
        let (tail_tx, _) = broadcast::channel(TAIL_CHANNEL_CAPACITY);
        Self {
            node_id: config.node_id.clone(),
            config,
            backend,
            transport,
            state: Mutex::new(ReplicatorState {
                term: 0,
                leader_id: None,
                last_heartbeat_at: now_secs_f64(),
                apply_index: 0,
            }),
            tail_tx,
        }
    }

    pub fn subscribe_tail(&self) -> broadcast::Receiver<(u64, LogEntry)> {
        self.tail_tx.subscribe()
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub async fn is_leader(&self) -> bool {
        let state = self.state.lock().await;
        state.leader_id.as_deref() == Some(self.node_id.as_str())
    }

    pub async fn current_leader(&self) -> Option<String> {
        self.state.lock().await.leader_id.clone()
    }

    pub async fn current_term(&self) -> u64 {
        self.state.lock().await.term
    }

    /// Called when this node's own heartbeat/election timer fires without
    /// having heard from a higher-or-equal term leader: claims leadership
    /// for the next term.
    async fn become_leader(&self) {
        let mut state = self.state.lock().await;
        state.term += 1;
        state.leader_id = Some(self.node_id.clone());
        state.last_heartbeat_at = now_secs_f64();
        debug!("{} became leader for term {}", self.node_id, state.term);
    }

    /// Applies an incoming heartbeat from `from` at `term`. Accepts it
    /// (recognizing `from` as leader) iff `term >= self.term`.
    pub async fn receive_heartbeat(&self, from: &str, term: u64) {
        let mut state = self.state.lock().await;
        if term >= state.term {
            state.term = term;
            state.leader_id = Some(from.to_string());
            state.last_heartbeat_at = now_secs_f64();
        }
    }

    /// Runs the election timer: if no heartbeat (from self or a peer) has
    /// refreshed `last_heartbeat_at` within `T_FAILOVER`, claims leadership.
    pub async fn run_election_timer(&self) {
        let elapsed = {
            let state = self.state.lock().await;
            now_secs_f64() - state.last_heartbeat_at
        };
        if elapsed > crate::config::T_FAILOVER.as_secs_f64() {
            self.become_leader().await;
        }
    }

    /// Leader-only: broadcasts a heartbeat to every configured peer.
    /// Failures to individual peers are logged and otherwise ignored —
    /// heartbeat delivery is best-effort.
    pub async fn broadcast_heartbeat(&self) {
        if !self.is_leader().await {
            return;
        }
        let term = self.current_term().await;
        {
            let mut state = self.state.lock().await;
            state.last_heartbeat_at = now_secs_f64();
        }
        for peer in &self.config.peers {
            let body = serde_json::json!({"leader": self.node_id, "term": term});
            if let Err(e) = self.transport.post(peer, "/raft/heartbeat", body).await {
                debug!("heartbeat to {peer} failed: {e}");
            }
        }
    }

    /// Appends `entry` to the log iff this node is currently leader. The
    /// leadership check and the append race against a concurrent heartbeat
    /// that could revoke leadership; both sides are serialized through
    /// `state`, and the term is rechecked immediately before the backend
    /// call so a term bump aborts the append with `NotLeader` rather than
    /// appending under a stale term.
    pub async fn append(&self, command: coord_common::wire::Command) -> Result<u64, CoordError> {
        let term = {
            let state = self.state.lock().await;
            if state.leader_id.as_deref() != Some(self.node_id.as_str()) {
                return Err(CoordError::NotLeader {
                    leader: state.leader_id.clone(),
                });
            }
            state.term
        };

        let entry = LogEntry {
            term,
            command,
            timestamp: now_secs_f64(),
        };

        {
            let state = self.state.lock().await;
            if state.term != term || state.leader_id.as_deref() != Some(self.node_id.as_str()) {
                return Err(CoordError::NotLeader {
                    leader: state.leader_id.clone(),
                });
            }
        }

        self.backend.append(entry).await.map_err(|e| match e {
            LogBackendError::Unreachable(msg) => CoordError::BackendUnavailable(msg),
            LogBackendError::Malformed(msg) => CoordError::BackendUnavailable(msg),
        })
    }

    pub async fn log_range(&self, start: u64, end: u64) -> Result<Vec<LogEntry>, CoordError> {
        self.backend
            .range(start, end)
            .await
            .map_err(|e| CoordError::BackendUnavailable(e.to_string()))
    }

    /// Tail loop body: pulls any newly-appended entries past `apply_index`
    /// and republishes them on `tail_tx` in order, advancing and
    /// checkpointing `apply_index`. Run this repeatedly from a background
    /// task at `TAIL_POLL_INTERVAL`.
    pub async fn tail_once(&self) -> Result<(), CoordError> {
        let apply_index = self.state.lock().await.apply_index;
        let len = self
            .backend
            .len()
            .await
            .map_err(|e| CoordError::BackendUnavailable(e.to_string()))?;
        if apply_index >= len {
            return Ok(());
        }
        let entries = self
            .backend
            .range(apply_index, len)
            .await
            .map_err(|e| CoordError::BackendUnavailable(e.to_string()))?;

        for (offset, entry) in entries.into_iter().enumerate() {
            let index = apply_index + offset as u64;
            if self.tail_tx.send((index, entry)).is_err() {
                // No subscribers yet (e.g. StateApplier not started); not fatal.
                warn!("tail_once: no subscribers for index {index}");
            }
        }

        let mut state = self.state.lock().await;
        state.apply_index = len;
        drop(state);
        let checkpoint_key = format!("applied:{}", self.node_id);
        if let Err(e) = self.backend.set_checkpoint(&checkpoint_key, &len.to_string()).await {
            debug!("failed to write apply checkpoint: {e}");
        }
        Ok(())
    }
}
