//! C1 — PeerTransport: typed request/response to named peers over a pooled
//! HTTP client with short timeouts. Failures are never retried here; the
//! caller decides how to interpret a missing response.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use crate::config::{NodeConfig, PEER_CONNECT_TIMEOUT, PEER_POOL_MAX_IDLE_PER_HOST, PEER_REQUEST_TIMEOUT};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("peer {peer} unreachable: {reason}")]
    Unreachable { peer: String, reason: String },
    #[error("peer {peer} returned an error status: {status}")]
    Status { peer: String, status: u16 },
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn post(&self, peer: &str, path: &str, body: Value) -> Result<Value, TransportError>;
    async fn get(&self, peer: &str, path: &str) -> Result<Value, TransportError>;
}

pub struct HttpPeerTransport {
    client: reqwest::Client,
    config: Arc<NodeConfig>,
}

impl HttpPeerTransport {
    pub fn new(config: Arc<NodeConfig>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(PEER_CONNECT_TIMEOUT)
            .timeout(PEER_REQUEST_TIMEOUT)
            .pool_max_idle_per_host(PEER_POOL_MAX_IDLE_PER_HOST)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }

    fn url(&self, peer: &str, path: &str) -> String {
        format!("{}{}", self.config.peer_base_url(peer), path)
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn post(&self, peer: &str, path: &str, body: Value) -> Result<Value, TransportError> {
        let url = self.url(peer, path);
        debug!("POST {url}");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(TransportError::Status {
                peer: peer.to_string(),
                status: response.status().as_u16(),
            });
        }
        response.json::<Value>().await.map_err(|e| TransportError::Unreachable {
            peer: peer.to_string(),
            reason: e.to_string(),
        })
    }

    async fn get(&self, peer: &str, path: &str) -> Result<Value, TransportError> {
        let url = self.url(peer, path);
        debug!("GET {url}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::Unreachable {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(TransportError::Status {
                peer: peer.to_string(),
                status: response.status().as_u16(),
            });
        }
        response.json::<Value>().await.map_err(|e| TransportError::Unreachable {
            peer: peer.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Test double keyed by `(peer, path)`. `HashMap` values hold a response or
/// `None` to simulate an unreachable peer.
#[derive(Default)]
pub struct MockPeerTransport {
    pub responses: std::sync::Mutex<HashMap<(String, String), Option<Value>>>,
}

impl MockPeerTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, peer: &str, path: &str, response: Option<Value>) {
        self.responses
            .lock()
            .unwrap()
            .insert((peer.to_string(), path.to_string()), response);
    }
}

#[async_trait]
impl PeerTransport for MockPeerTransport {
    async fn post(&self, peer: &str, path: &str, _body: Value) -> Result<Value, TransportError> {
        self.get(peer, path).await
    }

    async fn get(&self, peer: &str, path: &str) -> Result<Value, TransportError> {
        let key = (peer.to_string(), path.to_string());
        match self.responses.lock().unwrap().get(&key) {
            Some(Some(v)) => Ok(v.clone()),
            Some(None) => Err(TransportError::Unreachable {
                peer: peer.to_string(),
                reason: "mocked unreachable".into(),
            }),
            None => Err(TransportError::Unreachable {
                peer: peer.to_string(),
                reason: "no mock response configured".into(),
            }),
        }
    }
}
