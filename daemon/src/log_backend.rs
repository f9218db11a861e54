//! A1 — client for the external ordered-log backend (`rpush`/`llen`/
//! `lindex`/`lrange`/`set` semantics). The backend itself is an external
//! collaborator; this module only implements talking to it, plus an
//! in-memory stand-in for tests and single-process/standalone runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use coord_common::wire::LogEntry;
use tokio::sync::Mutex;

use crate::config::{PEER_CONNECT_TIMEOUT, PEER_REQUEST_TIMEOUT};

#[derive(Debug, thiserror::Error)]
pub enum LogBackendError {
    #[error("log backend unreachable: {0}")]
    Unreachable(String),
    #[error("log backend returned malformed data: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait LogBackend: Send + Sync {
    async fn append(&self, entry: LogEntry) -> Result<u64, LogBackendError>;
    async fn len(&self) -> Result<u64, LogBackendError>;
    async fn get(&self, index: u64) -> Result<Option<LogEntry>, LogBackendError>;
    async fn range(&self, start: u64, end: u64) -> Result<Vec<LogEntry>, LogBackendError>;
    async fn set_checkpoint(&self, key: &str, value: &str) -> Result<(), LogBackendError>;
    async fn get_checkpoint(&self, key: &str) -> Result<Option<String>, LogBackendError>;
}

pub struct HttpLogBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLogBackend {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(PEER_CONNECT_TIMEOUT)
            .timeout(PEER_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_url }
    }
}

#[async_trait]
impl LogBackend for HttpLogBackend {
    async fn append(&self, entry: LogEntry) -> Result<u64, LogBackendError> {
        let response = self
            .client
            .post(format!("{}/rpush", self.base_url))
            .json(&entry)
            .send()
            .await
            .map_err(|e| LogBackendError::Unreachable(e.to_string()))?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LogBackendError::Malformed(e.to_string()))?;
        body["index"]
            .as_u64()
            .ok_or_else(|| LogBackendError::Malformed("missing index field".into()))
    }

    async fn len(&self) -> Result<u64, LogBackendError> {
        let response = self
            .client
            .get(format!("{}/llen", self.base_url))
            .send()
            .await
            .map_err(|e| LogBackendError::Unreachable(e.to_string()))?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LogBackendError::Malformed(e.to_string()))?;
        body["len"]
            .as_u64()
            .ok_or_else(|| LogBackendError::Malformed("missing len field".into()))
    }

    async fn get(&self, index: u64) -> Result<Option<LogEntry>, LogBackendError> {
        let response = self
            .client
            .get(format!("{}/lindex/{}", self.base_url, index))
            .send()
            .await
            .map_err(|e| LogBackendError::Unreachable(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        response
            .json()
            .await
            .map_err(|e| LogBackendError::Malformed(e.to_string()))
    }

    async fn range(&self, start: u64, end: u64) -> Result<Vec<LogEntry>, LogBackendError> {
        let response = self
            .client
            .get(format!("{}/lrange/{}/{}", self.base_url, start, end))
            .send()
            .await
            .map_err(|e| LogBackendError::Unreachable(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| LogBackendError::Malformed(e.to_string()))
    }

    async fn set_checkpoint(&self, key: &str, value: &str) -> Result<(), LogBackendError> {
        self.client
            .post(format!("{}/set", self.base_url))
            .json(&serde_json::json!({"key": key, "value": value}))
            .send()
            .await
            .map_err(|e| LogBackendError::Unreachable(e.to_string()))?;
        Ok(())
    }

    async fn get_checkpoint(&self, key: &str) -> Result<Option<String>, LogBackendError> {
        let response = self
            .client
            .get(format!("{}/get/{}", self.base_url, key))
            .send()
            .await
            .map_err(|e| LogBackendError::Unreachable(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LogBackendError::Malformed(e.to_string()))?;
        Ok(body["value"].as_str().map(|s| s.to_string()))
    }
}

#[derive(Default)]
struct InMemoryState {
    entries: Vec<LogEntry>,
    checkpoints: HashMap<String, String>,
}

/// In-memory ordered log, used for tests and single-process standalone
/// runs where no external backend is configured.
pub struct InMemoryLogBackend {
    state: Mutex<InMemoryState>,
}

impl InMemoryLogBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(InMemoryState::default()),
        })
    }
}

#[async_trait]
impl LogBackend for InMemoryLogBackend {
    async fn append(&self, entry: LogEntry) -> Result<u64, LogBackendError> {
        let mut state = self.state.lock().await;
        state.entries.push(entry);
        Ok(state.entries.len() as u64 - 1)
    }

    async fn len(&self) -> Result<u64, LogBackendError> {
        Ok(self.state.lock().await.entries.len() as u64)
    }

    async fn get(&self, index: u64) -> Result<Option<LogEntry>, LogBackendError> {
        Ok(self.state.lock().await.entries.get(index as usize).cloned())
    }

    async fn range(&self, start: u64, end: u64) -> Result<Vec<LogEntry>, LogBackendError> {
        let state = self.state.lock().await;
        let end = end.min(state.entries.len() as u64);
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(state.entries[start as usize..end as usize].to_vec())
    }

    async fn set_checkpoint(&self, key: &str, value: &str) -> Result<(), LogBackendError> {
        self.state
            .lock()
            .await
            .checkpoints
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_checkpoint(&self, key: &str) -> Result<Option<String>, LogBackendError> {
        Ok(self.state.lock().await.checkpoints.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coord_common::wire::{Command, LockMode};

    fn sample_entry(term: u64) -> LogEntry {
        LogEntry {
            term,
            command: Command::AcquireLock {
                resource: "r1".into(),
                owner: "node1".into(),
                mode: LockMode::Exclusive,
            },
            timestamp: 0.0,
        }
    }

    #[tokio::test]
    async fn append_returns_sequential_indices() {
        let backend = InMemoryLogBackend::new();
        assert_eq!(backend.append(sample_entry(1)).await.unwrap(), 0);
        assert_eq!(backend.append(sample_entry(1)).await.unwrap(), 1);
        assert_eq!(backend.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn range_clamps_to_log_length() {
        let backend = InMemoryLogBackend::new();
        backend.append(sample_entry(1)).await.unwrap();
        let entries = backend.range(0, 100).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn checkpoints_round_trip() {
        let backend = InMemoryLogBackend::new();
        assert_eq!(backend.get_checkpoint("apply_index").await.unwrap(), None);
        backend.set_checkpoint("apply_index", "5").await.unwrap();
        assert_eq!(
            backend.get_checkpoint("apply_index").await.unwrap(),
            Some("5".to_string())
        );
    }
}
