//! Wire types shared between the coordinator core and the HTTP shim.
//!
//! These mirror the external log backend's on-wire JSON format exactly, so
//! a `LogEntry` can be pushed to and read back from an `rpush`/`lrange`
//! style store without a translation layer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    AcquireLock {
        resource: String,
        owner: String,
        mode: LockMode,
    },
    ReleaseLock {
        resource: String,
        owner: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: u64,
    #[serde(rename = "cmd")]
    pub command: Command,
    #[serde(rename = "ts")]
    pub timestamp: f64,
}

pub type LogIndex = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trips_through_json() {
        let entry = LogEntry {
            term: 3,
            command: Command::AcquireLock {
                resource: "r1".into(),
                owner: "node2".into(),
                mode: LockMode::Shared,
            },
            timestamp: 12.5,
        };
        let encoded = serde_json::to_string(&entry).unwrap();
        let decoded: LogEntry = serde_json::from_str(&encoded).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn release_command_has_no_mode_field() {
        let cmd = Command::ReleaseLock {
            resource: "r1".into(),
            owner: "node1".into(),
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert!(value.get("mode").is_none());
    }
}
