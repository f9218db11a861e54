//! MESI cache line state shared between `CacheEngine` and its HTTP shim.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Modified,
    Exclusive,
    Shared,
    Invalid,
}

impl CacheState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheState::Modified => "M",
            CacheState::Exclusive => "E",
            CacheState::Shared => "S",
            CacheState::Invalid => "I",
        }
    }
}
