//! C3 — StateApplier: drains `LogReplicator`'s tail broadcast and applies
//! each `Command` to the `LockManager` in strict index order. Runs as a
//! single background task per node so application is deterministic
//! regardless of how many HTTP requests are concurrently in flight.

use std::sync::Arc;

use coord_common::wire::Command;
use log::{debug, warn};
use tokio::sync::broadcast;

use crate::lock_manager::LockManager;
use crate::replicator::LogReplicator;

pub struct StateApplier {
    lock_manager: Arc<LockManager>,
}

impl StateApplier {
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self { lock_manager }
    }

    pub async fn apply(&self, index: u64, command: &Command) {
        match command {
            Command::AcquireLock { resource, owner, mode } => {
                self.lock_manager.apply_acquire(resource, owner, *mode).await;
            }
            Command::ReleaseLock { resource, owner } => {
                self.lock_manager.apply_release(resource, owner).await;
            }
        }
        debug!("applied log entry {index}: {command:?}");
    }

    /// Runs until the broadcast channel closes (replicator dropped).
    /// A lagged receiver (applier fell behind the channel's ring buffer)
    /// logs a warning and resumes from the next available entry rather
    /// than panicking — strict ordering within what it does see is
    /// preserved, but a gap is possible under sustained overload.
    pub async fn run(&self, replicator: &LogReplicator) {
        let mut rx = replicator.subscribe_tail();
        loop {
            match rx.recv().await {
                Ok((index, entry)) => self.apply(index, &entry.command).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("state applier lagged, skipped {skipped} entries");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
