//! Pure `LockState` transition functions — no I/O, no locking. Kept
//! separate from the engine so the state machine itself can be tested
//! directly without standing up an entire `LockManager`.

use std::collections::VecDeque;

use coord_common::wire::LockMode;

#[derive(Debug, Clone, Default)]
pub struct LockState {
    pub mode: Option<LockMode>,
    pub holders: Vec<String>,
    pub queue: VecDeque<(String, LockMode)>,
}

impl LockState {
    pub fn is_empty(&self) -> bool {
        self.mode.is_none() && self.holders.is_empty() && self.queue.is_empty()
    }

    fn already_queued_or_held(&self, owner: &str, mode: LockMode) -> bool {
        (self.mode == Some(mode) && self.holders.iter().any(|h| h == owner))
            || self.queue.iter().any(|(o, m)| o == owner && *m == mode)
    }

    /// Applies an `AcquireLock` command. A `Shared` request joins the
    /// current `Shared` holders unconditionally, even if requests are
    /// already queued behind them — it does not wait its turn in the FIFO
    /// queue. Any other incompatible combination enqueues.
    pub fn apply_acquire(&mut self, owner: &str, mode: LockMode) {
        if self.already_queued_or_held(owner, mode) {
            return;
        }

        let can_grant_immediately = match (self.mode, mode) {
            (None, _) => true,
            (Some(LockMode::Shared), LockMode::Shared) => true,
            _ => false,
        };

        if can_grant_immediately {
            self.mode = Some(mode);
            self.holders.push(owner.to_string());
        } else {
            self.queue.push_back((owner.to_string(), mode));
        }
    }

    /// Applies a `ReleaseLock` command for `owner`. A release by a
    /// non-holder is a no-op. When the last holder releases, promotes
    /// `queue.front()`, and — if it is a `Shared` request — greedily
    /// promotes every contiguous `Shared` waiter behind it too.
    pub fn apply_release(&mut self, owner: &str) {
        let had_holder = self.holders.iter().any(|h| h == owner);
        if !had_holder {
            return;
        }
        self.holders.retain(|h| h != owner);

        if !self.holders.is_empty() {
            return;
        }

        self.mode = None;
        let Some((next_owner, next_mode)) = self.queue.pop_front() else {
            return;
        };

        self.mode = Some(next_mode);
        self.holders.push(next_owner);

        if next_mode == LockMode::Shared {
            while let Some((_, LockMode::Shared)) = self.queue.front() {
                let (owner, _) = self.queue.pop_front().unwrap();
                self.holders.push(owner);
            }
        }
    }

    /// Wait-for edges contributed by this resource: one `(waiter, holder)`
    /// pair for every queued owner against every current holder, since a
    /// queued request waits on all current holders to release.
    pub fn wait_for_edges(&self) -> Vec<(String, String)> {
        let mut edges = Vec::new();
        for (waiter, _) in &self.queue {
            for holder in &self.holders {
                if waiter != holder {
                    edges.push((waiter.clone(), holder.clone()));
                }
            }
        }
        edges
    }
}
