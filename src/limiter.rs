//! Token-bucket rate limiter shared by every worker in a batch.
//!
//! The bucket holds at most `capacity` tokens and starts full. Each outbound
//! request (document fetch or asset fetch) consumes one token, waiting when
//! the bucket is empty. A background timer puts `refill_per_tick` tokens back
//! every `interval`, never exceeding `capacity`.
//!
//! Refill is a plain method so tests can drive it without a timer;
//! [`TokenBucket::spawn_refill`] wires it to a tokio interval for real runs.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

#[derive(Debug)]
pub struct TokenBucket {
    permits: Semaphore,
    capacity: usize,
    refill_per_tick: usize,
    interval: Duration,
    // Serialises refills so two ticks cannot both top up past capacity.
    refill_lock: Mutex<()>,
}

impl TokenBucket {
    /// A full bucket of `capacity` tokens. Zero values are raised to one.
    pub fn new(capacity: usize, refill_per_tick: usize, interval: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Semaphore::new(capacity),
            capacity,
            refill_per_tick: refill_per_tick.max(1),
            interval,
            refill_lock: Mutex::new(()),
        }
    }

    /// `rps` requests per second: a burst of `rps`, then one token every
    /// `1s / rps`.
    pub fn per_second(rps: u32) -> Self {
        let rps = rps.max(1);
        Self::new(
            rps as usize,
            1,
            Duration::from_secs(1) / rps,
        )
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tokens currently in the bucket.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Take one token, waiting for a refill if the bucket is empty.
    pub async fn acquire(&self) {
        match self.permits.acquire().await {
            Ok(permit) => permit.forget(),
            // The semaphore is never closed; nothing to wait for if it were.
            Err(_) => debug!("Token bucket closed, proceeding without a token"),
        }
    }

    /// Take one token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Add one tick's worth of tokens, capped at capacity. Returns how many
    /// tokens were added.
    pub fn refill(&self) -> usize {
        let _guard = self
            .refill_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let room = self.capacity.saturating_sub(self.permits.available_permits());
        let added = room.min(self.refill_per_tick);
        if added > 0 {
            self.permits.add_permits(added);
            trace!(added, available = self.available(), "Token bucket refilled");
        }
        added
    }

    /// Refill on a fixed timer until the returned handle is dropped or the
    /// bucket itself is dropped.
    pub fn spawn_refill(self: &Arc<Self>) -> RefillHandle {
        let bucket: Weak<Self> = Arc::downgrade(self);
        let period = self.interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the bucket starts full.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match bucket.upgrade() {
                    Some(bucket) => {
                        bucket.refill();
                    }
                    None => break,
                }
            }
        });
        RefillHandle { task }
    }
}

/// Stops the refill timer when dropped.
#[derive(Debug)]
pub struct RefillHandle {
    task: JoinHandle<()>,
}

impl Drop for RefillHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
