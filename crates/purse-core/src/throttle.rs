//! Per-user message throttle.
//!
//! Sliding-window counter keyed by chat user id: each accepted message's
//! [`Instant`] is recorded, timestamps older than the window are pruned on
//! every check, and a user at the limit is rejected until the oldest
//! timestamp ages out.
//!
//! # LRU Eviction
//!
//! When more than `max_tracked_users` users are tracked, the one accessed
//! least recently is evicted, which bounds memory for long-running bots.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

/// Default number of users tracked before eviction.
pub const DEFAULT_MAX_TRACKED_USERS: usize = 10_000;

struct SlidingWindow {
    /// Accepted messages inside the window, oldest first.
    timestamps: VecDeque<Instant>,
    /// Access counter value at last check.
    last_access: u64,
}

/// Sliding-window throttle keyed by user id.
pub struct MessageThrottle {
    windows: RwLock<HashMap<i64, SlidingWindow>>,
    limit: u32,
    window: Duration,
    max_tracked_users: usize,
    access_counter: AtomicU64,
}

impl MessageThrottle {
    /// Allow `limit` messages per `window` per user. `limit == 0` disables
    /// throttling.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            limit,
            window,
            max_tracked_users: DEFAULT_MAX_TRACKED_USERS,
            access_counter: AtomicU64::new(0),
        }
    }

    /// `messages_per_minute` over a 60 s window.
    pub fn per_minute(messages_per_minute: u32) -> Self {
        Self::new(messages_per_minute, Duration::from_secs(60))
    }

    /// Set the LRU eviction threshold.
    pub fn with_max_tracked_users(mut self, max: usize) -> Self {
        self.max_tracked_users = max.max(1);
        self
    }

    /// Record a message from `user_id`; `false` when over the limit.
    pub fn check(&self, user_id: i64) -> bool {
        if self.limit == 0 {
            return true;
        }

        let now = Instant::now();
        let order = self.access_counter.fetch_add(1, Ordering::Relaxed);

        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        let entry = windows.entry(user_id).or_insert_with(|| SlidingWindow {
            timestamps: VecDeque::new(),
            last_access: order,
        });
        entry.last_access = order;

        while let Some(&oldest) = entry.timestamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                entry.timestamps.pop_front();
            } else {
                break;
            }
        }

        if entry.timestamps.len() >= self.limit as usize {
            return false;
        }
        entry.timestamps.push_back(now);

        if windows.len() > self.max_tracked_users {
            Self::evict_oldest(&mut windows);
        }
        true
    }

    /// Messages from `user_id` inside the current window.
    pub fn count(&self, user_id: i64) -> u32 {
        let now = Instant::now();
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        windows.get(&user_id).map_or(0, |entry| {
            entry
                .timestamps
                .iter()
                .filter(|ts| now.saturating_duration_since(**ts) < self.window)
                .count() as u32
        })
    }

    /// Number of tracked users.
    pub fn tracked_users(&self) -> usize {
        self.windows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn evict_oldest(windows: &mut HashMap<i64, SlidingWindow>) {
        let oldest = windows
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(user, _)| *user);
        if let Some(user) = oldest {
            windows.remove(&user);
        }
    }
}
