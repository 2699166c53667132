//! Fixed-window request counting per (widget, category).
//!
//! A window opens at the first call after the previous one closed, it is not
//! aligned to wall-clock boundaries. Check and reserve happen under one lock
//! so two concurrent calls can never both observe "under limit" for the last
//! slot.
//!
//! Calls with `on_exceeded = queue` wait for the next window in FIFO order.
//! At most `max_queue_depth` calls (default [`DEFAULT_MAX_QUEUE_DEPTH`]) may
//! wait per key; further calls are denied.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep_until, Instant};
use tracing::debug;
use widget_bridge_core::{Category, OnExceeded, RateLimit, WidgetId};

pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Rate limit exceeded for {key}")]
    Exceeded {
        key: RateLimitKey,
        mode: OnExceeded,
        retry_after: Duration,
    },

    #[error("Rate limit queue full for {key} ({depth} waiting)")]
    QueueFull {
        key: RateLimitKey,
        depth: usize,
        retry_after: Duration,
    },
}

impl RateLimitError {
    pub fn retry_after(&self) -> Duration {
        match self {
            RateLimitError::Exceeded { retry_after, .. }
            | RateLimitError::QueueFull { retry_after, .. } => *retry_after,
        }
    }

    pub fn mode(&self) -> OnExceeded {
        match self {
            RateLimitError::Exceeded { mode, .. } => *mode,
            RateLimitError::QueueFull { .. } => OnExceeded::Queue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub widget_id: WidgetId,
    pub category: Category,
}

impl RateLimitKey {
    pub fn new(widget_id: WidgetId, category: Category) -> Self {
        Self {
            widget_id,
            category,
        }
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.widget_id, self.category)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: Instant,
}

/// A granted slot, with how long the call waited in the queue for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub status: RateLimitStatus,
    pub waited: Duration,
}

struct WindowCounter {
    window_start: Instant,
    count: u32,
    waiting: usize,
}

impl WindowCounter {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            waiting: 0,
        }
    }

    fn roll(&mut self, now: Instant, window: Duration) {
        if now >= self.window_start + window {
            self.window_start = now;
            self.count = 0;
        }
    }
}

pub struct RateLimiter {
    counters: Mutex<HashMap<RateLimitKey, WindowCounter>>,
    lanes: Mutex<HashMap<RateLimitKey, Arc<tokio::sync::Mutex<()>>>>,
    max_queue_depth: usize,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_max_queue_depth(DEFAULT_MAX_QUEUE_DEPTH)
    }

    pub fn with_max_queue_depth(max_queue_depth: usize) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            lanes: Mutex::new(HashMap::new()),
            max_queue_depth,
        }
    }

    pub fn max_queue_depth(&self) -> usize {
        self.max_queue_depth
    }

    /// Atomic check-and-reserve. A granted slot is consumed immediately.
    pub fn check(&self, key: &RateLimitKey, limit: &RateLimit) -> RateLimitStatus {
        self.reserve(key, limit, false)
    }

    /// Reserves a slot, applying the limit's `on_exceeded` policy when the
    /// window is exhausted.
    pub async fn acquire(
        &self,
        key: &RateLimitKey,
        limit: &RateLimit,
    ) -> Result<Admission, RateLimitError> {
        let status = self.reserve(key, limit, false);
        if status.allowed {
            return Ok(Admission {
                status,
                waited: Duration::ZERO,
            });
        }

        match limit.on_exceeded() {
            OnExceeded::Block | OnExceeded::Error => Err(RateLimitError::Exceeded {
                key: key.clone(),
                mode: limit.on_exceeded(),
                retry_after: status.reset_at.saturating_duration_since(Instant::now()),
            }),
            OnExceeded::Queue => self.wait_for_window(key, limit, status).await,
        }
    }

    /// Number of calls currently waiting on the key.
    pub fn waiting(&self, key: &RateLimitKey) -> usize {
        self.counters.lock().get(key).map(|c| c.waiting).unwrap_or(0)
    }

    /// Drops every counter owned by the widget.
    pub fn forget_widget(&self, widget_id: &WidgetId) {
        self.counters.lock().retain(|key, _| &key.widget_id != widget_id);
        self.lanes.lock().retain(|key, _| &key.widget_id != widget_id);
    }

    fn reserve(&self, key: &RateLimitKey, limit: &RateLimit, queued_turn: bool) -> RateLimitStatus {
        let now = Instant::now();
        let mut counters = self.counters.lock();
        let counter = counters
            .entry(key.clone())
            .or_insert_with(|| WindowCounter::new(now));

        counter.roll(now, limit.window());
        let reset_at = counter.window_start + limit.window();

        // Fresh queue-mode arrivals may not overtake calls already queued on
        // this key. Block and error calls only look at the count.
        let behind_queue = !queued_turn
            && limit.on_exceeded() == OnExceeded::Queue
            && counter.waiting > 0;

        if counter.count < limit.max_requests() && !behind_queue {
            counter.count += 1;
            RateLimitStatus {
                allowed: true,
                remaining: limit.max_requests() - counter.count,
                reset_at,
            }
        } else {
            RateLimitStatus {
                allowed: false,
                remaining: limit.max_requests().saturating_sub(counter.count),
                reset_at,
            }
        }
    }

    async fn wait_for_window(
        &self,
        key: &RateLimitKey,
        limit: &RateLimit,
        denied: RateLimitStatus,
    ) -> Result<Admission, RateLimitError> {
        let started = Instant::now();
        let _ticket = self.enqueue(key, denied)?;
        let lane = self.lane(key);
        let _turn = lane.lock().await;

        loop {
            let status = self.reserve(key, limit, true);
            if status.allowed {
                return Ok(Admission {
                    status,
                    waited: started.elapsed(),
                });
            }
            debug!("Queued call on {} waiting for window reset", key);
            sleep_until(status.reset_at).await;
        }
    }

    fn enqueue(
        &self,
        key: &RateLimitKey,
        denied: RateLimitStatus,
    ) -> Result<QueueTicket<'_>, RateLimitError> {
        let now = Instant::now();
        let mut counters = self.counters.lock();
        let counter = counters
            .entry(key.clone())
            .or_insert_with(|| WindowCounter::new(now));

        if counter.waiting >= self.max_queue_depth {
            return Err(RateLimitError::QueueFull {
                key: key.clone(),
                depth: counter.waiting,
                retry_after: denied.reset_at.saturating_duration_since(now),
            });
        }

        counter.waiting += 1;
        Ok(QueueTicket {
            limiter: self,
            key: key.clone(),
        })
    }

    fn lane(&self, key: &RateLimitKey) -> Arc<tokio::sync::Mutex<()>> {
        self.lanes
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Keeps a queued call counted against the queue depth until it is admitted
/// or its future is dropped.
struct QueueTicket<'a> {
    limiter: &'a RateLimiter,
    key: RateLimitKey,
}

impl Drop for QueueTicket<'_> {
    fn drop(&mut self) {
        if let Some(counter) = self.limiter.counters.lock().get_mut(&self.key) {
            counter.waiting = counter.waiting.saturating_sub(1);
        }
    }
}
