//! Rate limiting for remote storage calls
//!
//! Drive enforces a per-user quota expressed as "N requests per T seconds".
//! Every remote call the engine makes goes through one shared
//! [`RateLimiter`] so that concurrent workers never exceed that quota.
//!
//! ## Architecture
//!
//! - [`RateLimiter`]: sliding-window log of recent grants. Any window of
//!   length `window` contains at most `limit` grants.
//! - [`ThrottledProvider`]: decorator over an [`IStorageProvider`] that
//!   acquires from the limiter before each call, bounds the call with a
//!   deadline and feeds throttle/success signals back into the limiter.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use drivemig_engine::rate_limit::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(12_000, Duration::from_secs(60));
//! limiter.acquire(1).await;
//! // ... make API call ...
//! limiter.on_success();
//! # }
//! ```
//!
//! ## Design Notes
//!
//! The effective limit shrinks by half when the provider reports
//! throttling, at most once per window and never below an eighth of the
//! configured limit. Every 100 successful calls grow it back by 5%, never
//! above the configured limit.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use drivemig_core::config::PerformanceConfig;
use drivemig_core::domain::{Node, NodeId, NodeKind, ObjectMetadata};
use drivemig_core::ports::{IStorageProvider, ListPage, NodeAttributes, StorageError};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Successful calls between two recovery steps
const RECOVERY_INTERVAL: u64 = 100;

/// Throttling never takes the effective limit below `limit / THROTTLE_FLOOR`
const THROTTLE_FLOOR: u32 = 8;

// ============================================================================
// RateLimiter
// ============================================================================

#[derive(Debug)]
struct WindowState {
    /// Grant instants inside the current window, oldest first
    grants: VecDeque<Instant>,
    /// Limit after adaptive adjustments
    effective_limit: u32,
    /// Successes since the last throttle or recovery step
    successes: u64,
    /// When the effective limit was last halved
    last_reduction: Option<Instant>,
}

impl WindowState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.grants.front() {
            if *front + window <= now {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window rate limiter shared by all callers of one provider
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// Creates a limiter allowing `limit` grants per `window`
    ///
    /// A zero limit is treated as one.
    pub fn new(limit: u32, window: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            window,
            state: Mutex::new(WindowState {
                grants: VecDeque::with_capacity(limit.min(4096) as usize),
                effective_limit: limit,
                successes: 0,
                last_reduction: None,
            }),
        }
    }

    pub fn from_config(config: &PerformanceConfig) -> Self {
        Self::new(config.user_rate_limit, config.window())
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Current limit after throttle adjustments
    pub fn effective_limit(&self) -> u32 {
        self.lock().effective_limit
    }

    /// Number of grants inside the current window
    pub fn in_window(&self) -> usize {
        let mut state = self.lock();
        state.prune(Instant::now(), self.window);
        state.grants.len()
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lowest effective limit throttling can reach
    pub fn floor(&self) -> u32 {
        (self.limit / THROTTLE_FLOOR).max(1)
    }

    /// Waits until `cost` grants fit in the window, then records them
    ///
    /// A cost larger than the current budget is taken in budget-sized
    /// slices over consecutive windows, so no window ever holds more
    /// grants than the limit.
    pub async fn acquire(&self, cost: u32) {
        let mut remaining = cost.max(1);
        while remaining > 0 {
            let slice = remaining.min(self.effective_limit());
            self.acquire_slice(slice as usize).await;
            remaining -= slice;
        }
    }

    async fn acquire_slice(&self, cost: usize) {
        loop {
            let wait = {
                let mut state = self.lock();
                let now = Instant::now();
                state.prune(now, self.window);

                // The limit may have been halved since the slice was sized
                let budget = (state.effective_limit as usize).max(cost);
                if state.grants.len() + cost <= budget {
                    for _ in 0..cost {
                        state.grants.push_back(now);
                    }
                    return;
                }

                let excess = state.grants.len() + cost - budget;
                match state.grants.get(excess - 1) {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            debug!(
                wait_ms = wait.as_millis() as u64,
                cost, "Rate limit reached, waiting for window to slide"
            );
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Halves the effective limit after the provider reported throttling
    ///
    /// Responses throttled within one window of the last reduction belong
    /// to the same burst and leave the limit alone.
    pub fn on_throttle(&self) {
        let mut state = self.lock();
        let now = Instant::now();
        state.successes = 0;

        if let Some(last) = state.last_reduction {
            if now < last + self.window {
                debug!(
                    effective_limit = state.effective_limit,
                    "Throttled again within the same window"
                );
                return;
            }
        }

        let old_limit = state.effective_limit;
        state.effective_limit = (old_limit / 2).max(self.floor());
        state.last_reduction = Some(now);
        warn!(
            old_limit,
            new_limit = state.effective_limit,
            "Provider throttled requests, reducing rate limit"
        );
    }

    /// Records a successful call; every 100 successes recover 5% of the limit
    pub fn on_success(&self) {
        let mut state = self.lock();
        state.successes += 1;

        if state.successes % RECOVERY_INTERVAL == 0 && state.effective_limit < self.limit {
            let old_limit = state.effective_limit;
            let increase = ((old_limit as f64 * 0.05) as u32).max(1);
            state.effective_limit = (old_limit + increase).min(self.limit);
            debug!(
                old_limit,
                new_limit = state.effective_limit,
                successes = state.successes,
                "Adaptive recovery: increasing rate limit"
            );
        }
    }
}

// ============================================================================
// ThrottledProvider
// ============================================================================

/// Storage provider decorator applying the shared rate limit and deadline
///
/// Creating an object with sharing metadata costs one grant per
/// transferable permission on top of the call itself, since each
/// permission is a separate request upstream.
pub struct ThrottledProvider {
    inner: Arc<dyn IStorageProvider>,
    limiter: Arc<RateLimiter>,
    call_timeout: Option<Duration>,
}

impl ThrottledProvider {
    pub fn new(inner: Arc<dyn IStorageProvider>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            inner,
            limiter,
            call_timeout: None,
        }
    }

    /// Bounds every call; an expired call fails with `StorageError::Timeout`
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn cost_of(attributes: &NodeAttributes) -> u32 {
        let grants = attributes
            .sharing
            .as_ref()
            .map(|s| s.transferable_grants().count())
            .unwrap_or(0);
        1 + grants as u32
    }

    async fn call<T, F>(&self, cost: u32, call: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>> + Send,
    {
        self.limiter.acquire(cost).await;

        let result = match self.call_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, call).await {
                Ok(result) => result,
                Err(_) => Err(StorageError::Timeout(deadline)),
            },
            None => call.await,
        };

        match &result {
            Ok(_) => self.limiter.on_success(),
            Err(StorageError::RateLimited { .. }) => self.limiter.on_throttle(),
            Err(_) => {}
        }
        result
    }
}

#[async_trait]
impl IStorageProvider for ThrottledProvider {
    async fn list_children(
        &self,
        folder_id: &NodeId,
        page_token: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        self.call(1, self.inner.list_children(folder_id, page_token))
            .await
    }

    async fn find_child(
        &self,
        parent_id: &NodeId,
        name: &str,
        kind: NodeKind,
    ) -> Result<Option<Node>, StorageError> {
        self.call(1, self.inner.find_child(parent_id, name, kind))
            .await
    }

    async fn create_folder(
        &self,
        parent_id: &NodeId,
        name: &str,
        attributes: &NodeAttributes,
    ) -> Result<NodeId, StorageError> {
        self.call(
            Self::cost_of(attributes),
            self.inner.create_folder(parent_id, name, attributes),
        )
        .await
    }

    async fn copy_file(
        &self,
        source_id: &NodeId,
        destination_parent_id: &NodeId,
        name: &str,
        attributes: &NodeAttributes,
    ) -> Result<NodeId, StorageError> {
        self.call(
            Self::cost_of(attributes),
            self.inner
                .copy_file(source_id, destination_parent_id, name, attributes),
        )
        .await
    }

    async fn get_metadata(&self, id: &NodeId) -> Result<ObjectMetadata, StorageError> {
        self.call(1, self.inner.get_metadata(id)).await
    }

    async fn get_node(&self, id: &NodeId) -> Result<Node, StorageError> {
        self.call(1, self.inner.get_node(id)).await
    }
}
