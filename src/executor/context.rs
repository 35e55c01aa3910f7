// Copyright 2025 Quiver Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Execution context and cooperative cancellation
//!
//! Query evaluation runs as a cooperative task: every operator polls a
//! [`CancellationHandle`] at each logical phase and inside inner loops every
//! [`CANCELLATION_CHECK_INTERVAL_ROWS`] rows. A handle holds one of three
//! states (Active, TimedOut, Cancelled); polling an inactive handle raises
//! the matching error. The optional watchdog logs when the gap between two
//! polls exceeds its interval - a diagnostic for operators that forget to
//! poll, it never affects execution.
//!
//! Deadlines are driven by a single global timer thread: arming one returns
//! a [`TimeoutGuard`] that disarms the timer when the operation completes
//! normally.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, LazyLock, Mutex};
use std::time::{Duration, Instant};

use crate::core::{Error, Result};
use crate::executor::result_cache::ResultCache;
use crate::memory::TrackedAllocator;

/// How many rows a hot inner loop may process between cancellation polls
pub const CANCELLATION_CHECK_INTERVAL_ROWS: usize = 16_384;

/// Default watchdog interval: a poll gap above this is logged
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_millis(50);

// Cancellation states, stored in one atomic byte.
const STATE_ACTIVE: u8 = 0;
const STATE_TIMED_OUT: u8 = 1;
const STATE_CANCELLED: u8 = 2;

#[derive(Debug)]
struct HandleInner {
    state: AtomicU8,
    /// Watchdog interval in microseconds; 0 disables the watchdog
    watchdog_interval_micros: u64,
    started: Instant,
    /// Microseconds since `started` at the last poll
    last_poll_micros: AtomicU64,
}

/// Shared tri-state cancellation flag
///
/// Clones share the same state; the first transition away from Active wins.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    inner: Arc<HandleInner>,
}

impl CancellationHandle {
    /// Create an active handle without a watchdog
    pub fn new() -> Self {
        Self::with_interval(0)
    }

    /// Create an active handle whose watchdog logs poll gaps above `interval`
    pub fn with_watchdog(interval: Duration) -> Self {
        Self::with_interval(interval.as_micros() as u64)
    }

    fn with_interval(watchdog_interval_micros: u64) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                state: AtomicU8::new(STATE_ACTIVE),
                watchdog_interval_micros,
                started: Instant::now(),
                last_poll_micros: AtomicU64::new(0),
            }),
        }
    }

    /// Poll the handle: returns an error when cancelled or timed out
    pub fn check(&self) -> Result<()> {
        match self.inner.state.load(Ordering::Relaxed) {
            STATE_ACTIVE => {
                self.feed_watchdog();
                Ok(())
            }
            STATE_TIMED_OUT => Err(Error::TimedOut),
            _ => Err(Error::Cancelled),
        }
    }

    fn feed_watchdog(&self) {
        let interval = self.inner.watchdog_interval_micros;
        if interval == 0 {
            return;
        }
        let now = self.inner.started.elapsed().as_micros() as u64;
        let last = self.inner.last_poll_micros.swap(now, Ordering::Relaxed);
        let gap = now.saturating_sub(last);
        if gap > interval {
            tracing::warn!(
                gap_ms = gap / 1000,
                interval_ms = interval / 1000,
                "cancellation check interval exceeded"
            );
        }
    }

    /// Flip the handle to Cancelled; a no-op if it already left Active
    pub fn cancel(&self) {
        let _ = self.inner.state.compare_exchange(
            STATE_ACTIVE,
            STATE_CANCELLED,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    /// Flip the handle to TimedOut; a no-op if it already left Active
    pub fn time_out(&self) {
        let _ = self.inner.state.compare_exchange(
            STATE_ACTIVE,
            STATE_TIMED_OUT,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    /// Whether the handle is still Active
    pub fn is_active(&self) -> bool {
        self.inner.state.load(Ordering::Relaxed) == STATE_ACTIVE
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Execution context for query evaluation
///
/// Carries the shared memory budget, the result cache and the cancellation
/// handle. Cloning is cheap; clones share all three.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    allocator: TrackedAllocator,
    cache: Arc<ResultCache>,
    cancellation: CancellationHandle,
}

impl ExecutionContext {
    /// Create a context with a fresh cancellation handle
    pub fn new(allocator: TrackedAllocator, cache: Arc<ResultCache>) -> Self {
        Self {
            allocator,
            cache,
            cancellation: CancellationHandle::new(),
        }
    }

    /// Replace the cancellation handle (e.g. to enable the watchdog)
    pub fn with_cancellation(mut self, handle: CancellationHandle) -> Self {
        self.cancellation = handle;
        self
    }

    /// The shared memory budget
    pub fn allocator(&self) -> &TrackedAllocator {
        &self.allocator
    }

    /// The shared result cache
    pub fn result_cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// The cancellation handle polled by all operators in this query
    pub fn cancellation(&self) -> &CancellationHandle {
        &self.cancellation
    }

    /// Cancel the query
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Check for cancellation and return an error if no longer active
    pub fn check_cancelled(&self) -> Result<()> {
        self.cancellation.check()
    }

    /// Arm a deadline for this context's cancellation handle.
    ///
    /// When the deadline fires the handle flips to TimedOut. Dropping the
    /// returned guard disarms the timer, so hold it for the duration of the
    /// operation.
    #[must_use = "dropping the guard disarms the deadline"]
    pub fn setup_cancellation_handle(&self, timeout: Duration) -> TimeoutGuard {
        TimeoutManager::global().register(timeout, self.cancellation.clone())
    }
}

// ============================================================================
// Global Timeout Manager
// ============================================================================
//
// Uses a single background thread to manage all query deadlines. This avoids
// spawning a new thread for each query with a timeout.

/// Entry in the timeout priority queue
struct TimeoutEntry {
    /// When the deadline expires
    deadline: Instant,
    /// Unique ID for this timeout
    id: u64,
    /// Handle to flip when the deadline fires
    handle: CancellationHandle,
    /// Whether this deadline has been disarmed (operation completed)
    disarmed: Arc<AtomicBool>,
}

impl PartialEq for TimeoutEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Eq for TimeoutEntry {}

impl PartialOrd for TimeoutEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeoutEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse ordering so BinaryHeap becomes a min-heap (earliest deadline first)
        other.deadline.cmp(&self.deadline)
    }
}

struct TimeoutManagerState {
    /// Pending deadlines (min-heap by deadline)
    timeouts: BinaryHeap<TimeoutEntry>,
}

/// Global timeout manager that drives all query deadlines in one thread
struct TimeoutManager {
    state: Mutex<TimeoutManagerState>,
    condvar: Condvar,
    next_id: AtomicU64,
}

static TIMEOUT_MANAGER: LazyLock<Arc<TimeoutManager>> = LazyLock::new(TimeoutManager::new);

impl TimeoutManager {
    fn global() -> &'static Arc<TimeoutManager> {
        &TIMEOUT_MANAGER
    }

    /// Create the manager and spawn its background thread
    fn new() -> Arc<Self> {
        let manager = Arc::new(Self {
            state: Mutex::new(TimeoutManagerState {
                timeouts: BinaryHeap::new(),
            }),
            condvar: Condvar::new(),
            next_id: AtomicU64::new(1),
        });

        let manager_clone = Arc::clone(&manager);
        std::thread::Builder::new()
            .name("quiver-timeout-manager".to_string())
            .spawn(move || {
                manager_clone.run();
            })
            .expect("Failed to spawn timeout manager thread");

        manager
    }

    /// Background thread loop
    fn run(&self) {
        let mut state = self.state.lock().unwrap();
        loop {
            // Fire expired deadlines.
            let now = Instant::now();
            while let Some(entry) = state.timeouts.peek() {
                if entry.deadline <= now {
                    let entry = state.timeouts.pop().unwrap();
                    if !entry.disarmed.load(Ordering::Relaxed) {
                        entry.handle.time_out();
                    }
                } else {
                    break;
                }
            }

            // Wait until the next deadline, or indefinitely for new work.
            let wait_duration = if let Some(entry) = state.timeouts.peek() {
                entry.deadline.saturating_duration_since(now)
            } else {
                Duration::from_secs(3600)
            };

            if wait_duration.is_zero() {
                continue;
            }
            let (new_state, _timeout_result) =
                self.condvar.wait_timeout(state, wait_duration).unwrap();
            state = new_state;
        }
    }

    /// Arm a deadline; the returned guard disarms it on drop
    fn register(&self, timeout: Duration, handle: CancellationHandle) -> TimeoutGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + timeout;
        let disarmed = Arc::new(AtomicBool::new(false));

        let entry = TimeoutEntry {
            deadline,
            id,
            handle,
            disarmed: Arc::clone(&disarmed),
        };

        let mut state = self.state.lock().unwrap();
        let is_earliest = state.timeouts.peek().is_none_or(|e| deadline < e.deadline);
        state.timeouts.push(entry);
        drop(state);

        // Wake the timer thread if its current wait would overshoot.
        if is_earliest {
            self.condvar.notify_one();
        }

        TimeoutGuard { disarmed }
    }
}

/// Disarms a registered deadline when dropped
#[derive(Debug)]
pub struct TimeoutGuard {
    disarmed: Arc<AtomicBool>,
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.disarmed.store(true, Ordering::Relaxed);
    }
}
