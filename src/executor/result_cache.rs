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

//! Fingerprint result cache with an at-most-once build guarantee
//!
//! Keyed by operator fingerprint; the value is a shared immutable
//! [`ResultTable`]. The cache guarantees that for a given fingerprint at
//! most one computation runs at a time: a caller that finds a build in
//! progress waits on its completion instead of starting a second one, and
//! shared sub-DAGs across concurrent queries deduplicate into one build.
//!
//! On computation failure the in-progress marker is removed and the failure
//! propagates to every waiter; later calls may retry. Eviction is bounded
//! by approximate bytes of held tables, least-recently-used first among
//! completed entries. In-progress entries are pinned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::core::{Error, Result};
use crate::executor::operator::ResultTable;

/// Default byte budget for completed cache entries
pub const DEFAULT_RESULT_CACHE_BYTES: usize = 128 * 1024 * 1024;

struct CompletedEntry {
    result: Arc<ResultTable>,
    bytes: usize,
    last_used: Instant,
}

enum Slot {
    /// A build is running; `waiters` callers are blocked on it
    InProgress { waiters: usize },
    /// A finished result, eligible for eviction
    Completed(CompletedEntry),
    /// A failed build whose error still has waiters to collect it
    Failed { error: Error, waiters_left: usize },
}

struct CacheInner {
    slots: FxHashMap<String, Slot>,
    completed_bytes: usize,
}

/// Cache statistics snapshot
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of slots (completed + in-progress + draining failures)
    pub entries: usize,
    /// Approximate bytes held by completed entries
    pub completed_bytes: usize,
    /// Completed-entry lookups served from the cache
    pub hits: u64,
    /// Lookups that claimed the slot and computed
    pub misses: u64,
    /// Completed entries evicted to stay under the byte budget
    pub evictions: u64,
}

/// Fingerprint-to-result cache shared by all queries
pub struct ResultCache {
    inner: Mutex<CacheInner>,
    cond: Condvar,
    max_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResultCache {
    /// Create a cache with the given byte budget for completed entries
    pub fn with_capacity(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                slots: FxHashMap::default(),
                completed_bytes: 0,
            }),
            cond: Condvar::new(),
            max_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up `key`, joining an in-flight build or computing on a miss.
    ///
    /// The build closure runs outside the cache lock. Exactly one closure
    /// runs concurrently per key; everyone else gets the same outcome.
    pub fn get_or_compute<F>(&self, key: &str, build: F) -> Result<Arc<ResultTable>>
    where
        F: FnOnce() -> Result<ResultTable>,
    {
        let mut build = Some(build);
        loop {
            let mut inner = self.inner.lock();
            match inner.slots.get_mut(key) {
                Some(Slot::Completed(entry)) => {
                    entry.last_used = Instant::now();
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Arc::clone(&entry.result));
                }
                Some(Slot::InProgress { waiters }) => {
                    *waiters += 1;
                    loop {
                        self.cond.wait(&mut inner);
                        match inner.slots.get_mut(key) {
                            Some(Slot::InProgress { .. }) => continue,
                            Some(Slot::Completed(entry)) => {
                                entry.last_used = Instant::now();
                                self.hits.fetch_add(1, Ordering::Relaxed);
                                return Ok(Arc::clone(&entry.result));
                            }
                            Some(Slot::Failed {
                                error,
                                waiters_left,
                            }) => {
                                let error = error.clone();
                                *waiters_left -= 1;
                                let drained = *waiters_left == 0;
                                if drained {
                                    inner.slots.remove(key);
                                }
                                return Err(error);
                            }
                            // The finished entry was evicted before this
                            // waiter woke; start over as a fresh lookup.
                            None => break,
                        }
                    }
                }
                Some(Slot::Failed { error, waiters_left }) => {
                    let error = error.clone();
                    let drained = *waiters_left == 0;
                    if drained {
                        // Stale failure record; clear and retry the build.
                        inner.slots.remove(key);
                        continue;
                    }
                    return Err(error);
                }
                None => {
                    inner
                        .slots
                        .insert(key.to_string(), Slot::InProgress { waiters: 0 });
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    drop(inner);

                    let outcome = (build.take().expect("cache build ran twice"))();
                    return self.publish(key, outcome);
                }
            }
        }
    }

    /// Publish a build outcome and wake all waiters
    fn publish(&self, key: &str, outcome: Result<ResultTable>) -> Result<Arc<ResultTable>> {
        let mut inner = self.inner.lock();
        let waiters = match inner.slots.remove(key) {
            Some(Slot::InProgress { waiters }) => waiters,
            _ => 0,
        };

        let published = match outcome {
            Ok(result) => {
                let result = Arc::new(result);
                let bytes = result.heap_bytes();
                inner.slots.insert(
                    key.to_string(),
                    Slot::Completed(CompletedEntry {
                        result: Arc::clone(&result),
                        bytes,
                        last_used: Instant::now(),
                    }),
                );
                inner.completed_bytes += bytes;
                self.evict_over_budget(&mut inner);
                Ok(result)
            }
            Err(error) => {
                if waiters > 0 {
                    inner.slots.insert(
                        key.to_string(),
                        Slot::Failed {
                            error: error.clone(),
                            waiters_left: waiters,
                        },
                    );
                }
                Err(error)
            }
        };

        drop(inner);
        self.cond.notify_all();
        published
    }

    /// Evict least-recently-used completed entries until the byte budget
    /// holds. In-progress entries are never touched.
    fn evict_over_budget(&self, inner: &mut CacheInner) {
        while inner.completed_bytes > self.max_bytes {
            let oldest = inner
                .slots
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Completed(entry) => Some((key, entry.last_used)),
                    _ => None,
                })
                .min_by_key(|&(_, last_used)| last_used)
                .map(|(key, _)| key.clone());

            let Some(key) = oldest else { break };
            if let Some(Slot::Completed(entry)) = inner.slots.remove(&key) {
                inner.completed_bytes -= entry.bytes;
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Drop all completed entries; in-flight builds are unaffected
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner
            .slots
            .retain(|_, slot| !matches!(slot, Slot::Completed(_)));
        inner.completed_bytes = 0;
    }

    /// Number of slots currently held
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Whether the cache holds no slots
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.slots.len(),
            completed_bytes: inner.completed_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RESULT_CACHE_BYTES)
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ResultCache")
            .field("entries", &stats.entries)
            .field("completed_bytes", &stats.completed_bytes)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}
