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

//! Memory budget tracking and enforcement
//!
//! Every [`IdTable`](crate::core::IdTable) allocation is routed through a
//! [`TrackedAllocator`]: a cloneable handle around a shared atomic byte
//! counter with a hard limit. Allocations that would exceed the limit fail
//! immediately with [`Error::OutOfMemory`]; nothing is queued or retried.
//!
//! The counter tracks reservations, not exact heap usage. Table growth
//! reserves the new capacity before resizing and releases it when the table
//! is dropped, so a runaway join fails deterministically instead of
//! exhausting system memory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::core::{Error, Result};

/// Snapshot of an allocator's budget
#[derive(Debug, Clone, Copy)]
pub struct AllocatorStats {
    /// Hard limit in bytes
    pub limit: usize,
    /// Currently reserved bytes
    pub used: usize,
}

impl AllocatorStats {
    /// Bytes still available under the limit
    pub fn available(&self) -> usize {
        self.limit.saturating_sub(self.used)
    }
}

impl std::fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} bytes", self.used, self.limit)
    }
}

#[derive(Debug)]
struct AllocatorInner {
    limit: usize,
    used: AtomicUsize,
}

/// Cloneable handle to a shared memory budget
///
/// Clones share the same counter; the budget is process-wide for all tables
/// bound to the same allocator.
#[derive(Debug, Clone)]
pub struct TrackedAllocator {
    inner: Arc<AllocatorInner>,
}

impl TrackedAllocator {
    /// Create an allocator with a hard byte limit
    pub fn with_limit(limit: usize) -> Self {
        Self {
            inner: Arc::new(AllocatorInner {
                limit,
                used: AtomicUsize::new(0),
            }),
        }
    }

    /// Create an allocator without a practical limit (for tests and tools)
    pub fn unlimited() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Reserve `bytes` from the budget
    ///
    /// Fails with [`Error::OutOfMemory`] without mutating the counter when
    /// the reservation would exceed the limit.
    pub fn allocate(&self, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }

        loop {
            let current = self.inner.used.load(Ordering::Acquire);
            let new_used = current.checked_add(bytes).unwrap_or(usize::MAX);
            if new_used > self.inner.limit {
                return Err(Error::out_of_memory(
                    bytes,
                    self.inner.limit.saturating_sub(current),
                ));
            }

            match self.inner.used.compare_exchange_weak(
                current,
                new_used,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(_) => continue,
            }
        }
    }

    /// Return `bytes` to the budget (saturating; never underflows)
    pub fn release(&self, bytes: usize) {
        if bytes == 0 {
            return;
        }

        loop {
            let current = self.inner.used.load(Ordering::Acquire);
            let new_used = current.saturating_sub(bytes);

            match self.inner.used.compare_exchange_weak(
                current,
                new_used,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(_) => continue,
            }
        }
    }

    /// Currently reserved bytes
    pub fn used(&self) -> usize {
        self.inner.used.load(Ordering::Acquire)
    }

    /// The hard limit in bytes
    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    /// Snapshot of the budget
    pub fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            limit: self.limit(),
            used: self.used(),
        }
    }
}
