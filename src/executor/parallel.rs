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

//! Worker pools for query and update scheduling
//!
//! Three kinds of workers drive the engine:
//!
//! - [`QueryPool`] - a fixed-size rayon pool evaluating query operator
//!   trees in parallel; evaluation itself is cooperative (operators poll
//!   cancellation, they are never preempted).
//! - [`UpdateQueue`] - a single background worker draining submitted
//!   closures in order, serializing mutations with respect to each other.
//! - the global timeout manager thread (see
//!   [`context`](crate::executor::context)), which drives deadline
//!   cancellations.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};

use crate::core::{Error, Result};
use crate::executor::context::ExecutionContext;
use crate::executor::operator::{get_result, Operator, ResultTable};

/// Fixed-size worker pool for query evaluation
pub struct QueryPool {
    pool: rayon::ThreadPool,
}

impl QueryPool {
    /// Create a pool with `num_threads` workers (0 = one per CPU core)
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("quiver-query-{i}"))
            .build()
            .map_err(|e| Error::internal(format!("failed to build query pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Evaluate an operator tree on this pool, blocking until done
    pub fn evaluate(
        &self,
        op: &dyn Operator,
        ctx: &ExecutionContext,
    ) -> Result<Arc<ResultTable>> {
        self.pool.install(|| get_result(op, ctx))
    }

    /// Run an arbitrary job on this pool
    pub fn install<R: Send>(&self, job: impl FnOnce() -> R + Send) -> R {
        self.pool.install(job)
    }

    /// Number of worker threads
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

type UpdateTask = Box<dyn FnOnce() + Send>;

/// Single-worker queue serializing update operations
///
/// Mutations must be atomic with respect to concurrent readers; funneling
/// them through one worker makes them atomic with respect to each other as
/// well. Tasks run in submission order.
pub struct UpdateQueue {
    sender: Option<Sender<UpdateTask>>,
    worker: Option<JoinHandle<()>>,
}

impl UpdateQueue {
    /// Create the queue and spawn its worker thread
    pub fn new() -> Self {
        let (sender, receiver) = unbounded::<UpdateTask>();
        let worker = std::thread::Builder::new()
            .name("quiver-update-worker".to_string())
            .spawn(move || {
                for task in receiver {
                    task();
                }
            })
            .expect("Failed to spawn update worker thread");

        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    /// Enqueue an update without waiting for it
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<()> {
        self.sender
            .as_ref()
            .expect("update queue sender missing")
            .send(Box::new(task))
            .map_err(|_| Error::internal("update worker is gone"))
    }

    /// Run an update on the worker and wait for its outcome
    pub fn execute<R: Send + 'static>(
        &self,
        task: impl FnOnce() -> R + Send + 'static,
    ) -> Result<R> {
        let (done_tx, done_rx) = unbounded();
        self.submit(move || {
            let _ = done_tx.send(task());
        })?;
        done_rx
            .recv()
            .map_err(|_| Error::internal("update worker dropped the result"))
    }
}

impl Default for UpdateQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UpdateQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Id;
    use crate::executor::operator::Variable;
    use crate::executor::result_cache::ResultCache;
    use crate::executor::scan::PresortedTableScan;
    use crate::memory::TrackedAllocator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_query_pool_evaluates_operator() {
        let pool = QueryPool::new(2).unwrap();
        assert_eq!(pool.num_threads(), 2);

        let scan = PresortedTableScan::new(
            "pool",
            &[Variable::new("x")],
            vec![vec![Id::int(1)], vec![Id::int(2)]],
        )
        .unwrap();
        let ctx = ExecutionContext::new(
            TrackedAllocator::unlimited(),
            Arc::new(ResultCache::default()),
        );

        let result = pool.evaluate(&scan, &ctx).unwrap();
        assert_eq!(result.num_rows(), 2);
    }

    #[test]
    fn test_update_queue_serializes_in_order() {
        let queue = UpdateQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let log = Arc::clone(&log);
            queue.submit(move || log.lock().unwrap().push(i)).unwrap();
        }
        // A blocking task flushes everything submitted before it.
        queue.execute(|| ()).unwrap();

        let log = log.lock().unwrap();
        assert_eq!(*log, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_update_queue_execute_returns_value() {
        let queue = UpdateQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let value = queue
            .execute(move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                41 + 1
            })
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_update_queue_drains_on_drop() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let queue = UpdateQueue::new();
            for _ in 0..50 {
                let counter = Arc::clone(&counter);
                queue
                    .submit(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }
}
