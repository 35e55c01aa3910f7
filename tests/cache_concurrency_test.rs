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

//! Integration tests for result caching across operator trees
//!
//! Exercises the at-most-once build guarantee end to end: shared sub-DAGs
//! within one query, identical roots across threads, and idempotent
//! re-evaluation.

use std::sync::Arc;
use std::thread;

use quiver::{
    get_result, ExecutionContext, Id, MultiColumnJoin, Operator, PresortedTableScan, QueryPool,
    ResultCache, TrackedAllocator, Variable,
};

fn int_rows(rows: &[&[i64]]) -> Vec<Vec<Id>> {
    rows.iter()
        .map(|row| row.iter().map(|&v| Id::int(v)).collect())
        .collect()
}

fn scan(name: &str, variables: &[&str], rows: &[&[i64]]) -> Box<dyn Operator> {
    let variables: Vec<Variable> = variables.iter().map(|n| Variable::new(*n)).collect();
    Box::new(
        PresortedTableScan::new(name, &variables, int_rows(rows)).expect("Failed to build scan"),
    )
}

#[test]
fn test_shared_sub_dag_computed_once() {
    let shared = || scan("shared", &["s", "x"], &[&[1, 10], &[2, 11]]);

    let join_b = MultiColumnJoin::new(shared(), scan("b", &["s", "y"], &[&[1, 20]]))
        .expect("join with b");
    let join_c = MultiColumnJoin::new(shared(), scan("c", &["s", "z"], &[&[2, 30]]))
        .expect("join with c");

    let ctx = ExecutionContext::new(
        TrackedAllocator::unlimited(),
        Arc::new(ResultCache::default()),
    );

    get_result(&join_b, &ctx).expect("first join");
    get_result(&join_c, &ctx).expect("second join");

    // Five distinct fingerprints were computed (shared, b, c, two joins);
    // the shared scan was a cache hit the second time around.
    let stats = ctx.result_cache().stats();
    assert_eq!(stats.misses, 5);
    assert_eq!(stats.hits, 1);
}

#[test]
fn test_idempotent_evaluation() {
    let join = MultiColumnJoin::new(
        scan("l", &["s", "x"], &[&[1, 10]]),
        scan("r", &["s", "y"], &[&[1, 20]]),
    )
    .expect("join");

    let ctx = ExecutionContext::new(
        TrackedAllocator::unlimited(),
        Arc::new(ResultCache::default()),
    );

    let first = get_result(&join, &ctx).expect("first evaluation");
    let second = get_result(&join, &ctx).expect("second evaluation");
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_concurrent_equal_roots_share_one_build() {
    let cache = Arc::new(ResultCache::default());
    let allocator = TrackedAllocator::unlimited();

    let rows: Vec<Vec<i64>> = (0..2000).map(|i| vec![i, i * 2]).collect();

    let mut handles = vec![];
    for _ in 0..4 {
        let cache = Arc::clone(&cache);
        let allocator = allocator.clone();
        let rows = rows.clone();
        handles.push(thread::spawn(move || {
            let row_refs: Vec<&[i64]> = rows.iter().map(|r| r.as_slice()).collect();
            let join = MultiColumnJoin::new(
                scan("big_l", &["s", "x"], &row_refs),
                scan("big_r", &["s", "y"], &row_refs),
            )
            .expect("join");
            let ctx = ExecutionContext::new(allocator, cache);
            get_result(&join, &ctx).expect("evaluation")
        }));
    }

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for result in &results[1..] {
        assert!(Arc::ptr_eq(&results[0], result));
    }

    // One build for the root, one for each scan.
    let stats = cache.stats();
    assert_eq!(stats.misses, 3);
}

#[test]
fn test_query_pool_with_shared_cache() {
    let cache = Arc::new(ResultCache::default());
    let pool = QueryPool::new(2).expect("Failed to build pool");

    let join = MultiColumnJoin::new(
        scan("pl", &["s", "x"], &[&[1, 10], &[2, 11]]),
        scan("pr", &["s", "y"], &[&[2, 20], &[3, 21]]),
    )
    .expect("join");

    let ctx = ExecutionContext::new(TrackedAllocator::unlimited(), cache);
    let result = pool.evaluate(&join, &ctx).expect("pool evaluation");
    assert_eq!(result.num_rows(), 1);
    assert_eq!(result.table().get(0, 0), Id::int(2));
}
