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

//! Integration tests for the full join pipeline
//!
//! Drives index scans and multi-column joins through the public surface:
//! operator trees, the execution context and the result cache.

use std::sync::Arc;

use quiver::{
    get_result, ExecutionContext, Id, InMemoryIndex, IndexScan, MultiColumnJoin, Operator,
    PresortedTableScan, ResultCache, ResultTable, TrackedAllocator, Variable,
};

fn test_ctx() -> ExecutionContext {
    ExecutionContext::new(
        TrackedAllocator::unlimited(),
        Arc::new(ResultCache::default()),
    )
}

fn vars(names: &[&str]) -> Vec<Variable> {
    names.iter().map(|n| Variable::new(*n)).collect()
}

fn int_rows(rows: &[&[i64]]) -> Vec<Vec<Id>> {
    rows.iter()
        .map(|row| row.iter().map(|&v| Id::int(v)).collect())
        .collect()
}

fn collect_rows(result: &ResultTable) -> Vec<Vec<Id>> {
    let table = result.table();
    (0..table.num_rows())
        .map(|r| (0..table.num_columns()).map(|c| table.get(r, c)).collect())
        .collect()
}

#[test]
fn test_index_scan_join_pipeline() {
    // ?person knows ?friend, joined with ?person livesIn ?city.
    let knows = Arc::new(
        InMemoryIndex::new(
            "knows",
            2,
            int_rows(&[&[1, 2], &[1, 3], &[2, 3]]),
        )
        .expect("Failed to build knows index"),
    );
    let lives_in = Arc::new(
        InMemoryIndex::new("livesIn", 2, int_rows(&[&[1, 100], &[3, 101]]))
            .expect("Failed to build livesIn index"),
    );

    let left = IndexScan::new(knows, &vars(&["person", "friend"]), vec![0, 1])
        .expect("Failed to build left scan");
    let right = IndexScan::new(lives_in, &vars(&["person", "city"]), vec![0, 1])
        .expect("Failed to build right scan");

    let join = MultiColumnJoin::new(Box::new(left), Box::new(right))
        .expect("Failed to build join");
    assert_eq!(join.width(), 3);

    let ctx = test_ctx();
    let result = get_result(&join, &ctx).expect("Join failed");

    // Person 1 lives somewhere and knows 2 and 3.
    let mut rows = collect_rows(&result);
    rows.sort();
    assert_eq!(
        rows,
        int_rows(&[&[1, 2, 100], &[1, 3, 100]])
    );
    assert!(result.table().is_sorted_by(result.sorted_on()));
}

#[test]
fn test_three_way_join() {
    let a = PresortedTableScan::new(
        "a",
        &vars(&["s", "x"]),
        int_rows(&[&[1, 10], &[2, 11], &[3, 12]]),
    )
    .expect("scan a");
    let b = PresortedTableScan::new("b", &vars(&["s", "y"]), int_rows(&[&[1, 20], &[2, 21]]))
        .expect("scan b");
    let c = PresortedTableScan::new("c", &vars(&["s", "z"]), int_rows(&[&[2, 30], &[9, 31]]))
        .expect("scan c");

    let inner = MultiColumnJoin::new(Box::new(a), Box::new(b)).expect("inner join");
    assert_eq!(inner.sorted_on(), vec![0]);

    let outer = MultiColumnJoin::new(Box::new(inner), Box::new(c)).expect("outer join");
    assert_eq!(outer.width(), 4);

    let ctx = test_ctx();
    let result = get_result(&outer, &ctx).expect("Three-way join failed");
    assert_eq!(collect_rows(&result), int_rows(&[&[2, 11, 21, 30]]));
}

#[test]
fn test_equal_fingerprints_yield_equal_results() {
    let build = || {
        let left = PresortedTableScan::new(
            "l",
            &vars(&["s", "x"]),
            int_rows(&[&[1, 10], &[1, 11], &[2, 12]]),
        )
        .expect("left scan");
        let right =
            PresortedTableScan::new("r", &vars(&["s", "y"]), int_rows(&[&[1, 20], &[2, 21]]))
                .expect("right scan");
        MultiColumnJoin::new(Box::new(left), Box::new(right)).expect("join")
    };

    let first = build();
    let second = build();
    assert_eq!(first.cache_key(), second.cache_key());

    // Separate caches force two independent computations.
    let result_a = get_result(&first, &test_ctx()).expect("first evaluation");
    let result_b = get_result(&second, &test_ctx()).expect("second evaluation");

    let mut rows_a = collect_rows(&result_a);
    let mut rows_b = collect_rows(&result_b);
    rows_a.sort();
    rows_b.sort();
    assert_eq!(rows_a, rows_b);
    assert_eq!(result_a.sorted_on(), result_b.sorted_on());
}

#[test]
fn test_join_commutativity() {
    let left = || {
        PresortedTableScan::new(
            "people",
            &vars(&["s", "name"]),
            int_rows(&[&[1, 50], &[2, 51]]),
        )
        .expect("people scan")
    };
    let right = || {
        PresortedTableScan::new(
            "ages",
            &vars(&["s", "age"]),
            int_rows(&[&[1, 30], &[3, 40]]),
        )
        .expect("ages scan")
    };

    let ab = MultiColumnJoin::new(Box::new(left()), Box::new(right())).expect("ab");
    let ba = MultiColumnJoin::new(Box::new(right()), Box::new(left())).expect("ba");
    assert_eq!(ab.cache_key(), ba.cache_key());

    let rows_ab = collect_rows(&get_result(&ab, &test_ctx()).expect("ab result"));
    let rows_ba = collect_rows(&get_result(&ba, &test_ctx()).expect("ba result"));
    assert_eq!(rows_ab, rows_ba);
}

#[test]
fn test_width_invariant_across_shapes() {
    let shapes: &[(&[&str], &[&str])] = &[
        (&["s", "x"], &["s", "y"]),
        (&["s", "p", "x"], &["s", "p", "y"]),
        (&["s", "p", "o"], &["s", "p", "o"]),
    ];

    for (left_vars, right_vars) in shapes {
        let row: Vec<i64> = (0..left_vars.len() as i64).collect();
        let left = PresortedTableScan::new("l", &vars(left_vars), int_rows(&[&row]))
            .expect("left scan");
        let row: Vec<i64> = (0..right_vars.len() as i64).collect();
        let right = PresortedTableScan::new("r", &vars(right_vars), int_rows(&[&row]))
            .expect("right scan");

        let shared = left_vars.iter().filter(|v| right_vars.contains(v)).count();
        let join = MultiColumnJoin::new(Box::new(left), Box::new(right)).expect("join");
        assert_eq!(
            join.width(),
            left_vars.len() + right_vars.len() - shared
        );

        let result = get_result(&join, &test_ctx()).expect("join result");
        assert_eq!(result.table().num_columns(), join.width());
    }
}

#[test]
fn test_undef_join_end_to_end() {
    // An UNDEF subject matches every subject on the right.
    let left = PresortedTableScan::new(
        "a_optional",
        &vars(&["s", "x"]),
        vec![
            vec![Id::UNDEFINED, Id::int(99)],
            vec![Id::int(2), Id::int(42)],
        ],
    )
    .expect("left scan");
    let right = PresortedTableScan::new(
        "base",
        &vars(&["s", "y"]),
        int_rows(&[&[1, 70], &[2, 71]]),
    )
    .expect("right scan");

    let join = MultiColumnJoin::new(Box::new(left), Box::new(right)).expect("join");
    let result = get_result(&join, &test_ctx()).expect("undef join failed");

    let mut rows = collect_rows(&result);
    rows.sort();
    // The UNDEF row matched both right rows and took their subject values.
    assert_eq!(
        rows,
        int_rows(&[&[1, 99, 70], &[2, 42, 71], &[2, 99, 71]])
    );
    assert!(result.table().is_sorted_by(result.sorted_on()));
}
