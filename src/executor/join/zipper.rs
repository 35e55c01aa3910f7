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

//! Zipper join: sort-merge with an optional UNDEF fallback path
//!
//! Walks two sorted join-column projections with paired cursors. In cheap
//! mode (no UNDEF anywhere in the join columns) this is a plain sort-merge:
//! advance the smaller side, and emit the cartesian product of every pair
//! of maximal equal runs. Complexity O(|L| + |R| + |output|).
//!
//! In UNDEF-aware mode, a row whose key contains UNDEF matches every key
//! that agrees on all its defined positions. UNDEF sorts first, so every
//! row compatible with the current key thanks to UNDEF wildcards lies in
//! the already-consumed prefix of the other side. The join tracks those
//! UNDEF-containing rows as it passes them and, at each cursor advancement,
//! emits the additional matches against them. Those extra rows leave the
//! sorted output stream; the returned count tells the caller whether a
//! post-sort is required. Cheap mode always returns zero.

use std::cmp::Ordering;

use crate::core::{IdTableView, Result};

/// How often the merge loop polls the cancellation probe
const CHECK_EVERY_STEPS: usize = 1024;

/// Sort-merge join over two sorted views of equal width.
///
/// `add_row(l, r)` is invoked for every matching pair of row indices;
/// `check` is the cancellation probe. Returns the number of rows emitted
/// outside the naturally sorted stream. If it is nonzero the caller must
/// re-sort the output by the join-column prefix.
pub fn zipper_join<F, C>(
    left: &IdTableView<'_>,
    right: &IdTableView<'_>,
    undef_aware: bool,
    add_row: &mut F,
    check: &C,
) -> Result<usize>
where
    F: FnMut(usize, usize) -> Result<()>,
    C: Fn() -> Result<()>,
{
    debug_assert_eq!(left.num_columns(), right.num_columns());
    let num_left = left.num_rows();
    let num_right = right.num_rows();

    let mut il = 0;
    let mut ir = 0;
    let mut out_of_order = 0usize;
    let mut steps = 0usize;

    // Indices of UNDEF-containing rows the cursors have passed. Only
    // populated in UNDEF-aware mode; their keys are strictly smaller than
    // everything still ahead of the cursors.
    let mut left_undefs: Vec<usize> = Vec::new();
    let mut right_undefs: Vec<usize> = Vec::new();

    while il < num_left && ir < num_right {
        steps += 1;
        if steps % CHECK_EVERY_STEPS == 0 {
            check()?;
        }

        match left.cmp_rows(il, right, ir) {
            Ordering::Less => {
                if undef_aware {
                    for &u in &right_undefs {
                        if rows_compatible(left, il, right, u) {
                            add_row(il, u)?;
                            out_of_order += 1;
                        }
                    }
                    if left.row_contains_undefined(il) {
                        left_undefs.push(il);
                    }
                }
                il += 1;
            }
            Ordering::Greater => {
                if undef_aware {
                    for &u in &left_undefs {
                        if rows_compatible(left, u, right, ir) {
                            add_row(u, ir)?;
                            out_of_order += 1;
                        }
                    }
                    if right.row_contains_undefined(ir) {
                        right_undefs.push(ir);
                    }
                }
                ir += 1;
            }
            Ordering::Equal => {
                let end_left = equal_run_end(left, il);
                let end_right = equal_run_end(right, ir);

                if undef_aware {
                    // Matches against the smaller UNDEF prefix of the other
                    // side. The runs' keys are strictly larger than every
                    // recorded UNDEF row, so nothing is emitted twice.
                    for l in il..end_left {
                        for &u in &right_undefs {
                            if rows_compatible(left, l, right, u) {
                                add_row(l, u)?;
                                out_of_order += 1;
                            }
                        }
                    }
                    for r in ir..end_right {
                        for &u in &left_undefs {
                            if rows_compatible(left, u, right, r) {
                                add_row(u, r)?;
                                out_of_order += 1;
                            }
                        }
                    }
                }

                // Cartesian product of the two equal runs.
                for l in il..end_left {
                    for r in ir..end_right {
                        add_row(l, r)?;
                    }
                }

                if undef_aware {
                    if left.row_contains_undefined(il) {
                        left_undefs.extend(il..end_left);
                    }
                    if right.row_contains_undefined(ir) {
                        right_undefs.extend(ir..end_right);
                    }
                }

                il = end_left;
                ir = end_right;
            }
        }
    }

    // The exhausted side may still hold UNDEF rows compatible with the
    // remainder of the other side.
    if undef_aware {
        while il < num_left {
            steps += 1;
            if steps % CHECK_EVERY_STEPS == 0 {
                check()?;
            }
            for &u in &right_undefs {
                if rows_compatible(left, il, right, u) {
                    add_row(il, u)?;
                    out_of_order += 1;
                }
            }
            il += 1;
        }
        while ir < num_right {
            steps += 1;
            if steps % CHECK_EVERY_STEPS == 0 {
                check()?;
            }
            for &u in &left_undefs {
                if rows_compatible(left, u, right, ir) {
                    add_row(u, ir)?;
                    out_of_order += 1;
                }
            }
            ir += 1;
        }
    }

    check()?;
    Ok(out_of_order)
}

/// End of the maximal run of rows equal to row `start`
fn equal_run_end(view: &IdTableView<'_>, start: usize) -> usize {
    let mut end = start + 1;
    while end < view.num_rows() && view.cmp_rows_within(end, start) == Ordering::Equal {
        end += 1;
    }
    end
}

/// Whether two keys match under "UNDEF matches anything" semantics:
/// equal on every position where both sides are defined
fn rows_compatible(left: &IdTableView<'_>, l: usize, right: &IdTableView<'_>, r: usize) -> bool {
    for j in 0..left.num_columns() {
        let lv = left.get(l, j);
        let rv = right.get(r, j);
        if lv.is_undefined() || rv.is_undefined() {
            continue;
        }
        if lv != rv {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Error, Id, IdTable};
    use crate::memory::TrackedAllocator;

    fn table(rows: &[Vec<i64>]) -> IdTable {
        let rows: Vec<Vec<Id>> = rows
            .iter()
            .map(|row| row.iter().map(|&v| Id::int(v)).collect())
            .collect();
        IdTable::from_rows(
            rows.first().map_or(1, |r| r.len()),
            &rows,
            TrackedAllocator::unlimited(),
        )
        .unwrap()
    }

    // -1 stands for UNDEF in the shorthand below.
    fn table_u(rows: &[Vec<i64>]) -> IdTable {
        let rows: Vec<Vec<Id>> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|&v| if v < 0 { Id::UNDEFINED } else { Id::int(v) })
                    .collect()
            })
            .collect();
        IdTable::from_rows(
            rows.first().map_or(1, |r| r.len()),
            &rows,
            TrackedAllocator::unlimited(),
        )
        .unwrap()
    }

    fn run(left: &IdTable, right: &IdTable, undef_aware: bool) -> (Vec<(usize, usize)>, usize) {
        let mut pairs = Vec::new();
        let out_of_order = zipper_join(
            &left.full_view(),
            &right.full_view(),
            undef_aware,
            &mut |l, r| {
                pairs.push((l, r));
                Ok(())
            },
            &|| Ok(()),
        )
        .unwrap();
        (pairs, out_of_order)
    }

    #[test]
    fn test_cheap_two_column_join() {
        let left = table(&[vec![1, 1], vec![1, 2], vec![2, 2]]);
        let right = table(&[vec![1, 1], vec![2, 2], vec![3, 3]]);

        let (pairs, out_of_order) = run(&left, &right, false);
        assert_eq!(pairs, vec![(0, 0), (2, 1)]);
        assert_eq!(out_of_order, 0);
    }

    #[test]
    fn test_cheap_duplicates_emit_cartesian_product() {
        let left = table(&[vec![1], vec![1], vec![2]]);
        let right = table(&[vec![1], vec![1], vec![2]]);

        let (pairs, out_of_order) = run(&left, &right, false);
        // 2 x 2 for key 1, 1 x 1 for key 2.
        assert_eq!(pairs.len(), 5);
        assert_eq!(out_of_order, 0);
    }

    #[test]
    fn test_cheap_empty_side() {
        let left = IdTable::new(1, TrackedAllocator::unlimited());
        let right = table(&[vec![1]]);
        let (pairs, out_of_order) = run(&left, &right, false);
        assert!(pairs.is_empty());
        assert_eq!(out_of_order, 0);
    }

    #[test]
    fn test_undef_on_left_matches_everything_compatible() {
        // Left = {(U,1), (1,1)}, Right = {(1,1), (2,1)}.
        let left = table_u(&[vec![-1, 1], vec![1, 1]]);
        let right = table_u(&[vec![1, 1], vec![2, 1]]);

        let (pairs, out_of_order) = run(&left, &right, true);
        // (U,1) matches both right rows, (1,1) matches (1,1).
        let mut sorted = pairs.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![(0, 0), (0, 1), (1, 0)]);
        assert!(out_of_order > 0);
    }

    #[test]
    fn test_undef_on_both_sides() {
        // (U,1) on the left and (2,U) on the right are compatible: they
        // agree wherever both are defined.
        let left = table_u(&[vec![-1, 1]]);
        let right = table_u(&[vec![2, -1]]);

        let (pairs, out_of_order) = run(&left, &right, true);
        assert_eq!(pairs, vec![(0, 0)]);
        assert!(out_of_order > 0);
    }

    #[test]
    fn test_undef_exact_equal_rows_not_duplicated() {
        // Identical UNDEF-containing keys meet in the equal run only.
        let left = table_u(&[vec![-1, 1]]);
        let right = table_u(&[vec![-1, 1]]);

        let (pairs, _) = run(&left, &right, true);
        assert_eq!(pairs, vec![(0, 0)]);
    }

    #[test]
    fn test_undef_incompatible_rows_do_not_match() {
        // (U,1) requires the second position to be 1.
        let left = table_u(&[vec![-1, 1]]);
        let right = table_u(&[vec![2, 2]]);

        let (pairs, _) = run(&left, &right, true);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_undef_mode_on_defined_input_matches_cheap_mode() {
        let left = table(&[vec![1, 1], vec![1, 2], vec![2, 2]]);
        let right = table(&[vec![1, 1], vec![2, 2], vec![3, 3]]);

        let (cheap_pairs, _) = run(&left, &right, false);
        let (undef_pairs, out_of_order) = run(&left, &right, true);
        assert_eq!(cheap_pairs, undef_pairs);
        assert_eq!(out_of_order, 0);
    }

    #[test]
    fn test_cancellation_propagates() {
        let left = table(&[vec![1]]);
        let right = table(&[vec![2]]);

        let result = zipper_join(
            &left.full_view(),
            &right.full_view(),
            false,
            &mut |_, _| Ok(()),
            &|| Err(Error::Cancelled),
        );
        assert_eq!(result.unwrap_err(), Error::Cancelled);
    }
}
