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

//! Multi-column equi-join operator
//!
//! Joins two children on every variable they share. Construction
//! normalizes child order by fingerprint, so `Join(A, B)` and `Join(B, A)`
//! hash equal and deduplicate into one cached computation. Both children
//! must already be sorted on their join-column sequences; the planner
//! inserts a sort upstream otherwise.
//!
//! Computation projects both sides to their join columns, permutes them
//! join-columns-first, runs the zipper join (cheap mode when no UNDEF is
//! present), re-sorts only if the UNDEF path emitted out-of-order rows,
//! and finally permutes the combined table into the user-visible layout:
//! the left child's columns in their original order, then the right
//! child's non-join columns.

use std::fmt::Write as _;
use std::sync::OnceLock;

use crate::core::{Error, IdTable, LocalVocab, Result};
use crate::executor::context::ExecutionContext;
use crate::executor::join::column_mapping::JoinColumnMapping;
use crate::executor::join::combiner::RowCombiner;
use crate::executor::join::zipper::zipper_join;
use crate::executor::operator::{
    get_result, propagate_child_error, Operator, ResultTable, VariableColumns,
};

/// Size, cost and per-column multiplicity estimates, computed once
#[derive(Debug, Clone)]
struct Estimates {
    size: u64,
    cost: u64,
    multiplicities: Vec<f64>,
}

/// Sort-merge equi-join on all shared variables of its two children
pub struct MultiColumnJoin {
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    /// Paired join columns `(left_col, right_col)`, one per shared variable
    join_columns: Vec<(usize, usize)>,
    variable_columns: VariableColumns,
    estimates: OnceLock<Estimates>,
}

impl MultiColumnJoin {
    /// Create a join of `left` and `right` on their shared variables.
    ///
    /// Children are swapped into canonical fingerprint order, so the
    /// argument order never affects the cache key or the result.
    pub fn new(left: Box<dyn Operator>, right: Box<dyn Operator>) -> Result<Self> {
        let (left, right) = if left.cache_key() > right.cache_key() {
            (right, left)
        } else {
            (left, right)
        };

        let mut join_columns = Vec::new();
        for (variable, left_info) in left.variable_columns().iter() {
            if let Some(right_info) = right.variable_columns().get(variable) {
                join_columns.push((left_info.index, right_info.index));
            }
        }
        if join_columns.is_empty() {
            return Err(Error::invalid_argument(
                "multi-column join requires at least one shared variable",
            ));
        }

        let jcs_left: Vec<usize> = join_columns.iter().map(|&(l, _)| l).collect();
        let jcs_right: Vec<usize> = join_columns.iter().map(|&(_, r)| r).collect();
        if !left.sorted_on().starts_with(&jcs_left) {
            return Err(Error::invalid_argument(
                "left child is not sorted on its join columns",
            ));
        }
        if !right.sorted_on().starts_with(&jcs_right) {
            return Err(Error::invalid_argument(
                "right child is not sorted on its join columns",
            ));
        }

        // Output layout: left columns in original order, right non-join
        // columns after. For shared variables the flags are intersected: a
        // value survives the join only if both sides produced it.
        let mut variable_columns = VariableColumns::new();
        for (variable, left_info) in left.variable_columns().iter() {
            match right.variable_columns().get(variable) {
                Some(right_info) => variable_columns.push(
                    variable.clone(),
                    left_info.possibly_undefined && right_info.possibly_undefined,
                    left_info.from_graph && right_info.from_graph,
                )?,
                None => variable_columns.push(
                    variable.clone(),
                    left_info.possibly_undefined,
                    left_info.from_graph,
                )?,
            };
        }
        for (variable, right_info) in right.variable_columns().iter() {
            if !left.variable_columns().contains(variable) {
                variable_columns.push(
                    variable.clone(),
                    right_info.possibly_undefined,
                    right_info.from_graph,
                )?;
            }
        }

        Ok(Self {
            left,
            right,
            join_columns,
            variable_columns,
            estimates: OnceLock::new(),
        })
    }

    fn estimates(&self) -> &Estimates {
        self.estimates.get_or_init(|| {
            let k = self.join_columns.len();
            let left_size = self.left.size_estimate() as f64;
            let right_size = self.right.size_estimate() as f64;

            // The number of distinct entries in the result is at most the
            // minimum over all join columns on both sides; the result
            // multiplicity is approximated by the product of the two sides'
            // smallest per-column multiplicities.
            let mut distinct_left = f64::INFINITY;
            let mut distinct_right = f64::INFINITY;
            let mut mult_left = f64::INFINITY;
            let mut mult_right = f64::INFINITY;
            for &(l, r) in &self.join_columns {
                let lm = self.left.multiplicity(l);
                let rm = self.right.multiplicity(r);
                distinct_left = distinct_left.min((left_size / lm).max(1.0));
                distinct_right = distinct_right.min((right_size / rm).max(1.0));
                mult_left = mult_left.min(lm);
                mult_right = mult_right.min(rm);
            }
            let distinct_result = distinct_left.min(distinct_right);
            let mult_result = mult_left * mult_right;

            // Never estimate 0: parents short-circuit on "known empty".
            let size = (mult_result * distinct_result) as u64 + 1;

            let mut multiplicities = Vec::with_capacity(self.width());
            for col in 0..self.left.width() {
                multiplicities.push(self.left.multiplicity(col) * (mult_result / mult_left));
            }
            for col in 0..self.right.width() {
                if self.join_columns.iter().any(|&(_, r)| r == col) {
                    continue;
                }
                multiplicities.push(self.right.multiplicity(col) * (mult_result / mult_right));
            }

            // This join is slower than a single-column join: twice the base
            // cost, plus 7% per additional join column.
            let base = (size as f64 + left_size + right_size)
                * 2.0
                * (1.0 + 0.07 * (k - 1) as f64);
            let cost = base as u64 + self.left.cost_estimate() + self.right.cost_estimate();

            Estimates {
                size,
                cost,
                multiplicities,
            }
        })
    }
}

impl Clone for MultiColumnJoin {
    fn clone(&self) -> Self {
        Self {
            left: self.left.clone_boxed(),
            right: self.right.clone_boxed(),
            join_columns: self.join_columns.clone(),
            variable_columns: self.variable_columns.clone(),
            estimates: OnceLock::new(),
        }
    }
}

impl Operator for MultiColumnJoin {
    fn width(&self) -> usize {
        self.left.width() + self.right.width() - self.join_columns.len()
    }

    fn sorted_on(&self) -> Vec<usize> {
        // The result is sorted on the left join columns in declared order.
        self.join_columns.iter().map(|&(l, _)| l).collect()
    }

    fn variable_columns(&self) -> &VariableColumns {
        &self.variable_columns
    }

    fn cache_key(&self) -> String {
        let mut key = String::from("MULTI_COLUMN_JOIN\n");
        let _ = write!(key, "{} join-columns: [", self.left.cache_key());
        for (i, &(l, _)) in self.join_columns.iter().enumerate() {
            let _ = write!(key, "{l}{}", if i + 1 < self.join_columns.len() { " & " } else { "" });
        }
        key.push_str("]\n|X|\n");
        let _ = write!(key, "{} join-columns: [", self.right.cache_key());
        for (i, &(_, r)) in self.join_columns.iter().enumerate() {
            let _ = write!(key, "{r}{}", if i + 1 < self.join_columns.len() { " & " } else { "" });
        }
        key.push(']');
        key
    }

    fn descriptor(&self) -> String {
        let mut join_vars = String::new();
        for &(l, _) in &self.join_columns {
            if let Some(variable) = self.left.variable_columns().variable_by_index(l) {
                let _ = write!(join_vars, "{variable} ");
            }
        }
        format!("MultiColumnJoin on {}", join_vars.trim_end())
    }

    fn size_estimate(&self) -> u64 {
        self.estimates().size
    }

    fn cost_estimate(&self) -> u64 {
        self.estimates().cost
    }

    fn multiplicity(&self, col: usize) -> f64 {
        self.estimates().multiplicities[col]
    }

    fn children(&self) -> Vec<&dyn Operator> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }

    fn clone_boxed(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }

    fn compute(&self, ctx: &ExecutionContext) -> Result<ResultTable> {
        let handle = ctx.cancellation();
        handle.check()?;

        let left_result = get_result(self.left.as_ref(), ctx)
            .map_err(|e| propagate_child_error(&self.left.descriptor(), e))?;
        let right_result = get_result(self.right.as_ref(), ctx)
            .map_err(|e| propagate_child_error(&self.right.descriptor(), e))?;
        handle.check()?;

        let left_table = left_result.table();
        let right_table = right_result.table();
        tracing::debug!(
            left_rows = left_table.num_rows(),
            right_rows = right_table.num_rows(),
            join_columns = self.join_columns.len(),
            "computing multi-column join"
        );

        let vocab = LocalVocab::merge(left_result.vocab(), right_result.vocab())?;
        let sorted_on = self.sorted_on();

        if left_table.is_empty() || right_table.is_empty() {
            let table = IdTable::new(self.width(), ctx.allocator().clone());
            return Ok(ResultTable::new(table, sorted_on, vocab));
        }

        let k = self.join_columns.len();
        let mapping = JoinColumnMapping::new(
            &self.join_columns,
            left_table.num_columns(),
            right_table.num_columns(),
        )?;

        let left_join_cols = left_table.as_column_subset(mapping.jcs_left())?;
        let right_join_cols = right_table.as_column_subset(mapping.jcs_right())?;
        let left_permuted = left_table.as_column_subset(mapping.permutation_left())?;
        let right_permuted = right_table.as_column_subset(mapping.permutation_right())?;

        // Cheap iff there is no UNDEF anywhere in the join columns.
        let cheap = !left_join_cols.contains_undefined() && !right_join_cols.contains_undefined();

        let output = IdTable::new(self.width(), ctx.allocator().clone());
        let mut combiner =
            RowCombiner::new(k, left_permuted, right_permuted, output, handle.clone())?;

        let num_out_of_order = {
            let mut add_row = |l: usize, r: usize| combiner.add_row(l, r);
            zipper_join(
                &left_join_cols,
                &right_join_cols,
                !cheap,
                &mut add_row,
                &|| handle.check(),
            )?
        };

        let mut table = combiner.finish();

        // The UNDEF path may emit rows outside the sorted stream; this
        // operator promises sortedness, so restore it.
        if num_out_of_order > 0 {
            handle.check()?;
            table.sort_by_prefix(k)?;
        }

        table.set_column_subset(mapping.permutation_result())?;
        handle.check()?;

        Ok(ResultTable::new(table, sorted_on, vocab))
    }
}
