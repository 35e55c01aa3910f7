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

//! Permutation metadata for multi-column joins
//!
//! Given the paired join-column indices and the widths of both inputs, a
//! [`JoinColumnMapping`] precomputes every column permutation the join
//! needs:
//!
//! - the left/right projections exposing only the join columns, in
//!   declared pair order;
//! - the left/right permutations placing join columns first and non-join
//!   columns after, preserving the original relative order of the latter;
//! - the inverse permutation that turns the combined output (join columns,
//!   left rest, right rest) back into the user-visible layout: the left
//!   child's columns at their original positions, then the right child's
//!   non-join columns in their original relative order.

use crate::core::{Error, Result};

/// Column permutations derived from the join-column pairs
#[derive(Debug, Clone)]
pub struct JoinColumnMapping {
    jcs_left: Vec<usize>,
    jcs_right: Vec<usize>,
    permutation_left: Vec<usize>,
    permutation_right: Vec<usize>,
    permutation_result: Vec<usize>,
}

impl JoinColumnMapping {
    /// Build the mapping for `join_pairs` of `(left_col, right_col)`
    pub fn new(join_pairs: &[(usize, usize)], left_width: usize, right_width: usize) -> Result<Self> {
        if join_pairs.is_empty() {
            return Err(Error::invalid_argument(
                "join requires at least one join-column pair",
            ));
        }

        let jcs_left: Vec<usize> = join_pairs.iter().map(|&(l, _)| l).collect();
        let jcs_right: Vec<usize> = join_pairs.iter().map(|&(_, r)| r).collect();
        validate_side(&jcs_left, left_width, "left")?;
        validate_side(&jcs_right, right_width, "right")?;

        let permutation_left = join_first_permutation(&jcs_left, left_width);
        let permutation_right = join_first_permutation(&jcs_right, right_width);
        let permutation_result =
            result_permutation(&jcs_left, &jcs_right, left_width, right_width);

        Ok(Self {
            jcs_left,
            jcs_right,
            permutation_left,
            permutation_right,
            permutation_result,
        })
    }

    /// Number of join-column pairs
    pub fn num_join_columns(&self) -> usize {
        self.jcs_left.len()
    }

    /// Left join columns in declared pair order (the left projection)
    pub fn jcs_left(&self) -> &[usize] {
        &self.jcs_left
    }

    /// Right join columns in declared pair order (the right projection)
    pub fn jcs_right(&self) -> &[usize] {
        &self.jcs_right
    }

    /// Left permutation: join columns first, non-join columns after
    pub fn permutation_left(&self) -> &[usize] {
        &self.permutation_left
    }

    /// Right permutation: join columns first, non-join columns after
    pub fn permutation_right(&self) -> &[usize] {
        &self.permutation_right
    }

    /// Permutation turning the combined output into the user-visible layout
    pub fn permutation_result(&self) -> &[usize] {
        &self.permutation_result
    }
}

fn validate_side(cols: &[usize], width: usize, side: &str) -> Result<()> {
    let mut seen = vec![false; width];
    for &c in cols {
        if c >= width {
            return Err(Error::invalid_argument(format!(
                "{side} join column {c} out of range for width {width}"
            )));
        }
        if seen[c] {
            return Err(Error::invalid_argument(format!(
                "{side} join column {c} paired twice"
            )));
        }
        seen[c] = true;
    }
    Ok(())
}

/// Permutation placing `jcs` first, then the remaining columns of a
/// `width`-wide table in their original relative order
fn join_first_permutation(jcs: &[usize], width: usize) -> Vec<usize> {
    let mut permutation = jcs.to_vec();
    permutation.extend((0..width).filter(|c| !jcs.contains(c)));
    permutation
}

/// For every user-visible output column, the index of the column holding
/// its values in the combined (join-first) layout
fn result_permutation(
    jcs_left: &[usize],
    jcs_right: &[usize],
    left_width: usize,
    right_width: usize,
) -> Vec<usize> {
    let k = jcs_left.len();
    let mut permutation = Vec::with_capacity(left_width + right_width - k);

    // Left columns keep their original positions.
    let mut non_join_rank = 0;
    for col in 0..left_width {
        if let Some(pair) = jcs_left.iter().position(|&jc| jc == col) {
            permutation.push(pair);
        } else {
            permutation.push(k + non_join_rank);
            non_join_rank += 1;
        }
    }

    // Right non-join columns follow, in their original relative order.
    let right_rest_base = left_width;
    let mut rank = 0;
    for col in 0..right_width {
        if jcs_right.contains(&col) {
            continue;
        }
        permutation.push(right_rest_base + rank);
        rank += 1;
    }

    permutation
}
