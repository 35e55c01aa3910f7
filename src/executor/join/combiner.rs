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

//! Row combiner for join output
//!
//! A [`RowCombiner`] turns `(left_index, right_index)` pairs into combined
//! output rows. Both input views must be in join-columns-first order. The
//! output row is the `k` join columns, then the remaining left columns,
//! then the remaining right columns.
//!
//! On the join columns, UNDEF acts as the join's unit: when one side is
//! UNDEF the other side's value is written, so the output never contains
//! an UNDEF that a defined input value could have filled.
//!
//! The combiner appends through the output table's allocator (the memory
//! budget applies to every row) and polls cancellation every
//! [`CANCELLATION_CHECK_INTERVAL_ROWS`] appended rows.

use smallvec::SmallVec;

use crate::core::{Error, Id, IdTable, IdTableView, Result};
use crate::executor::context::{CancellationHandle, CANCELLATION_CHECK_INTERVAL_ROWS};

/// Writes combined join output rows into an owned [`IdTable`]
pub struct RowCombiner<'a> {
    num_join_columns: usize,
    left: IdTableView<'a>,
    right: IdTableView<'a>,
    output: IdTable,
    cancellation: CancellationHandle,
    rows_since_check: usize,
    row_buffer: SmallVec<[Id; 16]>,
}

impl<'a> RowCombiner<'a> {
    /// Create a combiner over join-columns-first views.
    ///
    /// The output table is moved in and returned by [`RowCombiner::finish`];
    /// its width must be `left + right - k`.
    pub fn new(
        num_join_columns: usize,
        left: IdTableView<'a>,
        right: IdTableView<'a>,
        output: IdTable,
        cancellation: CancellationHandle,
    ) -> Result<Self> {
        if num_join_columns == 0
            || left.num_columns() < num_join_columns
            || right.num_columns() < num_join_columns
        {
            return Err(Error::invalid_argument(format!(
                "join column count {} incompatible with input widths {} and {}",
                num_join_columns,
                left.num_columns(),
                right.num_columns()
            )));
        }
        let expected_width = left.num_columns() + right.num_columns() - num_join_columns;
        if output.num_columns() != expected_width {
            return Err(Error::invalid_argument(format!(
                "output width {} does not match combined width {}",
                output.num_columns(),
                expected_width
            )));
        }
        Ok(Self {
            num_join_columns,
            left,
            right,
            output,
            cancellation,
            rows_since_check: 0,
            row_buffer: SmallVec::new(),
        })
    }

    /// Append the combined row for left row `l` and right row `r`
    pub fn add_row(&mut self, l: usize, r: usize) -> Result<()> {
        let k = self.num_join_columns;
        self.row_buffer.clear();

        for j in 0..k {
            let left_value = self.left.get(l, j);
            self.row_buffer.push(if left_value.is_undefined() {
                self.right.get(r, j)
            } else {
                left_value
            });
        }
        for j in k..self.left.num_columns() {
            self.row_buffer.push(self.left.get(l, j));
        }
        for j in k..self.right.num_columns() {
            self.row_buffer.push(self.right.get(r, j));
        }

        self.output.push_row(&self.row_buffer)?;

        self.rows_since_check += 1;
        if self.rows_since_check >= CANCELLATION_CHECK_INTERVAL_ROWS {
            self.rows_since_check = 0;
            self.cancellation.check()?;
        }
        Ok(())
    }

    /// Number of rows written so far
    pub fn num_rows_written(&self) -> usize {
        self.output.num_rows()
    }

    /// Hand the completed table back by move
    pub fn finish(self) -> IdTable {
        self.output
    }
}
