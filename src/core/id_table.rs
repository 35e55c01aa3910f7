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

//! Columnar id tables and zero-copy column-subset views
//!
//! An [`IdTable`] is a column-major, dense 2D container of [`Id`]s. The
//! number of columns is fixed at construction; rows grow by append. All
//! column storage is reserved through the table's bound
//! [`TrackedAllocator`], so table growth is what enforces the memory budget
//! during query execution.
//!
//! An [`IdTableView`] reorders or drops columns without copying data. Views
//! borrow the table and are the working representation inside the join
//! layer: join-column projections and join-columns-first permutations are
//! all views over the same storage.
//!
//! Tables are move-only: an operator fills one monotonically, hands it off
//! by value into a result, and from then on it is immutable.

use std::cmp::Ordering;
use std::mem;

use rayon::slice::ParallelSliceMut;

use crate::core::{Error, Id, Result};
use crate::memory::TrackedAllocator;

/// Minimum number of rows before sorts go through rayon.
///
/// Below this, thread coordination costs more than the sort itself.
pub const PARALLEL_SORT_THRESHOLD: usize = 50_000;

/// Initial row capacity reserved on the first append
const INITIAL_ROW_CAPACITY: usize = 8;

/// Column-major table of 64-bit tagged identifiers
pub struct IdTable {
    columns: Vec<Vec<Id>>,
    num_rows: usize,
    /// Bytes currently reserved from the allocator for column storage
    reserved_bytes: usize,
    allocator: TrackedAllocator,
}

impl IdTable {
    /// Create an empty table with a fixed number of columns
    pub fn new(num_columns: usize, allocator: TrackedAllocator) -> Self {
        Self {
            columns: (0..num_columns).map(|_| Vec::new()).collect(),
            num_rows: 0,
            reserved_bytes: 0,
            allocator,
        }
    }

    /// Create a table from row-major data (test and ingest helper)
    pub fn from_rows(
        num_columns: usize,
        rows: &[Vec<Id>],
        allocator: TrackedAllocator,
    ) -> Result<Self> {
        let mut table = Self::new(num_columns, allocator);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Number of rows
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of columns
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Whether the table has no rows
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Borrow column `i` as a slice
    #[inline]
    pub fn column(&self, i: usize) -> &[Id] {
        &self.columns[i]
    }

    /// The cell at row `r`, column `c`
    #[inline]
    pub fn get(&self, r: usize, c: usize) -> Id {
        self.columns[c][r]
    }

    /// The allocator this table reserves from
    pub fn allocator(&self) -> &TrackedAllocator {
        &self.allocator
    }

    /// Approximate heap bytes held by this table (for cache accounting)
    pub fn heap_bytes(&self) -> usize {
        self.num_rows * self.columns.len() * mem::size_of::<Id>()
    }

    /// Append one row; `row.len()` must equal the column count
    pub fn push_row(&mut self, row: &[Id]) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::invalid_argument(format!(
                "row width {} does not match table width {}",
                row.len(),
                self.columns.len()
            )));
        }
        self.ensure_row_capacity(1)?;
        for (column, &id) in self.columns.iter_mut().zip(row) {
            column.push(id);
        }
        self.num_rows += 1;
        Ok(())
    }

    /// Reserve storage for `additional` more rows, growing geometrically.
    /// The new capacity is charged to the allocator before any resize.
    fn ensure_row_capacity(&mut self, additional: usize) -> Result<()> {
        if self.columns.is_empty() {
            return Ok(());
        }
        let capacity = self.columns[0].capacity();
        let needed = self.num_rows + additional;
        if needed <= capacity {
            return Ok(());
        }

        let new_capacity = (capacity * 2).max(needed).max(INITIAL_ROW_CAPACITY);
        let grow_bytes = (new_capacity - capacity) * self.columns.len() * mem::size_of::<Id>();
        self.allocator.allocate(grow_bytes)?;
        self.reserved_bytes += grow_bytes;

        for column in &mut self.columns {
            column.reserve_exact(new_capacity - column.len());
        }
        Ok(())
    }

    /// Zero-copy view whose column `j` is this table's column `perm[j]`
    pub fn as_column_subset(&self, perm: &[usize]) -> Result<IdTableView<'_>> {
        for &i in perm {
            if i >= self.columns.len() {
                return Err(Error::invalid_argument(format!(
                    "column index {} out of range for width {}",
                    i,
                    self.columns.len()
                )));
            }
        }
        Ok(IdTableView {
            table: self,
            cols: perm.to_vec(),
        })
    }

    /// View over all columns in declared order
    pub fn full_view(&self) -> IdTableView<'_> {
        IdTableView {
            table: self,
            cols: (0..self.columns.len()).collect(),
        }
    }

    /// In-place column reorder (or drop) without touching row data.
    /// `perm` must not name any column twice.
    pub fn set_column_subset(&mut self, perm: &[usize]) -> Result<()> {
        let width = self.columns.len();
        let mut seen = vec![false; width];
        for &i in perm {
            if i >= width {
                return Err(Error::invalid_argument(format!(
                    "column index {i} out of range for width {width}"
                )));
            }
            if seen[i] {
                return Err(Error::invalid_argument(format!(
                    "duplicate column index {i} in column subset"
                )));
            }
            seen[i] = true;
        }

        let mut old: Vec<Option<Vec<Id>>> =
            mem::take(&mut self.columns).into_iter().map(Some).collect();
        self.columns = perm
            .iter()
            .map(|&i| old[i].take().expect("column taken twice"))
            .collect();
        Ok(())
    }

    /// Sort rows lexicographically by the first `k` columns.
    ///
    /// Goes parallel above [`PARALLEL_SORT_THRESHOLD`] rows. The transient
    /// index and scratch buffers are charged to the allocator for the
    /// duration of the sort.
    pub fn sort_by_prefix(&mut self, k: usize) -> Result<()> {
        if k > self.columns.len() {
            return Err(Error::invalid_argument(format!(
                "sort prefix {} exceeds table width {}",
                k,
                self.columns.len()
            )));
        }
        if self.num_rows <= 1 || k == 0 {
            return Ok(());
        }

        let scratch_bytes = 2 * self.num_rows * mem::size_of::<usize>();
        self.allocator.allocate(scratch_bytes)?;

        let mut order: Vec<usize> = (0..self.num_rows).collect();
        {
            let key_columns: Vec<&[Id]> =
                self.columns[..k].iter().map(|c| c.as_slice()).collect();
            let compare = |&a: &usize, &b: &usize| -> Ordering {
                for column in &key_columns {
                    match column[a].cmp(&column[b]) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                Ordering::Equal
            };
            if self.num_rows >= PARALLEL_SORT_THRESHOLD {
                order.par_sort_unstable_by(compare);
            } else {
                order.sort_unstable_by(compare);
            }
        }

        let mut scratch: Vec<Id> = Vec::with_capacity(self.num_rows);
        for column in &mut self.columns {
            scratch.clear();
            scratch.extend(order.iter().map(|&r| column[r]));
            column.as_mut_slice().copy_from_slice(&scratch);
        }

        drop(scratch);
        drop(order);
        self.allocator.release(scratch_bytes);
        Ok(())
    }

    /// Whether the rows are sorted by the given column sequence
    pub fn is_sorted_by(&self, cols: &[usize]) -> bool {
        for r in 1..self.num_rows {
            for &c in cols {
                match self.columns[c][r - 1].cmp(&self.columns[c][r]) {
                    Ordering::Less => break,
                    Ordering::Greater => return false,
                    Ordering::Equal => continue,
                }
            }
        }
        true
    }
}

impl Drop for IdTable {
    fn drop(&mut self) {
        self.allocator.release(self.reserved_bytes);
    }
}

impl std::fmt::Debug for IdTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdTable")
            .field("num_rows", &self.num_rows)
            .field("num_columns", &self.columns.len())
            .finish()
    }
}

/// Borrowing view over a column subset of an [`IdTable`]
///
/// Row `r`, column `j` of the view equals row `r`, column `perm[j]` of the
/// source table. Views never own data.
#[derive(Clone)]
pub struct IdTableView<'a> {
    table: &'a IdTable,
    cols: Vec<usize>,
}

impl<'a> IdTableView<'a> {
    /// Number of rows
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }

    /// Number of columns in the view
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.cols.len()
    }

    /// Whether the underlying table has no rows
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// The cell at row `r`, view column `j`
    #[inline]
    pub fn get(&self, r: usize, j: usize) -> Id {
        self.table.get(r, self.cols[j])
    }

    /// Borrow view column `j` as a slice of the source column
    #[inline]
    pub fn column(&self, j: usize) -> &'a [Id] {
        self.table.column(self.cols[j])
    }

    /// Lexicographic comparison of row `r` of this view with row `s` of
    /// `other`; both views must have the same width
    pub fn cmp_rows(&self, r: usize, other: &IdTableView<'_>, s: usize) -> Ordering {
        debug_assert_eq!(self.num_columns(), other.num_columns());
        for j in 0..self.cols.len() {
            match self.get(r, j).cmp(&other.get(s, j)) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Lexicographic comparison of two rows of this view
    pub fn cmp_rows_within(&self, r: usize, s: usize) -> Ordering {
        for j in 0..self.cols.len() {
            match self.get(r, j).cmp(&self.get(s, j)) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Whether any cell of row `r` is UNDEF
    pub fn row_contains_undefined(&self, r: usize) -> bool {
        (0..self.cols.len()).any(|j| self.get(r, j).is_undefined())
    }

    /// Whether any cell of any row is UNDEF
    pub fn contains_undefined(&self) -> bool {
        self.cols
            .iter()
            .any(|&c| self.table.column(c).iter().any(|id| id.is_undefined()))
    }
}

impl std::fmt::Debug for IdTableView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdTableView")
            .field("num_rows", &self.num_rows())
            .field("cols", &self.cols)
            .finish()
    }
}
