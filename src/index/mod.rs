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

//! External index interface
//!
//! The on-disk index formats and dictionary encoding live outside this
//! engine; the executor only consumes the [`Index`] trait: per-column
//! multiplicities and a size estimate for planning, and a sorted table for
//! a requested permutation. [`InMemoryIndex`] is the reference
//! implementation used by embedders and tests.

use rustc_hash::FxHashSet;

use crate::core::{Error, Id, IdTable, Result};
use crate::memory::TrackedAllocator;

/// Interface the executor consumes from the index layer
pub trait Index: Send + Sync {
    /// Stable name identifying this index (part of scan fingerprints)
    fn name(&self) -> &str;

    /// Number of columns per stored tuple
    fn num_columns(&self) -> usize;

    /// Number of stored tuples
    fn size_estimate(&self) -> u64;

    /// Average number of tuples per distinct value in `col`
    fn multiplicity(&self, col: usize) -> f64;

    /// Materialize all tuples sorted lexicographically by `sort_cols`.
    /// The table is allocated through `allocator`.
    fn sorted_table(&self, sort_cols: &[usize], allocator: &TrackedAllocator) -> Result<IdTable>;
}

/// Average rows per distinct value, per column; 1.0 for empty data
pub(crate) fn column_multiplicities(rows: &[Vec<Id>], width: usize) -> Vec<f64> {
    (0..width)
        .map(|col| {
            let distinct: FxHashSet<u64> = rows.iter().map(|row| row[col].to_bits()).collect();
            if distinct.is_empty() {
                1.0
            } else {
                rows.len() as f64 / distinct.len() as f64
            }
        })
        .collect()
}

/// Simple fully materialized index for embedding and tests
pub struct InMemoryIndex {
    name: String,
    num_columns: usize,
    rows: Vec<Vec<Id>>,
    multiplicities: Vec<f64>,
}

impl InMemoryIndex {
    /// Create an index over row-major tuples
    pub fn new(name: impl Into<String>, num_columns: usize, rows: Vec<Vec<Id>>) -> Result<Self> {
        for row in &rows {
            if row.len() != num_columns {
                return Err(Error::invalid_argument(format!(
                    "tuple width {} does not match index width {num_columns}",
                    row.len()
                )));
            }
        }
        let multiplicities = column_multiplicities(&rows, num_columns);
        Ok(Self {
            name: name.into(),
            num_columns,
            rows,
            multiplicities,
        })
    }
}

impl Index for InMemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_columns(&self) -> usize {
        self.num_columns
    }

    fn size_estimate(&self) -> u64 {
        self.rows.len() as u64
    }

    fn multiplicity(&self, col: usize) -> f64 {
        self.multiplicities[col]
    }

    fn sorted_table(&self, sort_cols: &[usize], allocator: &TrackedAllocator) -> Result<IdTable> {
        for &c in sort_cols {
            if c >= self.num_columns {
                return Err(Error::invalid_argument(format!(
                    "sort column {c} out of range for index width {}",
                    self.num_columns
                )));
            }
        }

        // Sort by the requested columns, then by the rest for determinism.
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        let tail: Vec<usize> = (0..self.num_columns)
            .filter(|c| !sort_cols.contains(c))
            .collect();
        order.sort_unstable_by(|&a, &b| {
            for &c in sort_cols.iter().chain(tail.iter()) {
                match self.rows[a][c].cmp(&self.rows[b][c]) {
                    std::cmp::Ordering::Equal => continue,
                    other => return other,
                }
            }
            std::cmp::Ordering::Equal
        });

        let mut table = IdTable::new(self.num_columns, allocator.clone());
        for &r in &order {
            table.push_row(&self.rows[r])?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Id> {
        values.iter().map(|&v| Id::int(v)).collect()
    }

    #[test]
    fn test_multiplicity() {
        let index = InMemoryIndex::new(
            "spo",
            2,
            vec![ints(&[1, 1]), ints(&[1, 2]), ints(&[2, 3])],
        )
        .unwrap();
        assert_eq!(index.size_estimate(), 3);
        assert!((index.multiplicity(0) - 1.5).abs() < 1e-9);
        assert!((index.multiplicity(1) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sorted_table() {
        let index = InMemoryIndex::new(
            "spo",
            2,
            vec![ints(&[2, 1]), ints(&[1, 2]), ints(&[1, 1])],
        )
        .unwrap();

        let table = index
            .sorted_table(&[1], &TrackedAllocator::unlimited())
            .unwrap();
        assert!(table.is_sorted_by(&[1]));
        assert_eq!(table.num_rows(), 3);
    }

    #[test]
    fn test_sorted_table_rejects_bad_column() {
        let index = InMemoryIndex::new("spo", 2, vec![]).unwrap();
        assert!(matches!(
            index.sorted_table(&[4], &TrackedAllocator::unlimited()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rejects_mismatched_tuple_width() {
        assert!(matches!(
            InMemoryIndex::new("spo", 3, vec![ints(&[1, 2])]),
            Err(Error::InvalidArgument(_))
        ));
    }
}
