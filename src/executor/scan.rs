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

//! Leaf operators
//!
//! The planner terminates every operator tree in a leaf: an [`IndexScan`]
//! over the external [`Index`](crate::index::Index) interface, or a
//! [`PresortedTableScan`] over already materialized rows (VALUES blocks,
//! intermediate results, tests).

use std::sync::Arc;

use crate::core::{Error, Id, IdTable, LocalVocab, Result};
use crate::executor::context::ExecutionContext;
use crate::executor::operator::{Operator, ResultTable, Variable, VariableColumns};
use crate::index::{column_multiplicities, Index};

/// Leaf operator over pre-sorted, materialized rows
///
/// The rows must be sorted lexicographically by all columns; the scan
/// promises exactly that sortedness. The name is part of the fingerprint
/// and must uniquely identify the data.
#[derive(Clone)]
pub struct PresortedTableScan {
    name: String,
    rows: Arc<Vec<Vec<Id>>>,
    variables: VariableColumns,
    sorted_on: Vec<usize>,
    multiplicities: Vec<f64>,
}

impl PresortedTableScan {
    /// Create a scan over `rows`, bound to `variables` column by column
    pub fn new(
        name: impl Into<String>,
        variables: &[Variable],
        rows: Vec<Vec<Id>>,
    ) -> Result<Self> {
        let width = variables.len();
        if width == 0 {
            return Err(Error::invalid_argument("scan requires at least one column"));
        }
        for row in &rows {
            if row.len() != width {
                return Err(Error::invalid_argument(format!(
                    "row width {} does not match scan width {width}",
                    row.len()
                )));
            }
        }
        for pair in rows.windows(2) {
            if pair[0] > pair[1] {
                return Err(Error::invalid_argument(
                    "scan rows must be sorted lexicographically",
                ));
            }
        }

        let mut variable_columns = VariableColumns::new();
        for (col, variable) in variables.iter().enumerate() {
            let possibly_undefined = rows.iter().any(|row| row[col].is_undefined());
            variable_columns.push(variable.clone(), possibly_undefined, true)?;
        }
        let multiplicities = column_multiplicities(&rows, width);

        Ok(Self {
            name: name.into(),
            rows: Arc::new(rows),
            variables: variable_columns,
            sorted_on: (0..width).collect(),
            multiplicities,
        })
    }
}

impl Operator for PresortedTableScan {
    fn width(&self) -> usize {
        self.variables.len()
    }

    fn sorted_on(&self) -> Vec<usize> {
        self.sorted_on.clone()
    }

    fn variable_columns(&self) -> &VariableColumns {
        &self.variables
    }

    fn cache_key(&self) -> String {
        let vars: Vec<&str> = self.variables.iter().map(|(v, _)| v.name()).collect();
        format!("PRESORTED_SCAN {} vars: [{}]", self.name, vars.join(" "))
    }

    fn descriptor(&self) -> String {
        format!("PresortedTableScan {}", self.name)
    }

    fn size_estimate(&self) -> u64 {
        self.rows.len() as u64
    }

    fn cost_estimate(&self) -> u64 {
        self.rows.len() as u64
    }

    fn multiplicity(&self, col: usize) -> f64 {
        self.multiplicities[col]
    }

    fn children(&self) -> Vec<&dyn Operator> {
        Vec::new()
    }

    fn clone_boxed(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }

    fn compute(&self, ctx: &ExecutionContext) -> Result<ResultTable> {
        ctx.check_cancelled()?;
        let table = IdTable::from_rows(self.width(), &self.rows, ctx.allocator().clone())?;
        ctx.check_cancelled()?;
        Ok(ResultTable::new(
            table,
            self.sorted_on.clone(),
            LocalVocab::new(),
        ))
    }
}

/// Leaf operator reading a sorted permutation from an index
#[derive(Clone)]
pub struct IndexScan {
    index: Arc<dyn Index>,
    variables: VariableColumns,
    sort_cols: Vec<usize>,
}

impl IndexScan {
    /// Create a scan over `index`, sorted by `sort_cols`
    pub fn new(
        index: Arc<dyn Index>,
        variables: &[Variable],
        sort_cols: Vec<usize>,
    ) -> Result<Self> {
        if variables.len() != index.num_columns() {
            return Err(Error::invalid_argument(format!(
                "{} variables bound to an index of width {}",
                variables.len(),
                index.num_columns()
            )));
        }
        if sort_cols.is_empty() {
            return Err(Error::invalid_argument(
                "index scan requires at least one sort column",
            ));
        }
        let mut seen = vec![false; index.num_columns()];
        for &c in &sort_cols {
            if c >= index.num_columns() {
                return Err(Error::invalid_argument(format!(
                    "sort column {c} out of range for index width {}",
                    index.num_columns()
                )));
            }
            if seen[c] {
                return Err(Error::invalid_argument(format!(
                    "duplicate sort column {c}"
                )));
            }
            seen[c] = true;
        }

        let mut variable_columns = VariableColumns::new();
        for variable in variables {
            variable_columns.push(variable.clone(), false, true)?;
        }

        Ok(Self {
            index,
            variables: variable_columns,
            sort_cols,
        })
    }
}

impl Operator for IndexScan {
    fn width(&self) -> usize {
        self.variables.len()
    }

    fn sorted_on(&self) -> Vec<usize> {
        self.sort_cols.clone()
    }

    fn variable_columns(&self) -> &VariableColumns {
        &self.variables
    }

    fn cache_key(&self) -> String {
        let vars: Vec<&str> = self.variables.iter().map(|(v, _)| v.name()).collect();
        format!(
            "INDEX_SCAN {} sorted-on: {:?} vars: [{}]",
            self.index.name(),
            self.sort_cols,
            vars.join(" ")
        )
    }

    fn descriptor(&self) -> String {
        format!("IndexScan {}", self.index.name())
    }

    fn size_estimate(&self) -> u64 {
        self.index.size_estimate()
    }

    fn cost_estimate(&self) -> u64 {
        self.index.size_estimate()
    }

    fn multiplicity(&self, col: usize) -> f64 {
        self.index.multiplicity(col)
    }

    fn children(&self) -> Vec<&dyn Operator> {
        Vec::new()
    }

    fn clone_boxed(&self) -> Box<dyn Operator> {
        Box::new(self.clone())
    }

    fn compute(&self, ctx: &ExecutionContext) -> Result<ResultTable> {
        ctx.check_cancelled()?;
        let table = self.index.sorted_table(&self.sort_cols, ctx.allocator())?;
        ctx.check_cancelled()?;
        Ok(ResultTable::new(
            table,
            self.sort_cols.clone(),
            LocalVocab::new(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::operator::get_result;
    use crate::executor::result_cache::ResultCache;
    use crate::index::InMemoryIndex;
    use crate::memory::TrackedAllocator;

    fn ints(values: &[i64]) -> Vec<Id> {
        values.iter().map(|&v| Id::int(v)).collect()
    }

    fn test_ctx() -> ExecutionContext {
        ExecutionContext::new(
            TrackedAllocator::unlimited(),
            Arc::new(ResultCache::default()),
        )
    }

    #[test]
    fn test_presorted_scan_basics() {
        let scan = PresortedTableScan::new(
            "values1",
            &[Variable::new("s"), Variable::new("o")],
            vec![ints(&[1, 10]), ints(&[2, 20])],
        )
        .unwrap();

        assert_eq!(scan.width(), 2);
        assert_eq!(scan.sorted_on(), vec![0, 1]);
        assert_eq!(scan.size_estimate(), 2);
        assert!(scan.children().is_empty());

        let ctx = test_ctx();
        let result = get_result(&scan, &ctx).unwrap();
        assert_eq!(result.num_rows(), 2);
        assert_eq!(result.sorted_on(), &[0, 1]);
        assert_eq!(result.table().get(1, 1), Id::int(20));
    }

    #[test]
    fn test_presorted_scan_rejects_unsorted_rows() {
        let result = PresortedTableScan::new(
            "bad",
            &[Variable::new("s")],
            vec![ints(&[2]), ints(&[1])],
        );
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_presorted_scan_tracks_possibly_undefined() {
        let scan = PresortedTableScan::new(
            "undef",
            &[Variable::new("s"), Variable::new("o")],
            vec![vec![Id::UNDEFINED, Id::int(1)], ints(&[1, 2])],
        )
        .unwrap();
        assert!(
            scan.variable_columns()
                .get(&Variable::new("s"))
                .unwrap()
                .possibly_undefined
        );
        assert!(
            !scan
                .variable_columns()
                .get(&Variable::new("o"))
                .unwrap()
                .possibly_undefined
        );
    }

    #[test]
    fn test_index_scan() {
        let index = Arc::new(
            InMemoryIndex::new("spo", 2, vec![ints(&[2, 1]), ints(&[1, 2])]).unwrap(),
        );
        let scan = IndexScan::new(
            index,
            &[Variable::new("s"), Variable::new("o")],
            vec![0, 1],
        )
        .unwrap();

        assert_eq!(scan.size_estimate(), 2);

        let ctx = test_ctx();
        let result = get_result(&scan, &ctx).unwrap();
        assert!(result.table().is_sorted_by(&[0, 1]));
        assert_eq!(result.num_rows(), 2);
    }

    #[test]
    fn test_scan_fingerprints_differ_by_name() {
        let rows = vec![ints(&[1])];
        let a = PresortedTableScan::new("a", &[Variable::new("x")], rows.clone()).unwrap();
        let b = PresortedTableScan::new("b", &[Variable::new("x")], rows).unwrap();
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_clone_is_independent() {
        let scan = PresortedTableScan::new(
            "c",
            &[Variable::new("x")],
            vec![ints(&[1])],
        )
        .unwrap();
        let clone = scan.clone_boxed();
        assert_eq!(scan.cache_key(), clone.cache_key());
        assert_eq!(clone.width(), 1);
    }
}
