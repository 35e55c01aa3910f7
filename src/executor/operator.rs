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

//! The operator contract
//!
//! Operators form the nodes of the execution DAG. Each exposes metadata
//! (width, sortedness, variable-to-column map, size/cost estimates) that is
//! derived purely from the tree, plus [`Operator::compute`] which reads the
//! children's tables and materializes a [`ResultTable`].
//!
//! Two operators with the same [`Operator::cache_key`] must produce
//! identical results; the fingerprint is canonical, so commutative
//! operators normalize their child order at construction. Evaluation goes
//! through [`get_result`], which deduplicates identical sub-queries into a
//! single shared computation via the result cache.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::core::{Error, IdTable, LocalVocab, Result};
use crate::executor::context::ExecutionContext;

/// A query variable, e.g. `?person`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable(String);

impl Variable {
    /// Create a variable from its name (with or without the leading `?`)
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.starts_with('?') {
            Variable(name)
        } else {
            Variable(format!("?{name}"))
        }
    }

    /// The variable name including the leading `?`
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-column metadata in a variable-to-column map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column index in the operator's result
    pub index: usize,
    /// Whether the column may contain UNDEF values
    pub possibly_undefined: bool,
    /// Whether every value in the column originates from the graph
    /// (as opposed to being minted by an expression)
    pub from_graph: bool,
}

/// Insertion-ordered map from query variable to result column
///
/// Indices are assigned densely in insertion order, so the iteration order
/// is the column order of the result.
#[derive(Debug, Clone, Default)]
pub struct VariableColumns {
    by_variable: FxHashMap<Variable, ColumnInfo>,
    order: Vec<Variable>,
}

impl VariableColumns {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a variable; its column index is the current width
    pub fn push(
        &mut self,
        variable: Variable,
        possibly_undefined: bool,
        from_graph: bool,
    ) -> Result<usize> {
        if self.by_variable.contains_key(&variable) {
            return Err(Error::invalid_argument(format!(
                "duplicate variable {variable} in column map"
            )));
        }
        let index = self.order.len();
        self.by_variable.insert(
            variable.clone(),
            ColumnInfo {
                index,
                possibly_undefined,
                from_graph,
            },
        );
        self.order.push(variable);
        Ok(index)
    }

    /// Look up a variable's column metadata
    pub fn get(&self, variable: &Variable) -> Option<&ColumnInfo> {
        self.by_variable.get(variable)
    }

    /// Whether the map contains `variable`
    pub fn contains(&self, variable: &Variable) -> bool {
        self.by_variable.contains_key(variable)
    }

    /// The variable mapped to column `index`
    pub fn variable_by_index(&self, index: usize) -> Option<&Variable> {
        self.order.get(index)
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate variables and their metadata in column order
    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &ColumnInfo)> {
        self.order.iter().map(|v| (v, &self.by_variable[v]))
    }
}

/// Immutable output of an operator
///
/// A triple of the materialized table, the sortedness descriptor (column
/// indices the table is sorted by) and the local vocabulary. Sortedness is
/// a promise: consumers rely on it without re-checking.
#[derive(Debug)]
pub struct ResultTable {
    table: IdTable,
    sorted_on: Vec<usize>,
    vocab: LocalVocab,
}

impl ResultTable {
    /// Wrap a finished table. The table must actually be sorted by
    /// `sorted_on`; this is checked in debug builds only.
    pub fn new(table: IdTable, sorted_on: Vec<usize>, vocab: LocalVocab) -> Self {
        debug_assert!(
            table.is_sorted_by(&sorted_on),
            "result table violates its sortedness promise {sorted_on:?}"
        );
        Self {
            table,
            sorted_on,
            vocab,
        }
    }

    /// The materialized table
    pub fn table(&self) -> &IdTable {
        &self.table
    }

    /// Column indices the table is sorted by
    pub fn sorted_on(&self) -> &[usize] {
        &self.sorted_on
    }

    /// The local vocabulary of this result
    pub fn vocab(&self) -> &LocalVocab {
        &self.vocab
    }

    /// Number of rows in the table
    pub fn num_rows(&self) -> usize {
        self.table.num_rows()
    }

    /// Approximate heap bytes held (for cache accounting)
    pub fn heap_bytes(&self) -> usize {
        // Words in the local vocab are counted at a flat estimate; exact
        // string lengths are not worth a traversal here.
        self.table.heap_bytes() + self.vocab.len() * 48
    }
}

/// A node in the execution DAG
///
/// All metadata methods are deterministic and data-independent; only
/// [`Operator::compute`] touches actual tables. Any method that evaluates
/// children may fail with `Cancelled` or `TimedOut` at a poll checkpoint.
pub trait Operator: Send + Sync {
    /// Number of columns in the result
    fn width(&self) -> usize;

    /// Column indices forming the result's sort prefix; may be empty
    fn sorted_on(&self) -> Vec<usize>;

    /// Mapping from query variable to result column
    fn variable_columns(&self) -> &VariableColumns;

    /// Stable fingerprint of this operator's semantics.
    ///
    /// Two operators with equal cache keys must produce identical results.
    fn cache_key(&self) -> String;

    /// Short human-readable label for logs
    fn descriptor(&self) -> String;

    /// Estimated number of result rows; deterministic and data-independent
    fn size_estimate(&self) -> u64;

    /// Estimated total cost of computing this subtree
    fn cost_estimate(&self) -> u64;

    /// Estimated average number of rows per distinct value in `col`
    fn multiplicity(&self, col: usize) -> f64;

    /// Child operators, for traversal
    fn children(&self) -> Vec<&dyn Operator>;

    /// Deep structural copy sharing nothing mutable with the original
    fn clone_boxed(&self) -> Box<dyn Operator>;

    /// Materialize this operator's result.
    ///
    /// Called at most once per fingerprint at a time; go through
    /// [`get_result`] instead of calling this directly.
    fn compute(&self, ctx: &ExecutionContext) -> Result<ResultTable>;
}

impl Clone for Box<dyn Operator> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// Evaluate an operator through the result cache.
///
/// Returns the cached result when one exists, joins an in-flight build for
/// the same fingerprint when there is one, and computes otherwise. This is
/// the only entry point collaborators should use.
pub fn get_result(op: &dyn Operator, ctx: &ExecutionContext) -> Result<Arc<ResultTable>> {
    ctx.check_cancelled()?;
    let key = op.cache_key();
    ctx.result_cache().get_or_compute(&key, || {
        let descriptor = op.descriptor();
        tracing::debug!(operator = %descriptor, "computing result");
        let started = Instant::now();
        let result = op.compute(ctx)?;
        tracing::debug!(
            operator = %descriptor,
            rows = result.num_rows(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "result computed"
        );
        Ok(result)
    })
}

/// Wrap a child failure for propagation, leaving resource exhaustion
/// (cancellation, timeout, memory budget) untouched.
pub(crate) fn propagate_child_error(descriptor: &str, error: Error) -> Error {
    if error.is_resource_exhausted() {
        error
    } else {
        Error::child_failed(descriptor, error.to_string())
    }
}
