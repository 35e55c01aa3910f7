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

//! Physical operator execution
//!
//! This module provides the operator layer of the engine: the planner
//! builds a DAG of [`Operator`]s and evaluates the root through
//! [`get_result`], which routes every node through the shared
//! [`ResultCache`] so identical sub-queries deduplicate into one build.
//!
//! # Components
//!
//! - [`operator`] - the operator contract, results and variable maps
//! - [`join`] - the multi-column equi-join and its building blocks
//! - [`scan`] - leaf operators over indexes and materialized rows
//! - [`result_cache`] - fingerprint cache with at-most-once builds
//! - [`context`] - execution context, cancellation and deadlines
//! - [`parallel`] - query worker pool and the serialized update queue

pub mod context;
pub mod join;
pub mod operator;
pub mod parallel;
pub mod result_cache;
pub mod scan;

pub use context::{
    CancellationHandle, ExecutionContext, TimeoutGuard, CANCELLATION_CHECK_INTERVAL_ROWS,
    DEFAULT_WATCHDOG_INTERVAL,
};
pub use join::{JoinColumnMapping, MultiColumnJoin, RowCombiner};
pub use operator::{
    get_result, ColumnInfo, Operator, ResultTable, Variable, VariableColumns,
};
pub use parallel::{QueryPool, UpdateQueue};
pub use result_cache::{CacheStats, ResultCache, DEFAULT_RESULT_CACHE_BYTES};
pub use scan::{IndexScan, PresortedTableScan};
