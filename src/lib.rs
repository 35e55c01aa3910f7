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

//! # Quiver - Embedded knowledge-graph query engine core
//!
//! Quiver is the physical operator execution layer of a knowledge-graph
//! database whose data model is a set of RDF triples dictionary-encoded to
//! 64-bit identifiers. A planner compiles a graph-pattern query into a DAG
//! of relational operators over columnar id tables; Quiver evaluates it.
//!
//! ## Key Features
//!
//! - **Columnar id tables** - dense column-major storage with zero-copy
//!   column-subset views, allocated against a hard memory budget
//! - **UNDEF-aware merge joins** - sort-merge joins that treat the UNDEF
//!   marker as "matches anything" while keeping output sorted whenever
//!   the input allows it
//! - **Fingerprint result caching** - identical sub-queries deduplicate
//!   into one shared computation, at most one build per fingerprint at a
//!   time
//! - **Data-independent planning estimates** - cheap, stable size, cost
//!   and multiplicity estimates on every operator
//! - **Cooperative cancellation** - deadline, cancel and memory-limit
//!   enforcement polled inside the hot join loops
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use quiver::core::Id;
//! use quiver::executor::{
//!     get_result, ExecutionContext, MultiColumnJoin, PresortedTableScan, ResultCache, Variable,
//! };
//! use quiver::memory::TrackedAllocator;
//!
//! // ?person ?name and ?person ?city, joined on ?person.
//! let names = PresortedTableScan::new(
//!     "names",
//!     &[Variable::new("person"), Variable::new("name")],
//!     vec![
//!         vec![Id::vocab_index(1), Id::vocab_index(10)],
//!         vec![Id::vocab_index(2), Id::vocab_index(11)],
//!     ],
//! )
//! .unwrap();
//! let cities = PresortedTableScan::new(
//!     "cities",
//!     &[Variable::new("person"), Variable::new("city")],
//!     vec![
//!         vec![Id::vocab_index(1), Id::vocab_index(20)],
//!         vec![Id::vocab_index(3), Id::vocab_index(21)],
//!     ],
//! )
//! .unwrap();
//!
//! let join = MultiColumnJoin::new(Box::new(names), Box::new(cities)).unwrap();
//! let ctx = ExecutionContext::new(
//!     TrackedAllocator::unlimited(),
//!     Arc::new(ResultCache::default()),
//! );
//!
//! let result = get_result(&join, &ctx).unwrap();
//! assert_eq!(result.num_rows(), 1);
//! ```
//!
//! ## Modules
//!
//! - [`core`] - universal types ([`Id`], [`IdTable`], [`LocalVocab`], [`Error`])
//! - [`memory`] - the tracked allocation budget
//! - [`index`] - the external index interface
//! - [`executor`] - operators, joins, caching, cancellation, worker pools

// Use mimalloc as global allocator when the feature is enabled
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod core;
pub mod executor;
pub mod index;
pub mod memory;

// Re-export main types for convenience
pub use crate::core::{Datatype, Error, Id, IdTable, IdTableView, LocalVocab, Result};

pub use crate::memory::{AllocatorStats, TrackedAllocator};

pub use crate::index::{InMemoryIndex, Index};

pub use crate::executor::{
    get_result, CacheStats, CancellationHandle, ColumnInfo, ExecutionContext, IndexScan,
    JoinColumnMapping, MultiColumnJoin, Operator, PresortedTableScan, QueryPool, ResultCache,
    ResultTable, RowCombiner, TimeoutGuard, UpdateQueue, Variable, VariableColumns,
};
