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

//! Join operators and their building blocks
//!
//! The join pipeline for a [`MultiColumnJoin`]:
//!
//! ```text
//! children's tables
//!   ↓
//! JoinColumnMapping  (join-column projections + permutations)
//!   ↓
//! zipper_join        (sort-merge; UNDEF fallback path when needed)
//!   ↓
//! RowCombiner        (writes combined rows through the memory budget)
//!   ↓
//! post-sort          (only if the UNDEF path emitted out of order)
//!   ↓
//! output permutation (user-visible column layout)
//! ```

pub mod column_mapping;
pub mod combiner;
pub mod multi_column;
pub mod zipper;

pub use column_mapping::JoinColumnMapping;
pub use combiner::RowCombiner;
pub use multi_column::MultiColumnJoin;
pub use zipper::zipper_join;
