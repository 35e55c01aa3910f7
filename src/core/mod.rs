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

//! Core types for Quiver
//!
//! - [`Id`] - 64-bit tagged identifier, the universal cell type
//! - [`IdTable`] / [`IdTableView`] - columnar id storage and zero-copy views
//! - [`LocalVocab`] - per-result side table for freshly minted ids
//! - [`Error`] / [`Result`] - engine-wide error handling

pub mod error;
pub mod id;
pub mod id_table;
pub mod vocab;

pub use error::{Error, Result};
pub use id::{Datatype, Id};
pub use id_table::{IdTable, IdTableView, PARALLEL_SORT_THRESHOLD};
pub use vocab::LocalVocab;
