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

//! Per-result local vocabularies
//!
//! Expressions, BIND and VALUES mint ids that have no entry in the global
//! dictionary. A [`LocalVocab`] is the per-result side table mapping those
//! freshly minted ids back to their string form.
//!
//! Local indices come from one process-wide counter, so vocabularies from
//! different results never collide and merging is a plain union. When two
//! results are combined the merge aliases the non-empty side whenever it
//! can; only two non-empty vocabularies force an allocation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::core::{Error, Id, Result};

/// Process-wide source of local vocabulary indices
static NEXT_LOCAL_INDEX: AtomicU64 = AtomicU64::new(0);

/// Side table mapping locally minted ids to their string form
#[derive(Debug, Clone, Default)]
pub struct LocalVocab {
    words: Arc<FxHashMap<u64, Arc<str>>>,
}

impl LocalVocab {
    /// Create an empty local vocabulary
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this vocabulary holds no words
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of words held
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Mint a fresh local id for `word`
    pub fn mint(&mut self, word: impl Into<Arc<str>>) -> Id {
        let index = NEXT_LOCAL_INDEX.fetch_add(1, Ordering::Relaxed);
        Arc::make_mut(&mut self.words).insert(index, word.into());
        Id::local_vocab_index(index)
    }

    /// Look up the string form of a local id
    pub fn get(&self, id: Id) -> Option<&str> {
        self.words.get(&id.payload()).map(|w| w.as_ref())
    }

    /// Merge the vocabularies of two results being combined.
    ///
    /// If at most one side is non-empty the result aliases it (a refcount
    /// bump, no copy). Two non-empty sides allocate a combined map. An index
    /// mapped to two different words means a minting invariant was broken
    /// upstream and surfaces as [`Error::Internal`].
    pub fn merge(a: &LocalVocab, b: &LocalVocab) -> Result<LocalVocab> {
        if a.is_empty() {
            return Ok(b.clone());
        }
        if b.is_empty() {
            return Ok(a.clone());
        }

        let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
        let mut combined = (*large.words).clone();
        for (&index, word) in small.words.iter() {
            if let Some(existing) = combined.get(&index) {
                if existing != word {
                    return Err(Error::internal(format!(
                        "local vocab index {index} maps to two different words"
                    )));
                }
                continue;
            }
            combined.insert(index, word.clone());
        }
        Ok(LocalVocab {
            words: Arc::new(combined),
        })
    }
}
