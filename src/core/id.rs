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

//! 64-bit tagged identifiers
//!
//! Every cell in every table is an [`Id`]: a 4-bit datatype tag in the high
//! bits and a 60-bit payload. The payload of a `VocabIndex` id is an index
//! into the global dictionary; `LocalVocabIndex` ids point into a per-result
//! [`LocalVocab`](crate::core::LocalVocab).
//!
//! The distinguished [`Id::UNDEFINED`] value means "unbound". It carries the
//! smallest tag, so rows whose key contains UNDEF sort to the front of a
//! sorted table. The join layer relies on this placement: the extra matches
//! for UNDEF keys are always found in an already-consumed prefix.

use std::fmt;

/// Number of bits used for the datatype tag
const TAG_BITS: u32 = 4;

/// Number of bits available for the payload
const PAYLOAD_BITS: u32 = 64 - TAG_BITS;

/// Mask selecting the payload bits
const PAYLOAD_MASK: u64 = (1 << PAYLOAD_BITS) - 1;

/// Datatype tag of an [`Id`]
///
/// The numeric tag values define the coarse sort order between datatypes;
/// `Undefined` must stay the smallest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Datatype {
    /// The "unbound" marker; matches anything in a join
    Undefined = 0,
    /// Inline integer value
    Int = 1,
    /// Index into the global dictionary
    VocabIndex = 2,
    /// Index into a per-result local vocabulary
    LocalVocabIndex = 3,
    /// Blank node id
    Blank = 4,
}

impl Datatype {
    /// Decode a tag value; `None` for tags no constructor produces
    pub fn from_tag(tag: u8) -> Option<Datatype> {
        match tag {
            0 => Some(Datatype::Undefined),
            1 => Some(Datatype::Int),
            2 => Some(Datatype::VocabIndex),
            3 => Some(Datatype::LocalVocabIndex),
            4 => Some(Datatype::Blank),
            _ => None,
        }
    }
}

/// A 64-bit tagged identifier, the universal cell type
///
/// Ordering is the plain `u64` order of the underlying bits: the tag orders
/// first, then the payload. This gives a total order in which UNDEF compares
/// less than every defined id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Id(u64);

impl Id {
    /// The distinguished "unbound" value
    pub const UNDEFINED: Id = Id(0);

    #[inline]
    const fn make(tag: Datatype, payload: u64) -> Id {
        Id(((tag as u64) << PAYLOAD_BITS) | (payload & PAYLOAD_MASK))
    }

    /// Create an inline integer id. The value is truncated to the payload
    /// width; only the bit pattern round-trips, not numeric order across
    /// the sign boundary.
    #[inline]
    pub const fn int(value: i64) -> Id {
        Id::make(Datatype::Int, value as u64)
    }

    /// Create an id pointing into the global dictionary
    #[inline]
    pub const fn vocab_index(index: u64) -> Id {
        Id::make(Datatype::VocabIndex, index)
    }

    /// Create an id pointing into a per-result local vocabulary
    #[inline]
    pub const fn local_vocab_index(index: u64) -> Id {
        Id::make(Datatype::LocalVocabIndex, index)
    }

    /// Create a blank node id
    #[inline]
    pub const fn blank(index: u64) -> Id {
        Id::make(Datatype::Blank, index)
    }

    /// Reconstruct an id from raw bits (as produced by [`Id::to_bits`])
    #[inline]
    pub const fn from_bits(bits: u64) -> Id {
        Id(bits)
    }

    /// The raw 64-bit representation
    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Whether this id is the UNDEF marker
    #[inline]
    pub const fn is_undefined(self) -> bool {
        self.0 == 0
    }

    /// The datatype tag of this id
    #[inline]
    pub fn datatype(self) -> Datatype {
        let tag = (self.0 >> PAYLOAD_BITS) as u8;
        debug_assert!(Datatype::from_tag(tag).is_some(), "corrupt id tag {tag}");
        Datatype::from_tag(tag).unwrap_or(Datatype::Undefined)
    }

    /// The 60-bit payload of this id
    #[inline]
    pub const fn payload(self) -> u64 {
        self.0 & PAYLOAD_MASK
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_undefined() {
            return write!(f, "U");
        }
        match self.datatype() {
            Datatype::Undefined => write!(f, "U"),
            Datatype::Int => write!(f, "I:{}", self.payload()),
            Datatype::VocabIndex => write!(f, "V:{}", self.payload()),
            Datatype::LocalVocabIndex => write!(f, "L:{}", self.payload()),
            Datatype::Blank => write!(f, "B:{}", self.payload()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_is_smallest() {
        assert!(Id::UNDEFINED < Id::int(0));
        assert!(Id::UNDEFINED < Id::vocab_index(0));
        assert!(Id::UNDEFINED < Id::local_vocab_index(0));
        assert!(Id::UNDEFINED.is_undefined());
        assert!(!Id::vocab_index(0).is_undefined());
    }

    #[test]
    fn test_tag_and_payload_round_trip() {
        let id = Id::vocab_index(42);
        assert_eq!(id.datatype(), Datatype::VocabIndex);
        assert_eq!(id.payload(), 42);

        let id = Id::local_vocab_index(7);
        assert_eq!(id.datatype(), Datatype::LocalVocabIndex);
        assert_eq!(id.payload(), 7);

        let id = Id::from_bits(Id::int(123).to_bits());
        assert_eq!(id, Id::int(123));
    }

    #[test]
    fn test_order_within_datatype() {
        assert!(Id::vocab_index(1) < Id::vocab_index(2));
        assert!(Id::int(1) < Id::int(2));
        // Datatype tag orders before payload.
        assert!(Id::int(u32::MAX as i64) < Id::vocab_index(0));
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", Id::UNDEFINED), "U");
        assert_eq!(format!("{:?}", Id::vocab_index(3)), "V:3");
        assert_eq!(format!("{:?}", Id::int(9)), "I:9");
    }
}
