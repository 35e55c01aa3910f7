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

//! Error types for Quiver
//!
//! This module defines all error types used throughout the execution engine.

use thiserror::Error;

/// Result type alias for Quiver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Quiver engine operations
///
/// Cancellation, timeout and memory-limit errors are raised synchronously at
/// poll checkpoints and are never recovered inside the engine, only surfaced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // Resource errors
    // =========================================================================
    /// Query was cancelled by the caller
    #[error("query cancelled")]
    Cancelled,

    /// Query exceeded its deadline
    #[error("query timed out")]
    TimedOut,

    /// Allocation would exceed the memory budget
    #[error("memory budget exceeded: requested {requested} bytes but only {available} available")]
    OutOfMemory { requested: usize, available: usize },

    // =========================================================================
    // Caller errors
    // =========================================================================
    /// Bad column indices, mismatched widths or otherwise invalid input.
    /// Fatal for the query, not the process.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // =========================================================================
    // Propagation
    // =========================================================================
    /// A child operation failed while this one was waiting on it
    #[error("operation '{descriptor}' failed: {message}")]
    ChildFailed { descriptor: String, message: String },

    /// Internal error for invariant violations; never retried
    #[error("{message}")]
    Internal { message: String },
}

impl Error {
    /// Create a new OutOfMemory error
    pub fn out_of_memory(requested: usize, available: usize) -> Self {
        Error::OutOfMemory {
            requested,
            available,
        }
    }

    /// Create a new InvalidArgument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Create a new ChildFailed error
    pub fn child_failed(descriptor: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ChildFailed {
            descriptor: descriptor.into(),
            message: message.into(),
        }
    }

    /// Create a new Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Check if this error was caused by resource exhaustion
    /// (cancellation, timeout or the memory budget)
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(
            self,
            Error::Cancelled | Error::TimedOut | Error::OutOfMemory { .. }
        )
    }

    /// Check if this is an internal invariant violation
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Cancelled.to_string(), "query cancelled");
        assert_eq!(Error::TimedOut.to_string(), "query timed out");
        assert_eq!(
            Error::out_of_memory(4096, 1024).to_string(),
            "memory budget exceeded: requested 4096 bytes but only 1024 available"
        );
        assert_eq!(
            Error::invalid_argument("column index 7 out of range").to_string(),
            "invalid argument: column index 7 out of range"
        );
        assert_eq!(
            Error::child_failed("MultiColumnJoin on ?x", "query cancelled").to_string(),
            "operation 'MultiColumnJoin on ?x' failed: query cancelled"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::Cancelled.is_resource_exhausted());
        assert!(Error::TimedOut.is_resource_exhausted());
        assert!(Error::out_of_memory(1, 0).is_resource_exhausted());
        assert!(!Error::invalid_argument("x").is_resource_exhausted());
        assert!(!Error::internal("x").is_resource_exhausted());

        assert!(Error::internal("broken invariant").is_internal());
        assert!(!Error::Cancelled.is_internal());
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(Error::Cancelled, Error::Cancelled);
        assert_ne!(Error::Cancelled, Error::TimedOut);
        assert_eq!(Error::out_of_memory(8, 4), Error::out_of_memory(8, 4));
        assert_ne!(Error::out_of_memory(8, 4), Error::out_of_memory(8, 2));
    }
}
