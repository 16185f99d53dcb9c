// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Stamp assistant core.

use thiserror::Error;

/// The primary error type used across all Stamp store traits and core operations.
#[derive(Debug, Error)]
pub enum StampError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// External HR gateway errors (connection failure, malformed response).
    #[error("gateway error: {message}")]
    Gateway {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Streaming protocol violations (unmatched tool-call end, stale delta).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A requested entity does not exist in its identity partition.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The operation conflicts with existing state (e.g. a second pending
    /// deletion request for the same identity).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An illegal lifecycle transition was attempted on a state machine.
    #[error("illegal {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StampError {
    /// Wrap an arbitrary error as a storage error.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StampError::Storage {
            source: Box::new(source),
        }
    }
}
