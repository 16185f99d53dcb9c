// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Stamp conversational time-tracking assistant.
//!
//! This crate provides the foundational trait definitions, error types, and
//! domain types used throughout the Stamp workspace. Storage backends and
//! the external HR gateway implement the traits defined here.

pub mod audit;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use audit::{AuditLogEntry, DeletionAuditLogEntry};
pub use error::StampError;
pub use traits::{
    AuditStore, ClockSubmission, ConversationStore, DeletionRequestStore, ExternalGateway,
    QueueStore, Store,
};
pub use types::{
    ActiveSession, ClockAction, ConversationState, ConversationThread, DeletionRequest,
    DeletionStatus, QueueItem, QueueStatus, SubmissionOutcome, ThreadMessage,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_error_has_all_variants() {
        let _config = StampError::Config("test".into());
        let _storage = StampError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _gateway = StampError::Gateway {
            message: "test".into(),
            source: None,
        };
        let _protocol = StampError::Protocol("test".into());
        let _not_found = StampError::NotFound {
            entity: "thread",
            id: "t1".into(),
        };
        let _conflict = StampError::Conflict("test".into());
        let _transition = StampError::InvalidTransition {
            entity: "deletion request",
            from: "Completed".into(),
            to: "Processing".into(),
        };
        let _timeout = StampError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = StampError::Internal("test".into());
    }

    #[test]
    fn error_display_names_the_entity() {
        let err = StampError::NotFound {
            entity: "thread",
            id: "t-42".into(),
        };
        assert_eq!(err.to_string(), "thread not found: t-42");

        let err = StampError::InvalidTransition {
            entity: "deletion request",
            from: "Cancelled".into(),
            to: "Processing".into(),
        };
        assert!(err.to_string().contains("Cancelled -> Processing"));
    }

    #[test]
    fn store_supertrait_is_object_safe() {
        fn _assert_store(_s: &dyn Store) {}
        fn _assert_gateway(_g: &dyn ExternalGateway) {}
    }
}
