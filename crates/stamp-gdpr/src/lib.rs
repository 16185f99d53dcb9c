// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! GDPR erasure lifecycle for the Stamp assistant.
//!
//! [`DeletionLifecycle`] drives the request state machine and mirrors
//! every transition into a hash-chained deletion audit trail that is
//! retained independently of the conversations it describes.
//! [`DeletionSweeper`] is the time-driven collaborator that processes
//! requests once their grace period elapses.

pub mod lifecycle;
pub mod sweeper;

pub use lifecycle::DeletionLifecycle;
pub use sweeper::DeletionSweeper;
