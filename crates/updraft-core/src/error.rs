// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for updraft-core.
//!
//! Three failure families exist, and they travel on different paths:
//! model-level application errors ([`UpdateFailedError`]) are absorbed and
//! reported through notifier callbacks; runtime batch install errors
//! ([`InstallError`]) force a rollback of the whole pass; API misuse
//! ([`ControllerError`]) is the only family returned synchronously to the
//! caller.

use crate::controller::ControllerStatus;

/// Result type using ControllerError
pub type Result<T> = std::result::Result<T, ControllerError>;

/// Raised when applying an update (or a compensating update) to the model
/// fails.
///
/// The `partially_applied` flag records whether the model was left in a
/// half-mutated state. The controller uses it to decide whether a
/// best-effort local revert of the failed update is worth attempting.
#[derive(Debug, Clone, thiserror::Error)]
#[error("update '{update}' failed: {message}")]
pub struct UpdateFailedError {
    /// Name of the update that failed.
    pub update: String,
    /// Human-readable reason for the failure.
    pub message: String,
    /// True when the model was mutated before the failure surfaced.
    pub partially_applied: bool,
}

impl UpdateFailedError {
    /// Create an error for an update that left the model untouched.
    pub fn new(update: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            update: update.into(),
            message: message.into(),
            partially_applied: false,
        }
    }

    /// Create an error for an update that mutated the model before failing.
    pub fn partial(update: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            update: update.into(),
            message: message.into(),
            partially_applied: true,
        }
    }
}

/// Raised when the atomic install of an accumulated runtime batch fails.
///
/// During the forward pass this is fatal and forces a rollback. During the
/// rollback pass it is logged and swallowed; there is no third level of
/// recovery below a failed rollback.
#[derive(Debug, thiserror::Error)]
#[error("runtime batch install failed: {0}")]
pub struct InstallError(#[from] anyhow::Error);

/// API misuse errors returned synchronously from controller methods.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ControllerError {
    /// An update was added after execution started.
    #[error("updates cannot be added after execution has started (status: {status})")]
    UpdatesClosed {
        /// The controller status at the time of the call.
        status: ControllerStatus,
    },

    /// `execute_updates` was called more than once.
    #[error("controller has already been executed (status: {status})")]
    AlreadyExecuted {
        /// The controller status at the time of the call.
        status: ControllerStatus,
    },
}
