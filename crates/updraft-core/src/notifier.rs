// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-update result callbacks.

use serde_json::Value;

use crate::error::UpdateFailedError;

/// Terminal result callbacks for one update.
///
/// Eight terminal signals exist, four per phase. For every update the
/// controller guarantees that exactly one of the four forward signals fires,
/// and (if the update participates in a rollback) exactly one of the four
/// rollback signals. The guarantee is enforced by the controller's internal
/// counting decorator, so implementations do not need their own guards.
///
/// All methods have empty default bodies; implement only the signals you
/// care about. Callbacks may arrive on a runtime worker thread when the
/// runtime applier completes an update asynchronously, so implementations
/// must be `Send + Sync` and should not block.
///
/// Per-update context (the opaque "parameter" a caller wants echoed back
/// with each result) is carried by capturing it in the notifier itself
/// rather than threading it through the controller.
#[allow(unused_variables)]
pub trait ResultNotifier: Send + Sync {
    /// The update was applied; `result` is the runtime-produced payload, if
    /// any.
    fn handle_success(&self, result: Option<Value>) {}

    /// The update failed at the model or runtime layer.
    fn handle_failure(&self, cause: &UpdateFailedError) {}

    /// The update was never attempted because an earlier update already
    /// triggered rollback.
    fn handle_cancellation(&self) {}

    /// The runtime applier gave up waiting for the update to complete.
    fn handle_timeout(&self) {}

    /// This update's compensation was applied.
    fn handle_rollback_success(&self) {}

    /// This update's compensation failed.
    fn handle_rollback_failure(&self, cause: &UpdateFailedError) {}

    /// This update's compensation was skipped because an earlier rollback
    /// step failed at the runtime layer.
    fn handle_rollback_cancellation(&self) {}

    /// The runtime applier gave up waiting for the compensation to complete.
    fn handle_rollback_timeout(&self) {}
}

/// A notifier that ignores every signal.
///
/// Useful for updates whose outcome the caller observes elsewhere (for
/// example through the commit handler or the batch summary).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ResultNotifier for NoopNotifier {}
