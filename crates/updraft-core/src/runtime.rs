// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The runtime side of an update pass.
//!
//! The model records *what* the configuration should be; the runtime applier
//! makes the live service graph agree with it. The controller accumulates the
//! runtime actions of one pass (forward or rollback) into a single batch and
//! installs it atomically at the end of the pass.

use std::sync::Arc;

use crate::error::InstallError;
use crate::notifier::ResultNotifier;
use crate::update::ModelUpdate;

/// Factory for runtime batches.
///
/// One batch is created per pass: one for the forward pass, and one for the
/// rollback pass if a rollback is triggered.
pub trait RuntimeApplier<M>: Send + Sync {
    /// Begin a new batch of runtime actions.
    fn new_batch(&self) -> Box<dyn RuntimeBatch<M>>;
}

/// An atomically-installed collection of runtime actions.
pub trait RuntimeBatch<M>: Send {
    /// Add the runtime action for one update to this batch.
    ///
    /// Completion is delivered through `notifier`, either synchronously from
    /// inside this call or asynchronously from a worker thread, and exactly
    /// once. An `Err` return means the action could not even be scheduled;
    /// in that case the implementation must not invoke the notifier at all —
    /// the controller reports the failure itself.
    fn apply_update(
        &mut self,
        update: Arc<dyn ModelUpdate<M>>,
        notifier: Arc<dyn ResultNotifier>,
    ) -> anyhow::Result<()>;

    /// Install the accumulated actions as one atomic unit.
    ///
    /// A forward-pass install failure forces a rollback of the whole batch.
    /// A rollback-pass install failure is logged and swallowed by the
    /// controller.
    fn install(self: Box<Self>) -> Result<(), InstallError>;
}
