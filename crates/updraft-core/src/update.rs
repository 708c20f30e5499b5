// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The update contract: one described change plus its compensation.

use std::sync::Arc;

use crate::error::UpdateFailedError;

/// An immutable description of one change against a model of type `M`.
///
/// An update carries two capabilities: it can apply itself to the model, and
/// it can produce the compensating update that undoes it. The runtime side
/// effect of an update (installing or removing services, rebinding resources)
/// is not applied by the update itself; the controller hands the update to a
/// [`RuntimeBatch`](crate::runtime::RuntimeBatch) which owns that stage.
///
/// Implementations must be cheap to share: the controller clones the
/// `Arc<dyn ModelUpdate<M>>` into the runtime batch and, for successful
/// updates, into the rollback list.
pub trait ModelUpdate<M>: Send + Sync {
    /// A short name for this update, used in logs and failure reports.
    fn name(&self) -> &str {
        "update"
    }

    /// Apply this update to the model, mutating it in place.
    ///
    /// On failure the model may or may not have been mutated; the
    /// `partially_applied` flag on the returned error records which, and
    /// drives the controller's best-effort local revert.
    fn apply(&self, model: &mut M) -> Result<(), UpdateFailedError>;

    /// Compute the update that undoes this one.
    ///
    /// Called against the model state *before* [`apply`](Self::apply) has
    /// mutated it, so the compensation can capture the pre-image. Must not
    /// mutate the model. `None` means no compensation is possible or needed.
    fn compensating_update(&self, model: &M) -> Option<Arc<dyn ModelUpdate<M>>>;
}
