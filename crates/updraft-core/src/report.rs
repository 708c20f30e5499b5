// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Serializable outcome records for a controller run.
//!
//! Management surfaces above the controller (client responses, rollout
//! reports) want the outcome of a batch as data rather than as callbacks.
//! [`RecordingNotifier`] turns notifier signals into timestamped
//! [`UpdateEvent`] records, and [`BatchSummary`] snapshots the controller's
//! counters.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::controller::ControllerStatus;
use crate::error::UpdateFailedError;
use crate::notifier::ResultNotifier;

/// One terminal signal, as data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateSignal {
    /// Forward success, with the runtime-produced payload if any.
    Success {
        /// Runtime result payload.
        result: Option<Value>,
    },
    /// Forward failure.
    Failure {
        /// Rendered failure cause.
        message: String,
    },
    /// The update was skipped after rollback was triggered.
    Cancellation,
    /// The runtime applier timed out waiting for the update.
    Timeout,
    /// The compensation was applied.
    RollbackSuccess,
    /// The compensation failed.
    RollbackFailure {
        /// Rendered failure cause.
        message: String,
    },
    /// The compensation was skipped after an earlier rollback step failed.
    RollbackCancellation,
    /// The runtime applier timed out waiting for the compensation.
    RollbackTimeout,
}

/// A recorded terminal signal for one update.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateEvent {
    /// Label of the update the signal belongs to.
    pub update: String,
    /// The signal itself.
    pub signal: UpdateSignal,
    /// When the signal was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Shared, ordered sink of [`UpdateEvent`]s.
///
/// Clones share the same underlying log, so one sink can be handed to the
/// recording notifiers of every update in a batch and later read back as a
/// single interleaved history.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<UpdateEvent>>>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the recorded events in arrival order.
    pub fn events(&self) -> Vec<UpdateEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Snapshot the recorded signals only, in arrival order.
    pub fn signals(&self) -> Vec<UpdateSignal> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.signal.clone())
            .collect()
    }

    /// Snapshot `(update, signal)` pairs in arrival order.
    pub fn labeled_signals(&self) -> Vec<(String, UpdateSignal)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| (e.update.clone(), e.signal.clone()))
            .collect()
    }

    fn push(&self, update: &str, signal: UpdateSignal) {
        self.events.lock().unwrap().push(UpdateEvent {
            update: update.to_string(),
            signal,
            recorded_at: Utc::now(),
        });
    }
}

/// A notifier that records every signal into an [`EventLog`].
#[derive(Debug, Clone)]
pub struct RecordingNotifier {
    label: String,
    log: EventLog,
}

impl RecordingNotifier {
    /// Create a notifier that records under `label` into `log`.
    pub fn new(label: impl Into<String>, log: EventLog) -> Self {
        Self {
            label: label.into(),
            log,
        }
    }
}

impl ResultNotifier for RecordingNotifier {
    fn handle_success(&self, result: Option<Value>) {
        self.log.push(&self.label, UpdateSignal::Success { result });
    }

    fn handle_failure(&self, cause: &UpdateFailedError) {
        self.log.push(
            &self.label,
            UpdateSignal::Failure {
                message: cause.to_string(),
            },
        );
    }

    fn handle_cancellation(&self) {
        self.log.push(&self.label, UpdateSignal::Cancellation);
    }

    fn handle_timeout(&self) {
        self.log.push(&self.label, UpdateSignal::Timeout);
    }

    fn handle_rollback_success(&self) {
        self.log.push(&self.label, UpdateSignal::RollbackSuccess);
    }

    fn handle_rollback_failure(&self, cause: &UpdateFailedError) {
        self.log.push(
            &self.label,
            UpdateSignal::RollbackFailure {
                message: cause.to_string(),
            },
        );
    }

    fn handle_rollback_cancellation(&self) {
        self.log.push(&self.label, UpdateSignal::RollbackCancellation);
    }

    fn handle_rollback_timeout(&self) {
        self.log.push(&self.label, UpdateSignal::RollbackTimeout);
    }
}

/// Point-in-time snapshot of a controller's progress counters.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Identifier of the controller run.
    pub batch_id: Uuid,
    /// Controller status at snapshot time.
    pub status: ControllerStatus,
    /// Number of updates in the batch.
    pub update_count: usize,
    /// Forward-pass completions so far (any outcome).
    pub updated_count: usize,
    /// Number of entries on the rollback list.
    pub rollback_count: usize,
    /// Rollback-pass completions so far (any outcome).
    pub rolled_back_count: usize,
}
