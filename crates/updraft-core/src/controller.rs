// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The batch update controller.
//!
//! [`UpdateController`] accepts a batch of updates, applies them against the
//! model and the live runtime in insertion order, and on any failure walks
//! the already-applied updates back in reverse order. Completion of
//! individual updates may arrive asynchronously from the runtime applier;
//! the controller observes its own completion counters to decide when to
//! transition, and finally invokes the commit handler exactly once on the
//! injected dispatcher.
//!
//! # Status state machine
//!
//! ```text
//!                  ┌─────────┐
//!                  │ PENDING │ add_update() legal only here
//!                  └────┬────┘
//!                       │ execute_updates()
//!                       ▼
//!                  ┌─────────┐  all updates completed,
//!                  │ ACTIVE  │──────── no failure ────────┐
//!                  └────┬────┘                            │
//!                       │ failure / timeout /             │
//!                       │ runtime install failure         │
//!                       ▼                                 │
//!             ┌─────────────────┐                         │
//!             │ MARKED_ROLLBACK │                         │
//!             └────────┬────────┘                         │
//!         rollback     │      rollback disallowed,        │
//!         allowed      │      all updates completed       │
//!                      ▼                                  │
//!             ┌──────────────┐                            │
//!             │ ROLLING_BACK │                            │
//!             └──────┬───────┘                            │
//!                    │ all rollbacks completed            │
//!                    ▼                                    ▼
//!             ┌────────────┐                       ┌────────────┐
//!             │ COMMITTING │◄──────────────────────│ COMMITTING │
//!             └──────┬─────┘                       └──────┬─────┘
//!                    ▼                                    ▼
//!             ┌─────────────┐                      ┌───────────┐
//!             │ ROLLED_BACK │                      │ COMMITTED │
//!             └─────────────┘                      └───────────┘
//! ```
//!
//! # Failure semantics
//!
//! | Failure | Phase | Effect |
//! |---------|-------|--------|
//! | Model apply error | forward | reported via notifier, batch continues; local revert if partially applied |
//! | Runtime batch install error | forward | fatal, forces rollback |
//! | Model apply error | rollback | reported via notifier, walk continues |
//! | Runtime scheduling error | rollback | remaining rollback steps cancelled |
//! | Runtime batch install error | rollback | logged only |

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ControllerOptions;
use crate::dispatch::Dispatcher;
use crate::error::{ControllerError, Result, UpdateFailedError};
use crate::notifier::ResultNotifier;
use crate::report::BatchSummary;
use crate::runtime::{RuntimeApplier, RuntimeBatch};
use crate::update::ModelUpdate;

/// Lifecycle status of a controller run.
///
/// Exactly one of `Committed`/`RolledBack` is terminal; once terminal the
/// controller mutates nothing further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerStatus {
    /// Updates may still be added; execution has not started.
    Pending,
    /// The forward pass is in progress or awaiting async completions.
    Active,
    /// A failure occurred; rollback has been requested but not started.
    MarkedRollback,
    /// The rollback pass is in progress or awaiting async completions.
    RollingBack,
    /// The commit handler is being invoked.
    Committing,
    /// Terminal: the batch was applied (or failures were accepted because
    /// overall rollback is disallowed).
    Committed,
    /// Terminal: the batch was rolled back.
    RolledBack,
}

impl ControllerStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::MarkedRollback => "marked_rollback",
            Self::RollingBack => "rolling_back",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Parse a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "marked_rollback" => Some(Self::MarkedRollback),
            "rolling_back" => Some(Self::RollingBack),
            "committing" => Some(Self::Committing),
            "committed" => Some(Self::Committed),
            "rolled_back" => Some(Self::RolledBack),
            _ => None,
        }
    }
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback invoked exactly once when a controller run finishes.
///
/// `prior_status` is the status the run was in when commit handling began:
/// `Active` for a clean run, `MarkedRollback` or `RollingBack` when a
/// failure occurred.
pub trait CommitHandler: Send + Sync {
    /// Observe the end of a controller run.
    fn handle_update_commit(&self, prior_status: ControllerStatus);
}

impl<F> CommitHandler for F
where
    F: Fn(ControllerStatus) + Send + Sync,
{
    fn handle_update_commit(&self, prior_status: ControllerStatus) {
        self(prior_status)
    }
}

/// An update bound to its result notifier for one controller run.
struct UpdateTuple<M> {
    update: Arc<dyn ModelUpdate<M>>,
    notifier: Arc<dyn ResultNotifier>,
}

/// One slot on the rollback list.
///
/// `update` is `None` when the forward update succeeded but offered no
/// compensation; the slot still exists so the rollback completion count
/// lines up with the list length.
struct RollbackEntry<M> {
    update: Option<Arc<dyn ModelUpdate<M>>>,
    notifier: Arc<dyn ResultNotifier>,
}

impl<M> Clone for RollbackEntry<M> {
    fn clone(&self) -> Self {
        Self {
            update: self.update.clone(),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

/// Which side of the run a delegating notifier is counting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Forward,
    Rollback,
}

/// What a state transition decided to do, returned out of the lock so the
/// dispatch happens with the lock released.
enum Action {
    None,
    Rollback,
    Commit,
}

/// State guarded by the controller's single mutex.
struct Inner<M> {
    status: ControllerStatus,
    pending: Vec<UpdateTuple<M>>,
    update_count: usize,
    rollbacks: VecDeque<RollbackEntry<M>>,
    updated_count: usize,
    rolled_back_count: usize,
    rollback_scheduled: bool,
    commit_scheduled: bool,
}

struct Shared<M> {
    batch_id: Uuid,
    model: Arc<Mutex<M>>,
    runtime: Option<Arc<dyn RuntimeApplier<M>>>,
    dispatcher: Arc<dyn Dispatcher>,
    commit_handler: Arc<dyn CommitHandler>,
    options: ControllerOptions,
    inner: Mutex<Inner<M>>,
}

/// Coordinates one transactional batch of updates against a model and its
/// runtime.
///
/// Construct via [`UpdateController::builder`], add updates while pending,
/// then call [`execute_updates`](Self::execute_updates) once. The model must
/// not be mutated by anyone else for the duration of the run; serializing
/// batches against one model is the caller's responsibility.
pub struct UpdateController<M> {
    shared: Arc<Shared<M>>,
}

impl<M> fmt::Debug for UpdateController<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateController")
            .field("batch_id", &self.shared.batch_id)
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

impl<M> Clone for UpdateController<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: Send + 'static> UpdateController<M> {
    /// Start building a controller.
    pub fn builder() -> UpdateControllerBuilder<M> {
        UpdateControllerBuilder::new()
    }

    /// Identifier of this controller run, included in its log records.
    pub fn batch_id(&self) -> Uuid {
        self.shared.batch_id
    }

    /// Queue an update for execution. Append order is application order.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::UpdatesClosed`] once execution has started.
    pub fn add_update(
        &self,
        update: Arc<dyn ModelUpdate<M>>,
        notifier: Arc<dyn ResultNotifier>,
    ) -> Result<()> {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.status != ControllerStatus::Pending {
            return Err(ControllerError::UpdatesClosed {
                status: inner.status,
            });
        }
        debug!(
            batch_id = %self.shared.batch_id,
            update = update.name(),
            position = inner.pending.len(),
            "queued update"
        );
        inner.pending.push(UpdateTuple { update, notifier });
        inner.update_count += 1;
        Ok(())
    }

    /// Run the forward pass.
    ///
    /// Returns once the forward pass has been initiated for every update;
    /// because individual updates may complete asynchronously, overall
    /// completion (commit or rollback) may occur after this call returns and
    /// is delivered via the commit handler.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::AlreadyExecuted`] unless the controller is
    /// still pending.
    pub fn execute_updates(&self) -> Result<()> {
        let tuples = {
            let mut inner = self.shared.inner.lock().unwrap();
            if inner.status != ControllerStatus::Pending {
                return Err(ControllerError::AlreadyExecuted {
                    status: inner.status,
                });
            }
            inner.status = ControllerStatus::Active;
            std::mem::take(&mut inner.pending)
        };

        info!(
            batch_id = %self.shared.batch_id,
            updates = tuples.len(),
            "executing update batch"
        );

        if tuples.is_empty() {
            // Nothing to wait on; commit directly.
            let action = {
                let mut inner = self.shared.inner.lock().unwrap();
                self.shared.schedule_commit_locked(&mut inner)
            };
            Shared::run_action(&self.shared, action);
            return Ok(());
        }

        let mut batch = self.shared.runtime.as_ref().map(|r| r.new_batch());
        for tuple in tuples {
            Shared::apply_forward(&self.shared, tuple, &mut batch);
        }

        if let Some(batch) = batch {
            if let Err(err) = batch.install() {
                error!(
                    batch_id = %self.shared.batch_id,
                    error = %err,
                    "runtime batch install failed; rolling back"
                );
                let action = self.shared.trigger_rollback();
                Shared::run_action(&self.shared, action);
            }
        }

        Ok(())
    }

    /// Current status. Safe to call from any thread at any time.
    pub fn status(&self) -> ControllerStatus {
        self.shared.inner.lock().unwrap().status
    }

    /// Snapshot the run's progress counters.
    pub fn summary(&self) -> BatchSummary {
        let inner = self.shared.inner.lock().unwrap();
        BatchSummary {
            batch_id: self.shared.batch_id,
            status: inner.status,
            update_count: inner.update_count,
            updated_count: inner.updated_count,
            rollback_count: inner.rollbacks.len(),
            rolled_back_count: inner.rolled_back_count,
        }
    }
}

impl<M: Send + 'static> Shared<M> {
    /// Forward-pass handling of one tuple: apply to the model, stage the
    /// runtime action, register the rollback slot.
    fn apply_forward(
        this: &Arc<Self>,
        tuple: UpdateTuple<M>,
        batch: &mut Option<Box<dyn RuntimeBatch<M>>>,
    ) {
        let counting: Arc<DelegatingNotifier<M>> = Arc::new(DelegatingNotifier::counting(
            Arc::clone(this),
            Phase::Forward,
            Arc::clone(&tuple.notifier),
        ));

        let active = { this.inner.lock().unwrap().status == ControllerStatus::Active };
        if !active {
            // An earlier update already triggered rollback; this one is
            // never attempted.
            debug!(
                batch_id = %this.batch_id,
                update = tuple.update.name(),
                "cancelling update, rollback already triggered"
            );
            counting.handle_cancellation();
            return;
        }

        // Compensation is computed against the pre-image, before apply.
        let compensation = {
            let model = this.model.lock().unwrap();
            tuple.update.compensating_update(&model)
        };

        let applied = {
            let mut model = this.model.lock().unwrap();
            tuple.update.apply(&mut model)
        };

        match applied {
            Err(cause) => {
                warn!(
                    batch_id = %this.batch_id,
                    update = tuple.update.name(),
                    error = %cause,
                    partially_applied = cause.partially_applied,
                    "model update failed"
                );
                counting.handle_failure(&cause);
                if cause.partially_applied {
                    if let Some(compensation) = compensation {
                        this.local_revert(&tuple, compensation, batch);
                    }
                }
                // Never lands on the rollback list: either the model was
                // untouched or the local revert already handled it.
            }
            Ok(()) => {
                // The slot must be on the list before any completion signal
                // can fire: a synchronously delivered runtime failure rolls
                // back whatever the list holds at that instant, and a later
                // async runtime failure must not suppress the slot.
                {
                    let mut inner = this.inner.lock().unwrap();
                    inner.rollbacks.push_front(RollbackEntry {
                        update: compensation,
                        notifier: Arc::clone(&tuple.notifier),
                    });
                }

                match batch.as_mut() {
                    Some(batch) => {
                        let scheduled =
                            batch.apply_update(Arc::clone(&tuple.update), counting.clone());
                        if let Err(err) = scheduled {
                            // Never initiated: withdraw the slot before the
                            // failure signal fires, so the rollback list
                            // covers exactly the updates that were started.
                            {
                                let mut inner = this.inner.lock().unwrap();
                                inner.rollbacks.pop_front();
                            }
                            counting.handle_failure(&UpdateFailedError::new(
                                tuple.update.name(),
                                format!("runtime application could not be scheduled: {err}"),
                            ));
                        }
                    }
                    // Runtime updates disabled: synthesize completion.
                    None => counting.handle_success(None),
                }
            }
        }
    }

    /// Best-effort inline revert of a partially applied update. Distinct
    /// from the batched rollback pass: it runs immediately, reports through
    /// the raw notifier, and never touches the rollback list or counters.
    fn local_revert(
        &self,
        tuple: &UpdateTuple<M>,
        compensation: Arc<dyn ModelUpdate<M>>,
        batch: &mut Option<Box<dyn RuntimeBatch<M>>>,
    ) {
        warn!(
            batch_id = %self.batch_id,
            update = tuple.update.name(),
            "reverting partially applied update in place"
        );

        let reverted = {
            let mut model = self.model.lock().unwrap();
            compensation.apply(&mut model)
        };

        match reverted {
            Err(err) => {
                error!(
                    batch_id = %self.batch_id,
                    update = tuple.update.name(),
                    error = %err,
                    "local revert failed; model may be inconsistent"
                );
                tuple.notifier.handle_rollback_failure(&err);
            }
            Ok(()) => {
                if let Some(batch) = batch.as_mut() {
                    // Uncounted wrapper: maps runtime completion onto the
                    // rollback signals without touching the counters.
                    let mapped: Arc<DelegatingNotifier<M>> = Arc::new(
                        DelegatingNotifier::uncounted(Phase::Rollback, Arc::clone(&tuple.notifier)),
                    );
                    if let Err(err) = batch.apply_update(compensation, mapped) {
                        error!(
                            batch_id = %self.batch_id,
                            update = tuple.update.name(),
                            error = %err,
                            "local revert runtime action could not be scheduled"
                        );
                    }
                }
            }
        }
    }

    /// The rollback pass. Runs on the dispatcher, at most once per run.
    fn run_rollback(this: &Arc<Self>) {
        {
            let mut inner = this.inner.lock().unwrap();
            if inner.status != ControllerStatus::MarkedRollback {
                // The forward pass (or an empty-list commit) already moved
                // on; nothing to do.
                debug!(
                    batch_id = %this.batch_id,
                    status = inner.status.as_str(),
                    "rollback already handled"
                );
                return;
            }
            inner.status = ControllerStatus::RollingBack;
        }

        let entries: Vec<RollbackEntry<M>> = {
            let inner = this.inner.lock().unwrap();
            inner.rollbacks.iter().cloned().collect()
        };

        info!(
            batch_id = %this.batch_id,
            rollbacks = entries.len(),
            "rolling back applied updates"
        );

        if entries.is_empty() {
            let action = {
                let mut inner = this.inner.lock().unwrap();
                this.schedule_commit_locked(&mut inner)
            };
            Shared::run_action(this, action);
            return;
        }

        let mut batch = this.runtime.as_ref().map(|r| r.new_batch());
        // Set once a compensation fails at the runtime layer; later entries
        // are cancelled rather than attempted. Model-layer failures do not
        // set it, mirroring the forward pass.
        let mut halted = false;

        for entry in entries {
            let Some(update) = entry.update else {
                // Forward update succeeded but had no compensation; the slot
                // still completes for counting purposes.
                let action = this.record_rolled_back();
                Shared::run_action(this, action);
                continue;
            };

            let counting: Arc<DelegatingNotifier<M>> = Arc::new(DelegatingNotifier::counting(
                Arc::clone(this),
                Phase::Rollback,
                Arc::clone(&entry.notifier),
            ));

            if halted {
                counting.handle_cancellation();
                continue;
            }

            let applied = {
                let mut model = this.model.lock().unwrap();
                update.apply(&mut model)
            };

            if let Err(cause) = applied {
                warn!(
                    batch_id = %this.batch_id,
                    update = update.name(),
                    error = %cause,
                    "compensating update failed at the model layer"
                );
                counting.handle_failure(&cause);
                continue;
            }

            match batch.as_mut() {
                Some(batch) => {
                    if let Err(err) = batch.apply_update(Arc::clone(&update), counting.clone()) {
                        warn!(
                            batch_id = %this.batch_id,
                            update = update.name(),
                            error = %err,
                            "compensating runtime action could not be scheduled; halting rollback"
                        );
                        halted = true;
                        counting.handle_failure(&UpdateFailedError::new(
                            update.name(),
                            format!("compensating runtime action could not be scheduled: {err}"),
                        ));
                    }
                }
                None => counting.handle_success(None),
            }
        }

        if let Some(batch) = batch {
            if let Err(err) = batch.install() {
                // No escalation path exists below a failed rollback; log and
                // leave the terminal state to the counters.
                error!(
                    batch_id = %this.batch_id,
                    error = %err,
                    "rollback runtime batch install failed; runtime may be inconsistent with model"
                );
            }
        }
    }

    /// Commit handling. Runs on the dispatcher, at most once per run.
    fn run_commit(&self) {
        let prior = {
            let mut inner = self.inner.lock().unwrap();
            let prior = inner.status;
            inner.status = ControllerStatus::Committing;
            prior
        };

        debug!(
            batch_id = %self.batch_id,
            prior = prior.as_str(),
            "committing update batch"
        );

        self.commit_handler.handle_update_commit(prior);

        let terminal = if prior == ControllerStatus::Active || !self.options.allow_overall_rollback
        {
            ControllerStatus::Committed
        } else {
            ControllerStatus::RolledBack
        };

        {
            let mut inner = self.inner.lock().unwrap();
            inner.status = terminal;
        }

        info!(
            batch_id = %self.batch_id,
            status = terminal.as_str(),
            "update batch complete"
        );
    }

    /// Record one forward completion and run the transition check.
    fn record_updated(&self, failed: bool) -> Action {
        let mut inner = self.inner.lock().unwrap();
        inner.updated_count += 1;
        self.transition_locked(&mut inner, failed)
    }

    /// Record one rollback completion and run the transition check.
    fn record_rolled_back(&self) -> Action {
        let mut inner = self.inner.lock().unwrap();
        inner.rolled_back_count += 1;
        self.transition_locked(&mut inner, false)
    }

    /// Mark a failure that carries no completion of its own (runtime batch
    /// install failure).
    fn trigger_rollback(&self) -> Action {
        let mut inner = self.inner.lock().unwrap();
        match inner.status {
            ControllerStatus::Active | ControllerStatus::MarkedRollback => {
                self.mark_rollback_locked(&mut inner)
            }
            _ => Action::None,
        }
    }

    /// The transition decision table. Caller holds the lock; the returned
    /// action is dispatched after release.
    fn transition_locked(&self, inner: &mut Inner<M>, failed: bool) -> Action {
        match inner.status {
            ControllerStatus::Active => {
                if failed {
                    return self.mark_rollback_locked(inner);
                }
                if inner.updated_count == inner.update_count {
                    return self.schedule_commit_locked(inner);
                }
                Action::None
            }
            ControllerStatus::MarkedRollback | ControllerStatus::RollingBack => {
                if inner.rollback_scheduled {
                    if inner.rolled_back_count == inner.rollbacks.len() {
                        return self.schedule_commit_locked(inner);
                    }
                } else if inner.updated_count == inner.update_count {
                    // Rollback disallowed: commit once every update has
                    // reported.
                    return self.schedule_commit_locked(inner);
                }
                Action::None
            }
            // Late or duplicate signal after commit handling started.
            _ => Action::None,
        }
    }

    fn mark_rollback_locked(&self, inner: &mut Inner<M>) -> Action {
        inner.status = ControllerStatus::MarkedRollback;
        if self.options.allow_overall_rollback {
            if !inner.rollback_scheduled {
                inner.rollback_scheduled = true;
                return Action::Rollback;
            }
            return Action::None;
        }
        if inner.updated_count == inner.update_count {
            return self.schedule_commit_locked(inner);
        }
        Action::None
    }

    fn schedule_commit_locked(&self, inner: &mut Inner<M>) -> Action {
        if inner.commit_scheduled {
            return Action::None;
        }
        inner.commit_scheduled = true;
        Action::Commit
    }

    /// Dispatch a decided action. Never called with the lock held.
    fn run_action(this: &Arc<Self>, action: Action) {
        match action {
            Action::None => {}
            Action::Rollback => {
                let shared = Arc::clone(this);
                this.dispatcher
                    .execute(Box::new(move || Shared::run_rollback(&shared)));
            }
            Action::Commit => {
                let shared = Arc::clone(this);
                this.dispatcher
                    .execute(Box::new(move || shared.run_commit()));
            }
        }
    }
}

/// Decorates a caller-supplied notifier to drive the controller's counters.
///
/// Guarantees the exactly-once invariant for its phase: the first terminal
/// signal wins, later ones are logged and dropped. Counter increments happen
/// under the state lock *before* the caller's notifier is invoked; the
/// transition's decided action is dispatched after.
struct DelegatingNotifier<M> {
    shared: Option<Arc<Shared<M>>>,
    phase: Phase,
    inner: Arc<dyn ResultNotifier>,
    fired: AtomicBool,
}

impl<M: Send + 'static> DelegatingNotifier<M> {
    fn counting(shared: Arc<Shared<M>>, phase: Phase, inner: Arc<dyn ResultNotifier>) -> Self {
        Self {
            shared: Some(shared),
            phase,
            inner,
            fired: AtomicBool::new(false),
        }
    }

    /// A phase-mapping wrapper that leaves the counters alone (local
    /// revert).
    fn uncounted(phase: Phase, inner: Arc<dyn ResultNotifier>) -> Self {
        Self {
            shared: None,
            phase,
            inner,
            fired: AtomicBool::new(false),
        }
    }

    /// Claim the single terminal signal for this tuple and phase.
    fn arm(&self, signal: &'static str) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            warn!(signal, "duplicate terminal signal dropped");
            return false;
        }
        true
    }

    fn record(&self, failed: bool) -> Action {
        match &self.shared {
            None => Action::None,
            Some(shared) => match self.phase {
                Phase::Forward => shared.record_updated(failed),
                Phase::Rollback => shared.record_rolled_back(),
            },
        }
    }

    fn finish(&self, action: Action) {
        if let Some(shared) = &self.shared {
            Shared::run_action(shared, action);
        }
    }

    fn unexpected(&self, signal: &'static str) {
        warn!(signal, "rollback signal received during forward phase; dropped");
    }
}

impl<M: Send + 'static> ResultNotifier for DelegatingNotifier<M> {
    fn handle_success(&self, result: Option<Value>) {
        if !self.arm("success") {
            return;
        }
        let action = self.record(false);
        match self.phase {
            Phase::Forward => self.inner.handle_success(result),
            Phase::Rollback => self.inner.handle_rollback_success(),
        }
        self.finish(action);
    }

    fn handle_failure(&self, cause: &UpdateFailedError) {
        if !self.arm("failure") {
            return;
        }
        let action = self.record(true);
        match self.phase {
            Phase::Forward => self.inner.handle_failure(cause),
            Phase::Rollback => self.inner.handle_rollback_failure(cause),
        }
        self.finish(action);
    }

    fn handle_cancellation(&self) {
        if !self.arm("cancellation") {
            return;
        }
        let action = self.record(false);
        match self.phase {
            Phase::Forward => self.inner.handle_cancellation(),
            Phase::Rollback => self.inner.handle_rollback_cancellation(),
        }
        self.finish(action);
    }

    fn handle_timeout(&self) {
        if !self.arm("timeout") {
            return;
        }
        // Timeout is failure-equivalent for transition purposes.
        let action = self.record(true);
        match self.phase {
            Phase::Forward => self.inner.handle_timeout(),
            Phase::Rollback => self.inner.handle_rollback_timeout(),
        }
        self.finish(action);
    }

    fn handle_rollback_success(&self) {
        match self.phase {
            Phase::Rollback => self.handle_success(None),
            Phase::Forward => self.unexpected("rollback_success"),
        }
    }

    fn handle_rollback_failure(&self, cause: &UpdateFailedError) {
        match self.phase {
            Phase::Rollback => self.handle_failure(cause),
            Phase::Forward => self.unexpected("rollback_failure"),
        }
    }

    fn handle_rollback_cancellation(&self) {
        match self.phase {
            Phase::Rollback => self.handle_cancellation(),
            Phase::Forward => self.unexpected("rollback_cancellation"),
        }
    }

    fn handle_rollback_timeout(&self) {
        match self.phase {
            Phase::Rollback => self.handle_timeout(),
            Phase::Forward => self.unexpected("rollback_timeout"),
        }
    }
}

/// Builder for creating an [`UpdateController`].
pub struct UpdateControllerBuilder<M> {
    model: Option<Arc<Mutex<M>>>,
    runtime: Option<Arc<dyn RuntimeApplier<M>>>,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    commit_handler: Option<Arc<dyn CommitHandler>>,
    options: ControllerOptions,
}

impl<M> fmt::Debug for UpdateControllerBuilder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateControllerBuilder")
            .field("model", &self.model.as_ref().map(|_| "..."))
            .field("runtime", &self.runtime.as_ref().map(|_| "..."))
            .field("dispatcher", &self.dispatcher.as_ref().map(|_| "..."))
            .field("commit_handler", &self.commit_handler.as_ref().map(|_| "..."))
            .field("options", &self.options)
            .finish()
    }
}

impl<M> Default for UpdateControllerBuilder<M> {
    fn default() -> Self {
        Self {
            model: None,
            runtime: None,
            dispatcher: None,
            commit_handler: None,
            options: ControllerOptions::default(),
        }
    }
}

impl<M: Send + 'static> UpdateControllerBuilder<M> {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model the updates apply to (required).
    ///
    /// The controller holds the `Arc` for the duration of the run; the
    /// caller keeps its own clone to read the model back afterwards.
    pub fn model(mut self, model: Arc<Mutex<M>>) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the runtime applier. Runtime updates are enabled only when an
    /// applier is supplied; without one, every model-level success is
    /// recorded as a synthetic completion.
    pub fn runtime(mut self, runtime: Arc<dyn RuntimeApplier<M>>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Set the dispatcher for rollback and commit handling (required).
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Set the commit handler (required).
    pub fn commit_handler(mut self, commit_handler: Arc<dyn CommitHandler>) -> Self {
        self.commit_handler = Some(commit_handler);
        self
    }

    /// Set the controller options.
    pub fn options(mut self, options: ControllerOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the controller.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> anyhow::Result<UpdateController<M>> {
        let model = self.model.ok_or_else(|| anyhow::anyhow!("model is required"))?;
        let dispatcher = self
            .dispatcher
            .ok_or_else(|| anyhow::anyhow!("dispatcher is required"))?;
        let commit_handler = self
            .commit_handler
            .ok_or_else(|| anyhow::anyhow!("commit handler is required"))?;

        Ok(UpdateController {
            shared: Arc::new(Shared {
                batch_id: Uuid::new_v4(),
                model,
                runtime: self.runtime,
                dispatcher,
                commit_handler,
                options: self.options,
                inner: Mutex::new(Inner {
                    status: ControllerStatus::Pending,
                    pending: Vec::new(),
                    update_count: 0,
                    rollbacks: VecDeque::new(),
                    updated_count: 0,
                    rolled_back_count: 0,
                    rollback_scheduled: false,
                    commit_scheduled: false,
                }),
            }),
        })
    }
}
