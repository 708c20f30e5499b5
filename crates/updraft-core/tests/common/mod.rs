// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared test doubles for the controller integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};

use serde_json::{Value, json};

use updraft_core::controller::{CommitHandler, ControllerStatus};
use updraft_core::error::{InstallError, UpdateFailedError};
use updraft_core::notifier::ResultNotifier;
use updraft_core::runtime::{RuntimeApplier, RuntimeBatch};
use updraft_core::update::ModelUpdate;
use updraft_core::Dispatcher;

// ============================================================================
// Model
// ============================================================================

/// A flat attribute map standing in for the management model.
#[derive(Debug, Default)]
pub struct KvModel {
    values: HashMap<String, Value>,
}

impl KvModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

pub fn model() -> Arc<Mutex<KvModel>> {
    Arc::new(Mutex::new(KvModel::new()))
}

/// Install the fmt subscriber once per test binary so `RUST_LOG` controls
/// the controller's trace output during test runs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Updates
// ============================================================================

/// Sets one attribute; compensates by restoring the previous value (or
/// removing the key if it was absent).
pub struct SetAttr {
    name: String,
    key: String,
    value: Value,
}

impl SetAttr {
    pub fn new(key: &str, value: impl Into<Value>) -> Self {
        Self {
            name: format!("set-{key}"),
            key: key.to_string(),
            value: value.into(),
        }
    }
}

impl ModelUpdate<KvModel> for SetAttr {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, model: &mut KvModel) -> Result<(), UpdateFailedError> {
        model.set(&self.key, self.value.clone());
        Ok(())
    }

    fn compensating_update(&self, model: &KvModel) -> Option<Arc<dyn ModelUpdate<KvModel>>> {
        match model.get(&self.key) {
            Some(previous) => Some(Arc::new(SetAttr::new(&self.key, previous))),
            None => Some(Arc::new(RemoveAttr::new(&self.key))),
        }
    }
}

/// Removes one attribute; compensates by restoring the previous value, or
/// not at all if the key was already absent.
pub struct RemoveAttr {
    name: String,
    key: String,
}

impl RemoveAttr {
    pub fn new(key: &str) -> Self {
        Self {
            name: format!("remove-{key}"),
            key: key.to_string(),
        }
    }
}

impl ModelUpdate<KvModel> for RemoveAttr {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, model: &mut KvModel) -> Result<(), UpdateFailedError> {
        model.remove(&self.key);
        Ok(())
    }

    fn compensating_update(&self, model: &KvModel) -> Option<Arc<dyn ModelUpdate<KvModel>>> {
        model
            .get(&self.key)
            .map(|previous| Arc::new(SetAttr::new(&self.key, previous)) as Arc<dyn ModelUpdate<KvModel>>)
    }
}

/// Always fails at the model layer. With a `partial_key` it first writes
/// that key, simulating a half-applied mutation, and reports the failure as
/// partially applied with a compensation that removes the key.
pub struct FailingUpdate {
    name: String,
    partial_key: Option<String>,
}

impl FailingUpdate {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            partial_key: None,
        }
    }

    pub fn partial(name: &str, key: &str) -> Self {
        Self {
            name: name.to_string(),
            partial_key: Some(key.to_string()),
        }
    }
}

impl ModelUpdate<KvModel> for FailingUpdate {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, model: &mut KvModel) -> Result<(), UpdateFailedError> {
        match &self.partial_key {
            Some(key) => {
                model.set(key, json!(true));
                Err(UpdateFailedError::partial(&self.name, "rejected mid-apply"))
            }
            None => Err(UpdateFailedError::new(&self.name, "rejected")),
        }
    }

    fn compensating_update(&self, _model: &KvModel) -> Option<Arc<dyn ModelUpdate<KvModel>>> {
        self.partial_key
            .as_ref()
            .map(|key| Arc::new(RemoveAttr::new(key)) as Arc<dyn ModelUpdate<KvModel>>)
    }
}

/// Applies cleanly but its compensating update fails at the model layer.
pub struct BadCompUpdate {
    name: String,
    key: String,
}

impl BadCompUpdate {
    pub fn new(key: &str) -> Self {
        Self {
            name: format!("set-{key}"),
            key: key.to_string(),
        }
    }
}

impl ModelUpdate<KvModel> for BadCompUpdate {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, model: &mut KvModel) -> Result<(), UpdateFailedError> {
        model.set(&self.key, json!(true));
        Ok(())
    }

    fn compensating_update(&self, _model: &KvModel) -> Option<Arc<dyn ModelUpdate<KvModel>>> {
        Some(Arc::new(FailingUpdate::new(&format!("comp-{}", self.key))))
    }
}

// ============================================================================
// Runtime applier
// ============================================================================

struct RuntimeState {
    deferred: bool,
    fail_updates: Mutex<HashSet<String>>,
    fail_schedules: Mutex<HashSet<String>>,
    fail_installs: Mutex<HashSet<usize>>,
    seq: AtomicUsize,
    pending: Mutex<VecDeque<(String, Arc<dyn ResultNotifier>, Option<UpdateFailedError>)>>,
    installed: Mutex<Vec<Vec<String>>>,
}

/// A recording runtime applier.
///
/// In sync mode completions fire from inside `apply_update`; in deferred
/// mode they queue until the test calls [`complete_next`] or
/// [`complete_all`]. Batches are numbered in creation order (0 = forward,
/// 1 = first rollback), and installs can be made to fail per batch.
///
/// [`complete_next`]: RecordingRuntime::complete_next
/// [`complete_all`]: RecordingRuntime::complete_all
#[derive(Clone)]
pub struct RecordingRuntime {
    state: Arc<RuntimeState>,
}

impl RecordingRuntime {
    fn new(deferred: bool) -> Self {
        Self {
            state: Arc::new(RuntimeState {
                deferred,
                fail_updates: Mutex::new(HashSet::new()),
                fail_schedules: Mutex::new(HashSet::new()),
                fail_installs: Mutex::new(HashSet::new()),
                seq: AtomicUsize::new(0),
                pending: Mutex::new(VecDeque::new()),
                installed: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn sync() -> Self {
        Self::new(false)
    }

    pub fn deferred() -> Self {
        Self::new(true)
    }

    /// Make the named update's runtime completion report failure.
    pub fn fail_update(&self, name: &str) {
        self.state.fail_updates.lock().unwrap().insert(name.to_string());
    }

    /// Make `apply_update` reject the named update outright.
    pub fn fail_schedule(&self, name: &str) {
        self.state.fail_schedules.lock().unwrap().insert(name.to_string());
    }

    /// Make the install of the given batch (by creation order) fail.
    pub fn fail_install(&self, batch_index: usize) {
        self.state.fail_installs.lock().unwrap().insert(batch_index);
    }

    /// Deliver the oldest pending completion. Returns false when none are
    /// queued.
    pub fn complete_next(&self) -> bool {
        let next = self.state.pending.lock().unwrap().pop_front();
        match next {
            None => false,
            Some((name, notifier, outcome)) => {
                match outcome {
                    Some(cause) => notifier.handle_failure(&cause),
                    None => notifier.handle_success(Some(json!({ "applied": name }))),
                }
                true
            }
        }
    }

    /// Deliver every pending completion in order.
    pub fn complete_all(&self) {
        while self.complete_next() {}
    }

    pub fn pending_count(&self) -> usize {
        self.state.pending.lock().unwrap().len()
    }

    /// Update names per installed batch, in install order.
    pub fn installed_batches(&self) -> Vec<Vec<String>> {
        self.state.installed.lock().unwrap().clone()
    }
}

impl RuntimeApplier<KvModel> for RecordingRuntime {
    fn new_batch(&self) -> Box<dyn RuntimeBatch<KvModel>> {
        Box::new(RecordingBatch {
            state: Arc::clone(&self.state),
            seq: self.state.seq.fetch_add(1, Ordering::SeqCst),
            entries: Vec::new(),
        })
    }
}

struct RecordingBatch {
    state: Arc<RuntimeState>,
    seq: usize,
    entries: Vec<String>,
}

impl RuntimeBatch<KvModel> for RecordingBatch {
    fn apply_update(
        &mut self,
        update: Arc<dyn ModelUpdate<KvModel>>,
        notifier: Arc<dyn ResultNotifier>,
    ) -> anyhow::Result<()> {
        let name = update.name().to_string();
        if self.state.fail_schedules.lock().unwrap().contains(&name) {
            anyhow::bail!("runtime rejected '{name}'");
        }
        self.entries.push(name.clone());

        let outcome = if self.state.fail_updates.lock().unwrap().contains(&name) {
            Some(UpdateFailedError::new(&name, "runtime application failed"))
        } else {
            None
        };

        if self.state.deferred {
            self.state
                .pending
                .lock()
                .unwrap()
                .push_back((name, notifier, outcome));
        } else {
            match outcome {
                Some(cause) => notifier.handle_failure(&cause),
                None => notifier.handle_success(Some(json!({ "applied": name }))),
            }
        }
        Ok(())
    }

    fn install(self: Box<Self>) -> Result<(), InstallError> {
        self.state.installed.lock().unwrap().push(self.entries.clone());
        if self.state.fail_installs.lock().unwrap().contains(&self.seq) {
            return Err(InstallError::from(anyhow::anyhow!(
                "install rejected for batch {}",
                self.seq
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Dispatch and commit capture
// ============================================================================

/// Dispatcher that queues jobs until the test drains them. Gives the tests
/// the real "rollback and commit run after the forward pass" ordering
/// without threads.
#[derive(Clone, Default)]
pub struct QueueDispatcher {
    jobs: Arc<Mutex<VecDeque<Box<dyn FnOnce() + Send + 'static>>>>,
}

impl QueueDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run queued jobs (and any they queue in turn) until none remain.
    pub fn drain(&self) {
        loop {
            let job = self.jobs.lock().unwrap().pop_front();
            match job {
                Some(job) => job(),
                None => break,
            }
        }
    }
}

impl Dispatcher for QueueDispatcher {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        self.jobs.lock().unwrap().push_back(job);
    }
}

/// Commit handler that records every invocation, optionally signalling a
/// channel for cross-thread tests.
pub struct CommitRecorder {
    calls: Mutex<Vec<ControllerStatus>>,
    tx: Mutex<Option<mpsc::Sender<ControllerStatus>>>,
}

impl CommitRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            tx: Mutex::new(None),
        })
    }

    pub fn with_channel() -> (Arc<Self>, mpsc::Receiver<ControllerStatus>) {
        let (tx, rx) = mpsc::channel();
        let commits = Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            tx: Mutex::new(Some(tx)),
        });
        (commits, rx)
    }

    pub fn calls(&self) -> Vec<ControllerStatus> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommitHandler for CommitRecorder {
    fn handle_update_commit(&self, prior_status: ControllerStatus) {
        self.calls.lock().unwrap().push(prior_status);
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(prior_status);
        }
    }
}
