// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Updraft Core - Transactional Batch Update Coordination
//!
//! This crate coordinates a batch of configuration/runtime changes applied
//! against an in-memory model and a live service graph. Updates are applied
//! in insertion order; on any failure the already-applied updates are walked
//! back in reverse order via their compensating updates, with partial
//! completion, cancellation, and asynchronous result delivery tracked per
//! update.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Caller                                │
//! │        (management layer: builds updates, owns the model)        │
//! └──────────────────────────────────────────────────────────────────┘
//!        │ add_update(update, notifier)           ▲ commit handler,
//!        │ execute_updates()                      │ notifier callbacks
//!        ▼                                        │
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       UpdateController                           │
//! │     forward pass → (failure?) → rollback pass → commit           │
//! └──────────────────────────────────────────────────────────────────┘
//!        │ apply /                │ apply_update,        │ rollback +
//!        │ compensating_update    │ install (atomic)     │ commit jobs
//!        ▼                        ▼                      ▼
//! ┌──────────────┐      ┌──────────────────┐      ┌──────────────┐
//! │    Model     │      │  RuntimeApplier  │      │  Dispatcher  │
//! │ (Arc<Mutex>) │      │  (service graph) │      │   (tokio)    │
//! └──────────────┘      └──────────────────┘      └──────────────┘
//! ```
//!
//! # Lifecycle
//!
//! | Operation | Legal from | Effect |
//! |-----------|-----------|--------|
//! | `add_update` | `Pending` | queue one update with its notifier |
//! | `execute_updates` | `Pending` | run the forward pass; returns after initiation |
//! | `status` / `summary` | any | observe progress |
//!
//! Each update's outcome is delivered through its
//! [`ResultNotifier`](notifier::ResultNotifier): exactly one of the four
//! forward signals (success, failure, cancellation, timeout) fires per
//! update, and exactly one of the four rollback signals if the update
//! participates in a rollback. The caller-supplied
//! [`CommitHandler`](controller::CommitHandler) fires exactly once per run,
//! on the injected dispatcher, never on the caller's thread.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::{Arc, Mutex};
//! use updraft_core::{
//!     ControllerStatus, DirectDispatcher, EventLog, RecordingNotifier, UpdateController,
//! };
//!
//! let model = Arc::new(Mutex::new(MyModel::default()));
//! let controller = UpdateController::builder()
//!     .model(Arc::clone(&model))
//!     .runtime(Arc::new(MyRuntime::new()))
//!     .dispatcher(Arc::new(DirectDispatcher))
//!     .commit_handler(Arc::new(|prior: ControllerStatus| {
//!         println!("batch finished, prior status {prior}");
//!     }))
//!     .build()?;
//!
//! let log = EventLog::new();
//! controller.add_update(
//!     Arc::new(SetAttr::new("a", 1)),
//!     Arc::new(RecordingNotifier::new("a", log.clone())),
//! )?;
//! controller.execute_updates()?;
//! ```
//!
//! # Modules
//!
//! - [`config`]: Per-controller options with environment-variable defaults
//! - [`controller`]: The batch update controller and its state machine
//! - [`dispatch`]: Deferred execution contexts for rollback/commit handling
//! - [`error`]: Model, runtime, and API-misuse error types
//! - [`notifier`]: Per-update result callback contract
//! - [`report`]: Serializable outcome records and batch summaries
//! - [`runtime`]: Runtime applier and atomic batch contract
//! - [`update`]: The update/compensation contract

#![deny(missing_docs)]

/// Per-controller options, with environment-variable defaults.
pub mod config;

/// The batch update controller: state machine, forward pass, rollback pass.
pub mod controller;

/// Deferred execution contexts for rollback and commit handling.
pub mod dispatch;

/// Error types for model application, runtime install, and API misuse.
pub mod error;

/// Per-update result callbacks.
pub mod notifier;

/// Serializable outcome records for a controller run.
pub mod report;

/// Runtime applier and atomic batch contract.
pub mod runtime;

/// The update contract: one described change plus its compensation.
pub mod update;

pub use config::{ConfigError, ControllerOptions};
pub use controller::{
    CommitHandler, ControllerStatus, UpdateController, UpdateControllerBuilder,
};
pub use dispatch::{DirectDispatcher, Dispatcher, TokioDispatcher};
pub use error::{ControllerError, InstallError, Result, UpdateFailedError};
pub use notifier::{NoopNotifier, ResultNotifier};
pub use report::{BatchSummary, EventLog, RecordingNotifier, UpdateEvent, UpdateSignal};
pub use runtime::{RuntimeApplier, RuntimeBatch};
pub use update::ModelUpdate;
