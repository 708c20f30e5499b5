// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deferred execution context for rollback and commit handling.
//!
//! The controller never runs the rollback pass or the commit handler on the
//! thread that discovered the triggering condition; both are handed to a
//! [`Dispatcher`]. This keeps user notifier callbacks from re-entering the
//! controller while it is mid-transition.

use tokio::runtime::Handle;

/// A deferred execution context.
///
/// Jobs are synchronous closures; implementations decide where they run.
pub trait Dispatcher: Send + Sync {
    /// Run `job` on this dispatcher's execution context.
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>);
}

/// Dispatcher backed by a tokio runtime.
///
/// Jobs are synchronous (they walk the model and call user notifiers), so
/// they are run on tokio's blocking pool rather than a core worker.
#[derive(Debug, Clone)]
pub struct TokioDispatcher {
    handle: Handle,
}

impl TokioDispatcher {
    /// Create a dispatcher for the given runtime handle.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Create a dispatcher for the ambient runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime context.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Dispatcher for TokioDispatcher {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        let _ = self.handle.spawn_blocking(job);
    }
}

/// Dispatcher that runs jobs inline on the calling thread.
///
/// Intended for embedding without a runtime and for deterministic tests.
/// Note that with inline dispatch a rollback triggered from inside the
/// forward pass runs before the forward pass has finished; deployments that
/// care about that ordering should use [`TokioDispatcher`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDispatcher;

impl Dispatcher for DirectDispatcher {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        job();
    }
}
