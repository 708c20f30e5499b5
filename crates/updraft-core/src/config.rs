// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-controller options, with environment-variable defaults.

/// Options governing one controller run.
#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    /// Whether a failed update may trigger a rollback of the whole batch.
    ///
    /// When false, a failure is reported through the notifiers but the
    /// updates that succeeded stay applied and the run ends committed.
    pub allow_overall_rollback: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            allow_overall_rollback: true,
        }
    }
}

impl ControllerOptions {
    /// Create options with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether a failure rolls back the whole batch.
    pub fn with_allow_overall_rollback(mut self, allow: bool) -> Self {
        self.allow_overall_rollback = allow;
        self
    }

    /// Load option defaults from environment variables.
    ///
    /// Optional (with defaults):
    /// - `UPDRAFT_OVERALL_ROLLBACK`: `true` or `false` (default: `true`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let allow_overall_rollback: bool = std::env::var("UPDRAFT_OVERALL_ROLLBACK")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("UPDRAFT_OVERALL_ROLLBACK", "must be 'true' or 'false'")
            })?;

        Ok(Self {
            allow_overall_rollback,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
