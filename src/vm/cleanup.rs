//! Best-effort cleanup reporting.
//!
//! `destroy` is not allowed to fail halfway and leave a registered domain
//! behind, so cleanup errors are collected instead of propagated. The
//! report distinguishes full success from partial success with warnings.

use serde::{Deserialize, Serialize};

/// Outcome of a best-effort cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStatus {
    /// Every cleanup step succeeded.
    Clean,
    /// Some steps failed; see the warnings.
    Partial,
    /// No cleanup step succeeded.
    Failed,
}

/// Result of a `destroy` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    steps: usize,
    failures: usize,
    warnings: Vec<String>,
}

impl CleanupReport {
    /// Start an empty report.
    pub fn new() -> Self {
        Self {
            steps: 0,
            failures: 0,
            warnings: Vec::new(),
        }
    }

    /// Record a cleanup step that succeeded.
    pub fn succeeded(&mut self) {
        self.steps += 1;
    }

    /// Record a cleanup step that failed, with a warning message.
    pub fn failed(&mut self, warning: impl Into<String>) {
        self.steps += 1;
        self.failures += 1;
        self.warnings.push(warning.into());
    }

    /// Overall outcome.
    pub fn status(&self) -> CleanupStatus {
        if self.failures == 0 {
            CleanupStatus::Clean
        } else if self.failures < self.steps {
            CleanupStatus::Partial
        } else {
            CleanupStatus::Failed
        }
    }

    /// Warnings collected from failed steps.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// True when every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

impl Default for CleanupReport {
    fn default() -> Self {
        Self::new()
    }
}
