//! Recovery surface contract.
//!
//! When the coordinator lands in the stuck phase the UI renders a recovery
//! screen offering these actions; the report gives it enough to explain
//! what happened without exposing token material.

use std::time::Duration;

use serde::Serialize;

/// Actions the recovery surface can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Try one more token refresh with the stored artifacts.
    RetryRefresh,
    /// Wipe all local auth state and restart the lifecycle from scratch.
    ClearAndRestart,
}

/// Diagnostic snapshot for the recovery surface.
#[derive(Debug, Clone)]
pub struct StuckReport {
    /// How long the coordinator has been stuck.
    pub stuck_for: Duration,
    /// The last error message recorded, if any.
    pub last_error: Option<String>,
    /// Whether partial session artifacts are still persisted locally.
    pub has_partial_session: bool,
}
