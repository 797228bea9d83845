//! Single-flight token refresh with cooldown and bounded retries.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use auth_vault::{SessionArtifacts, StoredSession};
use deadline_guard::{with_deadline, DeadlineOutcome};
use identity_gateway::{AuthError, IdentityGateway, Session};
use tracing::{debug, warn};

use crate::config::CoordinatorConfig;

/// Why a refresh attempt was not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another refresh is already in flight.
    InFlight,
    /// The previous attempt started too recently.
    Cooldown,
}

/// Result of a refresh request.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// A fresh session was obtained and persisted.
    Refreshed(Session),
    /// No attempt was made.
    Skipped(SkipReason),
    /// The attempt failed but the budget is not exhausted; current state
    /// stands and a later attempt may succeed.
    Failed(String),
    /// Consecutive failures hit the budget; all local artifacts were
    /// cleared and the session is invalid.
    Exhausted,
}

/// Serializes refresh attempts against the gateway.
///
/// Concurrent callers collapse into one attempt; a cooldown keeps distinct
/// triggers (expiry timer, manual refresh, recovery) from hammering the
/// provider; consecutive failures are budgeted, and hitting the budget
/// invalidates the local session rather than retrying forever.
pub(crate) struct RefreshCoordinator {
    gateway: Arc<dyn IdentityGateway>,
    artifacts: SessionArtifacts,
    config: CoordinatorConfig,
    in_flight: AtomicBool,
    last_attempt: Mutex<Option<Instant>>,
    failures: AtomicU32,
}

impl RefreshCoordinator {
    pub fn new(
        gateway: Arc<dyn IdentityGateway>,
        artifacts: SessionArtifacts,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            gateway,
            artifacts,
            config,
            in_flight: AtomicBool::new(false),
            last_attempt: Mutex::new(None),
            failures: AtomicU32::new(0),
        }
    }

    /// Runs one refresh attempt, unless one is in flight or too recent.
    pub async fn refresh(&self) -> RefreshOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return RefreshOutcome::Skipped(SkipReason::InFlight);
        }

        {
            let mut last = self.last_attempt.lock().expect("lock poisoned");
            if let Some(at) = *last {
                if at.elapsed() < self.config.refresh_cooldown {
                    self.in_flight.store(false, Ordering::SeqCst);
                    return RefreshOutcome::Skipped(SkipReason::Cooldown);
                }
            }
            *last = Some(Instant::now());
        }

        let outcome = self.attempt().await;
        self.in_flight.store(false, Ordering::SeqCst);
        outcome
    }

    async fn attempt(&self) -> RefreshOutcome {
        debug!("refreshing session");
        match with_deadline(
            self.gateway.refresh_session(),
            self.config.refresh_deadline,
            "token-refresh",
        )
        .await
        {
            DeadlineOutcome::Completed(Ok(session)) => {
                self.failures.store(0, Ordering::SeqCst);
                if let Err(err) = self.artifacts.store(&stored_from(&session)) {
                    warn!(error = %err, "failed to persist refreshed session");
                }
                RefreshOutcome::Refreshed(session)
            }
            DeadlineOutcome::Completed(Err(err)) => {
                // A rejected refresh token will never start working again.
                if matches!(err, AuthError::ExpiredOrInvalidToken(_)) {
                    self.clear_artifacts();
                }
                self.record_failure(err.to_string())
            }
            DeadlineOutcome::TimedOut => {
                // A timed-out exchange may have rotated the refresh token
                // server-side; the stored one is untrustworthy.
                self.clear_artifacts();
                self.record_failure("token refresh timed out".to_string())
            }
        }
    }

    fn record_failure(&self, message: String) -> RefreshOutcome {
        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.config.max_refresh_attempts {
            warn!(failures, "refresh budget exhausted; invalidating session");
            self.failures.store(0, Ordering::SeqCst);
            self.clear_artifacts();
            RefreshOutcome::Exhausted
        } else {
            warn!(failures, message = %message, "refresh attempt failed");
            RefreshOutcome::Failed(message)
        }
    }

    fn clear_artifacts(&self) {
        if let Err(err) = self.artifacts.clear() {
            warn!(error = %err, "failed to clear session artifacts");
        }
    }

    /// Forgets accumulated failures, e.g. after an explicit local reset.
    pub fn reset(&self) {
        self.failures.store(0, Ordering::SeqCst);
        let mut last = self.last_attempt.lock().expect("lock poisoned");
        *last = None;
    }

    #[cfg(test)]
    fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}

/// Projects a gateway session onto the persisted artifact shape.
pub(crate) fn stored_from(session: &Session) -> StoredSession {
    StoredSession {
        access_token: session.access_token.clone(),
        refresh_token: session.refresh_token.clone(),
        user_id: session.user.id.clone(),
        email: Some(session.user.email.clone()),
        expires_at: session.expires_at,
    }
}
