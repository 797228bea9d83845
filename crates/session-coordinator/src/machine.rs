//! The session state machine.
//!
//! One coordinator owns the authenticated identity for the whole client.
//! It reconciles two sources that can disagree and both hang:
//! - push: the gateway's auth event stream
//! - pull: an explicit session retrieval at startup
//!
//! Every remote wait is deadline-bounded, every settle is forced by a
//! watchdog if the bounds fail, and a stale resolution can never overwrite
//! a newer decision thanks to a generation counter bumped on sign-out and
//! reset.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use auth_vault::{AuthVault, SessionArtifacts};
use chrono::Utc;
use deadline_guard::{with_deadline, DeadlineOutcome};
use identity_gateway::{AuthError, AuthEventKind, IdentityGateway, Session};
use profile_resolver::{ProfileResolver, ProfileStore, ProfileUpdate, User};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::debounce::{BurstLevel, EventDebouncer};
use crate::recovery::{RecoveryAction, StuckReport};
use crate::refresh::{stored_from, RefreshCoordinator, RefreshOutcome};
use crate::state::{SessionPhase, SessionState, StateCell};

/// The session coordinator.
///
/// Construct once, call [`SessionCoordinator::start`], and observe state
/// through the watch channel. All mutating entry points funnel through
/// here; nothing else writes session state.
pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    gateway: Arc<dyn IdentityGateway>,
    resolver: ProfileResolver,
    artifacts: SessionArtifacts,
    refresher: RefreshCoordinator,
    config: CoordinatorConfig,
    state: StateCell,
    /// Bumped on sign-out and reset; resolutions carry the value they
    /// started under and are discarded if it moved.
    generation: AtomicU64,
    /// One-shot: whichever of push and pull settles initial state first
    /// wins, the loser's result is discarded.
    initial_handled: AtomicBool,
    /// Latched on a detected event loop; automatic processing of
    /// session-bearing events stays off until a recovery action clears it.
    loop_detected: AtomicBool,
    started: AtomicBool,
    alive: AtomicBool,
    debouncer: Mutex<EventDebouncer>,
    stuck_since: Mutex<Option<Instant>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionCoordinator {
    /// Wires the coordinator to its collaborators. Nothing runs until
    /// [`SessionCoordinator::start`].
    pub fn new(
        gateway: Arc<dyn IdentityGateway>,
        profile_store: Arc<dyn ProfileStore>,
        vault: Arc<dyn AuthVault>,
        config: CoordinatorConfig,
    ) -> Self {
        let artifacts = SessionArtifacts::new(vault);
        let resolver = ProfileResolver::with_deadline(profile_store, config.profile_deadline);
        let refresher =
            RefreshCoordinator::new(gateway.clone(), artifacts.clone(), config.clone());
        let debouncer = EventDebouncer::new(&config);
        Self {
            inner: Arc::new(Inner {
                gateway,
                resolver,
                artifacts,
                refresher,
                config,
                state: StateCell::new(),
                generation: AtomicU64::new(0),
                initial_handled: AtomicBool::new(false),
                loop_detected: AtomicBool::new(false),
                started: AtomicBool::new(false),
                alive: AtomicBool::new(true),
                debouncer: Mutex::new(debouncer),
                stuck_since: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Starts the background machinery: the push listener, the initial
    /// pull check, the expiry timer, and the watchdog.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            warn!("session coordinator already started");
            return;
        }
        info!("starting session coordinator");
        self.inner.state.update(|s| {
            s.phase = SessionPhase::Checking;
            s.is_loading = true;
        });

        let mut tasks = self.inner.tasks.lock().expect("lock poisoned");
        tasks.push(tokio::spawn(run_listener(self.inner.clone())));
        tasks.push(tokio::spawn(run_initial_check(self.inner.clone())));
        tasks.push(tokio::spawn(run_expiry_timer(self.inner.clone())));
        tasks.push(tokio::spawn(run_watchdog(self.inner.clone())));
    }

    /// Subscribes to state snapshots.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// The current state snapshot.
    pub fn current_state(&self) -> SessionState {
        self.inner.state.snapshot()
    }

    /// Signs in with email and password.
    ///
    /// Returns whether the credentials were accepted. State settles through
    /// the push event the gateway publishes on success; on failure the
    /// error message lands in the state for the UI.
    pub async fn sign_in(&self, email: &str, password: &str) -> bool {
        self.inner.state.update(|s| {
            s.phase = SessionPhase::Checking;
            s.is_loading = true;
            s.error = None;
        });
        match self.inner.gateway.sign_in_with_password(email, password).await {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "sign-in failed");
                self.inner.settle_sign_in_failure(&err);
                false
            }
        }
    }

    /// Creates an account, attaching the display name (and agency name,
    /// when already known) to the identity record so the resolver can use
    /// them before a profile row exists.
    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
        agency_name: Option<&str>,
    ) -> bool {
        self.inner.state.update(|s| {
            s.phase = SessionPhase::Checking;
            s.is_loading = true;
            s.error = None;
        });
        let mut metadata = std::collections::HashMap::new();
        metadata.insert(
            "full_name".to_string(),
            serde_json::Value::String(name.to_string()),
        );
        if let Some(agency) = agency_name {
            metadata.insert(
                "agency_name".to_string(),
                serde_json::Value::String(agency.to_string()),
            );
        }
        match self.inner.gateway.sign_up(email, password, metadata).await {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "sign-up failed");
                self.inner.settle_sign_in_failure(&err);
                false
            }
        }
    }

    /// Signs out.
    ///
    /// Local state is destroyed unconditionally; a failing remote call is
    /// logged but never blocks the local sign-out.
    pub async fn sign_out(&self) {
        info!("signing out");
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.initial_handled.store(true, Ordering::SeqCst);
        if let Err(err) = self.inner.artifacts.clear() {
            warn!(error = %err, "failed to clear session artifacts on sign-out");
        }
        if let Err(err) = self.inner.gateway.sign_out().await {
            warn!(error = %err, "remote sign-out failed; local state cleared anyway");
        }
        self.inner.settle_unauthenticated(None);
    }

    /// Requests a token refresh and returns the resolved user on success.
    ///
    /// `None` means the attempt was skipped, failed, or its result was
    /// superseded by a concurrent sign-out.
    pub async fn refresh_session(&self) -> Option<User> {
        self.inner.refresh_and_apply().await
    }

    /// Records onboarding completion.
    ///
    /// Local state updates first so routing reacts immediately; the remote
    /// write follows and a failure is reported but never rolls the local
    /// value back. The next sign-in re-reads the profile row and
    /// reconciles.
    pub async fn update_setup_status(&self, completed: bool) -> bool {
        let Some(current) = self.inner.state.snapshot().user else {
            warn!("update_setup_status called with no signed-in user");
            return false;
        };
        let mut updated = current.clone();
        updated.setup_completed = completed;
        self.inner.state.update(move |s| s.user = Some(updated));

        let update = ProfileUpdate {
            setup_completed: Some(completed),
            ..ProfileUpdate::default()
        };
        match self.inner.resolver.store().update(&current.id, update).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "persisting setup status failed; keeping local value");
                false
            }
        }
    }

    /// Runs a recovery action. Safe to invoke repeatedly.
    pub async fn recover(&self, action: RecoveryAction) -> bool {
        // Any recovery action re-arms automatic event processing.
        self.inner.loop_detected.store(false, Ordering::SeqCst);
        match action {
            RecoveryAction::RetryRefresh => {
                info!("recovery: retrying token refresh");
                self.inner
                    .state
                    .update(|s| s.phase = SessionPhase::Recovering);
                let recovered = self.inner.refresh_and_apply().await.is_some();
                if !recovered {
                    // Unless the failure already settled somewhere definitive,
                    // fall back to stuck so the recovery surface stays up.
                    self.inner.state.update(|s| {
                        if s.phase == SessionPhase::Recovering {
                            s.phase = SessionPhase::Stuck;
                        }
                    });
                }
                recovered
            }
            RecoveryAction::ClearAndRestart => {
                info!("recovery: clearing local auth state and restarting");
                self.inner.clear_and_restart().await;
                true
            }
        }
    }

    /// Diagnostics for the recovery surface; `None` unless stuck.
    pub fn stuck_report(&self) -> Option<StuckReport> {
        let snapshot = self.inner.state.snapshot();
        if snapshot.phase != SessionPhase::Stuck {
            return None;
        }
        let stuck_for = self
            .inner
            .stuck_since
            .lock()
            .expect("lock poisoned")
            .map(|at| at.elapsed())
            .unwrap_or_default();
        Some(StuckReport {
            stuck_for,
            last_error: snapshot.error,
            has_partial_session: self.inner.artifacts.has_session().unwrap_or(false),
        })
    }

    /// Stops all background tasks. Idempotent.
    pub fn shutdown(&self) {
        if !self.inner.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!("shutting down session coordinator");
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let mut tasks = self.inner.tasks.lock().expect("lock poisoned");
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    /// Resolves a confirmed session into a user and publishes it, unless
    /// the generation moved while resolving.
    async fn resolve_session(self: &Arc<Self>, session: Session, generation: u64) {
        let user = self.resolver.resolve(&session.user).await;
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(user_id = %user.id, "discarding stale session resolution");
            return;
        }
        if let Err(err) = self.artifacts.store(&stored_from(&session)) {
            warn!(error = %err, "failed to persist session artifacts");
        }
        self.clear_stuck();
        self.state.update(move |s| {
            s.phase = SessionPhase::Authenticated;
            s.user = Some(user);
            s.is_loading = false;
            s.session_checked = true;
            s.error = None;
        });
    }

    /// Applies a debounced repeat's session without a second profile
    /// fetch: the newest token material is persisted and the published
    /// user is rebuilt from the event's identity record, keeping
    /// profile-derived fields when the identity is unchanged.
    fn coalesce_session(&self, session: Session) {
        let current = self.state.snapshot();
        let Some(current_user) = current.user else {
            // Nothing settled yet; the in-flight resolution publishes.
            return;
        };
        if let Err(err) = self.artifacts.store(&stored_from(&session)) {
            warn!(error = %err, "failed to persist coalesced session artifacts");
        }
        let replacement = User::fallback(&session.user);
        let user = if current_user.id == replacement.id {
            User {
                setup_completed: current_user.setup_completed,
                agency_name: replacement
                    .agency_name
                    .clone()
                    .or(current_user.agency_name),
                ..replacement
            }
        } else {
            replacement
        };
        self.clear_stuck();
        self.state.update(move |s| {
            s.phase = SessionPhase::Authenticated;
            s.user = Some(user);
            s.is_loading = false;
            s.session_checked = true;
            s.error = None;
        });
    }

    fn settle_unauthenticated(&self, error: Option<String>) {
        self.clear_stuck();
        self.state.update(move |s| {
            s.phase = SessionPhase::Unauthenticated;
            s.user = None;
            s.is_loading = false;
            s.session_checked = true;
            s.error = error;
        });
    }

    fn settle_sign_in_failure(&self, err: &AuthError) {
        let message = match err {
            AuthError::InvalidCredentials(_) => "Invalid email or password.".to_string(),
            AuthError::NetworkOrTimeout(_) => {
                "Could not reach the sign-in service. Check your connection and try again."
                    .to_string()
            }
            other => format!("Sign-in failed: {other}"),
        };
        self.settle_unauthenticated(Some(message));
    }

    fn enter_stuck(&self, reason: &str) {
        warn!(reason, "entering stuck state");
        self.stuck_since
            .lock()
            .expect("lock poisoned")
            .get_or_insert_with(Instant::now);
        let reason = reason.to_string();
        self.state.update(move |s| {
            s.phase = SessionPhase::Stuck;
            s.is_loading = false;
            s.session_checked = true;
            s.error = Some(reason);
        });
    }

    fn clear_stuck(&self) {
        let mut since = self.stuck_since.lock().expect("lock poisoned");
        *since = None;
    }

    /// Runs one refresh and applies the outcome to the state.
    async fn refresh_and_apply(self: &Arc<Self>) -> Option<User> {
        let previous = self.state.snapshot();
        self.state.update(|s| {
            s.phase = SessionPhase::Refreshing;
            s.is_loading = true;
        });
        let generation = self.generation.load(Ordering::SeqCst);
        match self.refresher.refresh().await {
            RefreshOutcome::Refreshed(session) => {
                if self.generation.load(Ordering::SeqCst) != generation {
                    // A sign-out won the race; the refresher already
                    // persisted the new session, take that back too.
                    debug!("sign-out superseded refresh; discarding refreshed session");
                    if let Err(err) = self.artifacts.clear() {
                        warn!(error = %err, "failed to clear superseded session artifacts");
                    }
                    return None;
                }
                self.resolve_session(session, generation).await;
                self.state.snapshot().user
            }
            RefreshOutcome::Skipped(reason) => {
                debug!(?reason, "refresh skipped");
                // Restore only if nothing else settled the state while the
                // attempt was pending; a listener resolution outranks the
                // stale snapshot.
                self.state.update(move |s| {
                    if s.phase == SessionPhase::Refreshing {
                        s.phase = previous.phase;
                        s.is_loading = previous.is_loading;
                    }
                });
                None
            }
            RefreshOutcome::Failed(message) => {
                // Budget not exhausted: the current session may still be
                // usable, so keep it and let a later attempt retry.
                debug!(message = %message, "refresh failed; keeping current state");
                self.state.update(move |s| {
                    if s.phase == SessionPhase::Refreshing {
                        s.phase = previous.phase;
                        s.is_loading = false;
                        s.session_checked = true;
                    }
                });
                None
            }
            RefreshOutcome::Exhausted => {
                self.generation.fetch_add(1, Ordering::SeqCst);
                self.settle_unauthenticated(Some(
                    "Your session expired. Please sign in again.".to_string(),
                ));
                None
            }
        }
    }

    /// Wipes local auth state and restarts the lifecycle from scratch.
    ///
    /// The manual-clear flag suppresses the push listener for the
    /// duration, so the gateway's own sign-out event cannot race the
    /// reset.
    async fn clear_and_restart(self: &Arc<Self>) {
        if let Err(err) = self.artifacts.begin_manual_clear() {
            warn!(error = %err, "failed to raise manual-clear flag");
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Err(err) = self.artifacts.clear() {
            warn!(error = %err, "failed to clear session artifacts");
        }
        if let Err(err) = self.gateway.sign_out().await {
            debug!(error = %err, "remote sign-out during reset failed; continuing");
        }
        self.refresher.reset();
        self.clear_stuck();
        self.initial_handled.store(false, Ordering::SeqCst);
        *self.debouncer.lock().expect("lock poisoned") = EventDebouncer::new(&self.config);

        // The one place session_checked is allowed to drop: this is a new
        // lifecycle, not a regression within the old one.
        self.state.reset();
        if let Err(err) = self.artifacts.end_manual_clear() {
            warn!(error = %err, "failed to drop manual-clear flag");
        }

        self.state.update(|s| {
            s.phase = SessionPhase::Checking;
            s.is_loading = true;
        });
        let task = tokio::spawn(run_initial_check(self.clone()));
        let mut tasks = self.tasks.lock().expect("lock poisoned");
        // Repeated restarts must not accumulate finished handles.
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    fn force_settle_loading(&self) {
        self.state.update(|s| {
            s.session_checked = true;
            s.is_loading = false;
            if s.user.is_none() && s.phase != SessionPhase::Stuck {
                s.phase = SessionPhase::Unauthenticated;
            }
        });
    }
}

/// Push path: drains the gateway's auth event stream.
async fn run_listener(inner: Arc<Inner>) {
    let mut subscription = inner.gateway.subscribe();
    while let Some(note) = subscription.next().await {
        if !inner.alive.load(Ordering::SeqCst) {
            break;
        }
        if inner.artifacts.manual_clear_in_progress() {
            debug!(kind = ?note.kind, "manual clear in progress; ignoring auth event");
            continue;
        }

        // Sign-out always wins, ahead of any debouncing.
        if note.kind == AuthEventKind::SignedOut {
            inner.generation.fetch_add(1, Ordering::SeqCst);
            inner.initial_handled.store(true, Ordering::SeqCst);
            if let Err(err) = inner.artifacts.clear() {
                warn!(error = %err, "failed to clear session artifacts on signed-out event");
            }
            inner.settle_unauthenticated(None);
            continue;
        }

        // Once a loop is detected nothing is processed automatically
        // until a recovery action clears the latch.
        if inner.loop_detected.load(Ordering::SeqCst) {
            debug!(kind = ?note.kind, "auth event ignored; loop latch set until recovery");
            continue;
        }

        let now = Instant::now();
        let (suppress, level) = {
            let mut debouncer = inner.debouncer.lock().expect("lock poisoned");
            let suppress = debouncer.observe(note.kind, now);
            (suppress, debouncer.burst_level(now))
        };
        match level {
            BurstLevel::LoopDetected => {
                if !inner.loop_detected.swap(true, Ordering::SeqCst) {
                    let err = AuthError::RefreshLoopDetected(
                        "too many auth events in a short period".to_string(),
                    );
                    warn!("auth event loop detected; latching until manual recovery");
                    inner.state.update(move |s| {
                        s.session_checked = true;
                        s.is_loading = false;
                        s.error = Some(err.to_string());
                    });
                }
                continue;
            }
            BurstLevel::Elevated => {
                warn!("elevated auth event rate; force-settling loading flags");
                inner.force_settle_loading();
            }
            BurstLevel::Normal => {}
        }
        if suppress {
            // A debounced repeat still carries the newest token material;
            // fold it in so the settled state reflects the last event.
            if let Some(session) = note.session {
                debug!(kind = ?note.kind, "duplicate auth event coalesced");
                inner.coalesce_session(session);
            } else {
                debug!(kind = ?note.kind, "duplicate auth event suppressed");
            }
            continue;
        }

        match note.session {
            Some(session) => {
                inner.initial_handled.store(true, Ordering::SeqCst);
                let generation = inner.generation.load(Ordering::SeqCst);
                inner.state.update(|s| {
                    if s.user.is_none() {
                        s.phase = SessionPhase::Checking;
                    }
                    s.is_loading = true;
                });
                inner.resolve_session(session, generation).await;
            }
            None => {
                // Only the initial-session report legitimately carries no
                // session; anything else without one is malformed.
                if note.kind == AuthEventKind::InitialSession {
                    inner.initial_handled.store(true, Ordering::SeqCst);
                    inner.settle_unauthenticated(None);
                } else {
                    debug!(kind = ?note.kind, "ignoring auth event without a session");
                }
            }
        }
    }
    debug!("auth event listener ended");
}

/// Pull path: one deadline-bounded session retrieval at startup.
async fn run_initial_check(inner: Arc<Inner>) {
    let generation = inner.generation.load(Ordering::SeqCst);
    let outcome = with_deadline(
        inner.gateway.get_session(),
        inner.config.session_check_deadline,
        "initial-session-check",
    )
    .await;
    if !inner.alive.load(Ordering::SeqCst) {
        return;
    }
    match outcome {
        DeadlineOutcome::Completed(Ok(Some(session))) => {
            if inner.initial_handled.swap(true, Ordering::SeqCst) {
                debug!("initial state already settled by push; discarding pull result");
                return;
            }
            inner.resolve_session(session, generation).await;
        }
        DeadlineOutcome::Completed(Ok(None)) => {
            if !inner.initial_handled.swap(true, Ordering::SeqCst) {
                inner.settle_unauthenticated(None);
            }
        }
        DeadlineOutcome::Completed(Err(err)) => {
            // A failed check lands on the normal login screen, not an
            // error surface; retrying here would hold the UI hostage.
            warn!(error = %err, "initial session check failed");
            if let Err(clear_err) = inner.artifacts.clear() {
                warn!(error = %clear_err, "failed to clear session artifacts");
            }
            if !inner.initial_handled.swap(true, Ordering::SeqCst) {
                inner.settle_unauthenticated(None);
            }
        }
        DeadlineOutcome::TimedOut => {
            // Whatever was persisted can no longer be trusted to match
            // the provider's view.
            warn!("initial session check timed out");
            if let Err(err) = inner.artifacts.clear() {
                warn!(error = %err, "failed to clear session artifacts");
            }
            if !inner.initial_handled.swap(true, Ordering::SeqCst) {
                inner.settle_unauthenticated(None);
            }
        }
    }
}

/// Periodic check of stored-token expiry; refreshes ahead of the margin.
async fn run_expiry_timer(inner: Arc<Inner>) {
    let margin = chrono::Duration::from_std(inner.config.refresh_ahead_margin)
        .unwrap_or_else(|_| chrono::Duration::zero());
    let mut ticker = tokio::time::interval(inner.config.expiry_poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so the initial check owns
    // startup.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if !inner.alive.load(Ordering::SeqCst) {
            break;
        }
        if inner.artifacts.manual_clear_in_progress() {
            continue;
        }
        if inner.loop_detected.load(Ordering::SeqCst) {
            continue;
        }
        let near_expiry = matches!(
            inner.artifacts.expires_within(Utc::now(), margin),
            Ok(Some(true))
        );
        if near_expiry {
            debug!("stored session near expiry; refreshing");
            inner.refresh_and_apply().await;
        }
    }
}

/// Hard-timeout enforcement.
///
/// Phase one bounds the initial check; phase two bounds any later loading
/// period. Either way the coordinator settles: to unauthenticated when
/// there is nothing to salvage, or to stuck when partial artifacts exist
/// and the recovery surface should take over.
async fn run_watchdog(inner: Arc<Inner>) {
    tokio::time::sleep(inner.config.initial_check_timeout).await;
    if !inner.alive.load(Ordering::SeqCst) {
        return;
    }
    let snapshot = inner.state.snapshot();
    if !snapshot.session_checked {
        warn!("initial session check exceeded its hard timeout");
        let partial = snapshot.user.is_none() && inner.artifacts.has_session().unwrap_or(false);
        if partial {
            inner.enter_stuck("initial session check timed out with partial credentials");
        } else {
            inner.force_settle_loading();
        }
    }

    let mut loading_since: Option<Instant> = None;
    let mut ticker = tokio::time::interval(inner.config.watchdog_poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if !inner.alive.load(Ordering::SeqCst) {
            return;
        }
        let snapshot = inner.state.snapshot();
        if !snapshot.is_loading {
            loading_since = None;
            continue;
        }
        let since = *loading_since.get_or_insert_with(Instant::now);
        if since.elapsed() >= inner.config.loading_hard_timeout {
            warn!("loading exceeded its hard timeout; forcing settle");
            let partial =
                snapshot.user.is_none() && inner.artifacts.has_session().unwrap_or(false);
            if partial {
                inner.enter_stuck("loading timed out with partial credentials");
            } else {
                inner.force_settle_loading();
            }
            loading_since = None;
        }
    }
}
