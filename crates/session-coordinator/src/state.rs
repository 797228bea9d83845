//! Observable session state.

use profile_resolver::User;
use serde::Serialize;
use tokio::sync::watch;

/// Where the session lifecycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nothing has run yet.
    Uninitialized,
    /// The initial session check is in flight.
    Checking,
    /// A user is signed in and resolved.
    Authenticated,
    /// No session exists.
    Unauthenticated,
    /// A token refresh is in flight.
    Refreshing,
    /// A hard timeout fired while partial session artifacts exist; the
    /// recovery surface takes over.
    Stuck,
    /// A recovery action is running.
    Recovering,
}

/// The snapshot consumers render from.
///
/// Replaced wholesale on every transition; consumers never see a
/// half-updated value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    /// Current lifecycle phase.
    pub phase: SessionPhase,
    /// The resolved user, when authenticated.
    pub user: Option<User>,
    /// Whether a resolution or refresh is outstanding.
    pub is_loading: bool,
    /// User-facing error message, when one should be shown.
    pub error: Option<String>,
    /// Whether at least one full session check has completed this
    /// lifecycle. Monotonic: once `true` it stays `true` until an explicit
    /// restart.
    pub session_checked: bool,
}

impl SessionState {
    pub(crate) fn initial() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            user: None,
            is_loading: true,
            error: None,
            session_checked: false,
        }
    }

    /// Whether a signed-in user is present.
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Single-writer cell broadcasting [`SessionState`] snapshots.
///
/// Enforces `session_checked` monotonicity: a mutation can raise the flag
/// but never lower it. Only [`StateCell::reset`] drops it, and that is
/// reserved for an explicit restart of the whole lifecycle.
pub(crate) struct StateCell {
    sender: watch::Sender<SessionState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(SessionState::initial());
        Self { sender }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.sender.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.sender.borrow().clone()
    }

    /// Applies a mutation and publishes the result.
    pub fn update(&self, mutate: impl FnOnce(&mut SessionState)) {
        self.sender.send_modify(|state| {
            let was_checked = state.session_checked;
            mutate(state);
            if was_checked {
                state.session_checked = true;
            }
        });
    }

    /// Returns the state to its pristine value, dropping `session_checked`.
    pub fn reset(&self) {
        self.sender.send_replace(SessionState::initial());
    }
}
