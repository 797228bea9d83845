//! Auth-change event stream.
//!
//! Gateway implementations publish [`AuthNotification`]s through an
//! [`AuthEventHub`]; consumers hold an [`AuthSubscription`] and drain it
//! until they cancel. Events published before a subscription exists are not
//! replayed. A cancelled subscription yields `None` forever, so consumers
//! that keep polling after teardown see a closed stream rather than stale
//! events.

use tokio::sync::broadcast;
use tracing::warn;

use crate::types::Session;

/// Default buffer size for the event channel.
///
/// Auth events are rare; a burst larger than this indicates a refresh loop,
/// which the coordinator detects separately.
const DEFAULT_EVENT_CAPACITY: usize = 32;

/// The kind of auth state change the provider reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthEventKind {
    /// A user signed in (password grant or restored session).
    SignedIn,
    /// The user signed out; always honored immediately.
    SignedOut,
    /// The access token was refreshed.
    TokenRefreshed,
    /// The provider's identity record changed.
    UserUpdated,
    /// The provider reports the session present at subscription time.
    InitialSession,
}

/// A single push notification from the identity provider.
#[derive(Debug, Clone)]
pub struct AuthNotification {
    /// What changed.
    pub kind: AuthEventKind,
    /// The session after the change, if one exists.
    pub session: Option<Session>,
}

/// Publisher side of the auth event stream.
///
/// Cloneable; gateway implementations hold one and publish after each
/// state-changing call. Test fakes drive the coordinator through it.
#[derive(Debug, Clone)]
pub struct AuthEventHub {
    sender: broadcast::Sender<AuthNotification>,
}

impl AuthEventHub {
    /// Creates a hub with the default buffer capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Creates a hub with an explicit buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscription receiving events published after this call.
    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription {
            receiver: self.sender.subscribe(),
            cancelled: false,
        }
    }

    /// Publishes a notification to all live subscribers.
    ///
    /// Returns the number of subscribers that received it. Publishing with
    /// no subscribers is a no-op, not an error.
    pub fn publish(&self, notification: AuthNotification) -> usize {
        self.sender.send(notification).unwrap_or(0)
    }

    /// Number of currently live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuthEventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of the auth event stream.
///
/// The consumer owns start/stop: call [`AuthSubscription::next`] in a loop
/// and [`AuthSubscription::cancel`] on teardown.
pub struct AuthSubscription {
    receiver: broadcast::Receiver<AuthNotification>,
    cancelled: bool,
}

impl AuthSubscription {
    /// Waits for the next notification.
    ///
    /// Returns `None` once the subscription is cancelled or the hub is
    /// dropped. If the consumer fell behind and events were discarded, the
    /// gap is logged and draining continues with the next available event —
    /// the coordinator re-derives state from whole sessions, so skipped
    /// intermediate events are safe.
    pub async fn next(&mut self) -> Option<AuthNotification> {
        if self.cancelled {
            return None;
        }
        loop {
            match self.receiver.recv().await {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth subscription lagged; dropping missed events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Attempts to read a pending notification without waiting.
    pub fn try_next(&mut self) -> Option<AuthNotification> {
        if self.cancelled {
            return None;
        }
        loop {
            match self.receiver.try_recv() {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth subscription lagged; dropping missed events");
                }
                Err(_) => return None,
            }
        }
    }

    /// Stops the subscription; all later `next` calls return `None`.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Whether [`AuthSubscription::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}
