//! Scriptable fakes and helpers for coordinator integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use identity_gateway::{
    AuthError, AuthEventHub, AuthEventKind, AuthNotification, AuthResult, AuthSubscription,
    IdentityGateway, IdentityUser, Session,
};
use profile_resolver::{ProfileError, ProfileRecord, ProfileStore, ProfileUpdate};
use session_coordinator::{CoordinatorConfig, SessionState};
use tokio::sync::watch;

/// How the fake answers the pull-based session check.
#[derive(Clone)]
pub enum PullBehavior {
    Session(Session),
    Empty,
    Fail(AuthError),
    Hang,
}

/// How the fake answers one refresh call; consumed front-to-back.
#[derive(Clone)]
pub enum RefreshBehavior {
    Succeed(Session),
    SucceedAfter(Session, Duration),
    Fail(AuthError),
    FailAfter(AuthError, Duration),
    Hang,
}

pub struct FakeGateway {
    pub hub: AuthEventHub,
    pull: Mutex<PullBehavior>,
    refresh_script: Mutex<VecDeque<RefreshBehavior>>,
    refresh_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
    sign_out_error: Mutex<Option<AuthError>>,
    sign_in_error: Mutex<Option<AuthError>>,
}

impl FakeGateway {
    pub fn new(pull: PullBehavior) -> Arc<Self> {
        Arc::new(Self {
            hub: AuthEventHub::new(),
            pull: Mutex::new(pull),
            refresh_script: Mutex::new(VecDeque::new()),
            refresh_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            sign_out_error: Mutex::new(None),
            sign_in_error: Mutex::new(None),
        })
    }

    pub fn set_pull(&self, pull: PullBehavior) {
        *self.pull.lock().unwrap() = pull;
    }

    pub fn queue_refresh(&self, behavior: RefreshBehavior) {
        self.refresh_script.lock().unwrap().push_back(behavior);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    pub fn set_sign_out_error(&self, err: AuthError) {
        *self.sign_out_error.lock().unwrap() = Some(err);
    }

    pub fn set_sign_in_error(&self, err: AuthError) {
        *self.sign_in_error.lock().unwrap() = Some(err);
    }

    /// Publishes a push notification as the provider would.
    pub fn push(&self, kind: AuthEventKind, session: Option<Session>) {
        self.hub.publish(AuthNotification { kind, session });
    }
}

#[async_trait]
impl IdentityGateway for FakeGateway {
    async fn get_session(&self) -> AuthResult<Option<Session>> {
        let pull = self.pull.lock().unwrap().clone();
        match pull {
            PullBehavior::Session(session) => Ok(Some(session)),
            PullBehavior::Empty => Ok(None),
            PullBehavior::Fail(err) => Err(err),
            PullBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(None)
            }
        }
    }

    async fn sign_in_with_password(&self, email: &str, _password: &str) -> AuthResult<Session> {
        if let Some(err) = self.sign_in_error.lock().unwrap().clone() {
            return Err(err);
        }
        let session = session_for(email);
        self.push(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> AuthResult<Session> {
        if let Some(err) = self.sign_in_error.lock().unwrap().clone() {
            return Err(err);
        }
        let mut session = session_for(email);
        session.user.user_metadata = metadata;
        self.push(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.push(AuthEventKind::SignedOut, None);
        match self.sign_out_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn refresh_session(&self) -> AuthResult<Session> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.refresh_script.lock().unwrap().pop_front();
        match behavior {
            Some(RefreshBehavior::Succeed(session)) => Ok(session),
            Some(RefreshBehavior::SucceedAfter(session, delay)) => {
                tokio::time::sleep(delay).await;
                Ok(session)
            }
            Some(RefreshBehavior::Fail(err)) => Err(err),
            Some(RefreshBehavior::FailAfter(err, delay)) => {
                tokio::time::sleep(delay).await;
                Err(err)
            }
            Some(RefreshBehavior::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(AuthError::Unknown("unreachable".to_string()))
            }
            None => Err(AuthError::NetworkOrTimeout(
                "no scripted refresh".to_string(),
            )),
        }
    }

    fn subscribe(&self) -> AuthSubscription {
        self.hub.subscribe()
    }
}

pub struct FakeProfileStore {
    records: Mutex<HashMap<String, ProfileRecord>>,
    fetch_calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    fail_updates: AtomicBool,
    updates: Mutex<Vec<(String, ProfileUpdate)>>,
}

impl FakeProfileStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(HashMap::new()),
            fetch_calls: AtomicUsize::new(0),
            delay: Mutex::new(None),
            fail_updates: AtomicBool::new(false),
            updates: Mutex::new(Vec::new()),
        })
    }

    pub fn insert(&self, user_id: &str, record: ProfileRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(user_id.to_string(), record);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn recorded_updates(&self) -> Vec<(String, ProfileUpdate)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProfileStore for FakeProfileStore {
    async fn fetch(&self, user_id: &str) -> Result<Option<ProfileRecord>, ProfileError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.records.lock().unwrap().get(user_id).cloned())
    }

    async fn update(&self, user_id: &str, update: ProfileUpdate) -> Result<(), ProfileError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(ProfileError::Api {
                status: 500,
                message: "update rejected".to_string(),
            });
        }
        self.updates
            .lock()
            .unwrap()
            .push((user_id.to_string(), update));
        Ok(())
    }
}

/// A session for `email` with an hour of validity.
pub fn session_for(email: &str) -> Session {
    let local = email.split('@').next().unwrap_or("user");
    Session {
        access_token: format!("at-{local}"),
        refresh_token: format!("rt-{local}"),
        expires_at: Utc::now() + chrono::Duration::hours(1),
        user: IdentityUser {
            id: format!("id-{local}"),
            email: email.to_string(),
            user_metadata: HashMap::new(),
        },
    }
}

/// Production shape, test speed.
pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        debounce_window: Duration::from_millis(150),
        burst_interval: Duration::from_secs(2),
        session_check_deadline: Duration::from_millis(200),
        profile_deadline: Duration::from_millis(200),
        refresh_deadline: Duration::from_millis(250),
        refresh_cooldown: Duration::from_millis(400),
        initial_check_timeout: Duration::from_millis(900),
        loading_hard_timeout: Duration::from_millis(1300),
        watchdog_poll_interval: Duration::from_millis(50),
        // Quiet by default; expiry tests shrink it explicitly.
        expiry_poll_interval: Duration::from_secs(3600),
        ..CoordinatorConfig::default()
    }
}

/// Waits until the state satisfies `pred`, panicking with `what` on timeout.
pub async fn wait_for(
    rx: &mut watch::Receiver<SessionState>,
    what: &str,
    pred: impl Fn(&SessionState) -> bool,
) -> SessionState {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let snapshot = rx.borrow().clone();
                if pred(&snapshot) {
                    return snapshot;
                }
            }
            if rx.changed().await.is_err() {
                panic!("state channel closed while waiting for {what}");
            }
        }
    })
    .await;
    match result {
        Ok(state) => state,
        Err(_) => panic!("timed out waiting for {what}"),
    }
}
