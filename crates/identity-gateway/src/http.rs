//! HTTP implementation of the identity gateway.
//!
//! Speaks the provider's REST auth API (`/auth/v1/...`) with the project's
//! publishable key in the `apikey` header and the session's access token as
//! a bearer where required. Response bodies are never logged verbatim; a
//! length-plus-digest summary is logged instead.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::events::{AuthEventHub, AuthEventKind, AuthNotification, AuthSubscription};
use crate::gateway::IdentityGateway;
use crate::types::{IdentityUser, Session};

/// Default provider API URL (overridable at compile time via TOURLINE_API_URL).
pub const DEFAULT_API_URL: &str = match option_env!("TOURLINE_API_URL") {
    Some(url) => url,
    None => "https://api.tourline.app",
};

/// Default publishable API key (public, safe to expose; overridable at
/// compile time via TOURLINE_PUBLISHABLE_KEY).
pub const DEFAULT_PUBLISHABLE_KEY: &str = match option_env!("TOURLINE_PUBLISHABLE_KEY") {
    Some(key) => key,
    None => "tourline-publishable-key",
};

/// Gateway endpoint configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Provider project URL, e.g. `https://xyz.example.co`.
    pub api_url: String,
    /// Publishable API key sent in the `apikey` header.
    pub publishable_key: String,
}

impl GatewayConfig {
    /// Creates a config, validating the API URL.
    pub fn new(api_url: impl Into<String>, publishable_key: impl Into<String>) -> AuthResult<Self> {
        let api_url = api_url.into();
        Url::parse(&api_url)
            .map_err(|e| AuthError::Unknown(format!("invalid api url {api_url}: {e}")))?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            publishable_key: publishable_key.into(),
        })
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            publishable_key: DEFAULT_PUBLISHABLE_KEY.to_string(),
        }
    }
}

/// Token endpoint response shape.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Lifetime of the access token in seconds.
    expires_in: i64,
    user: IdentityUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + Duration::seconds(self.expires_in),
            user: self.user,
        }
    }
}

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Maps a non-success auth endpoint response to the error taxonomy.
fn classify_status(status: u16, body_summary: &str) -> AuthError {
    match status {
        400 | 422 => AuthError::InvalidCredentials(format!("provider rejected request ({status})")),
        401 | 403 => {
            AuthError::ExpiredOrInvalidToken(format!("provider rejected token ({status})"))
        }
        _ => AuthError::Unknown(format!("provider error {status} ({body_summary})")),
    }
}

/// HTTP identity gateway.
///
/// Holds the current session in memory (the persisted copy lives in the
/// auth vault, written by the coordinator) and publishes a notification on
/// its hub after every state-changing call, so push consumers and pull
/// callers observe the same sequence.
pub struct HttpGateway {
    http_client: reqwest::Client,
    config: GatewayConfig,
    hub: AuthEventHub,
    current: RwLock<Option<Session>>,
}

impl HttpGateway {
    /// Creates a gateway with no session.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            config,
            hub: AuthEventHub::new(),
            current: RwLock::new(None),
        }
    }

    /// Creates a gateway seeded with a session restored from local storage.
    ///
    /// Publishes `InitialSession` once the first subscriber can observe it is
    /// the caller's job: seed, subscribe, then call [`HttpGateway::announce_initial`].
    pub fn with_restored_session(config: GatewayConfig, session: Session) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            config,
            hub: AuthEventHub::new(),
            current: RwLock::new(Some(session)),
        }
    }

    /// Publishes the `InitialSession` notification for the restored session.
    pub async fn announce_initial(&self) {
        let session = self.current.read().await.clone();
        self.hub.publish(AuthNotification {
            kind: AuthEventKind::InitialSession,
            session,
        });
    }

    /// The hub this gateway publishes on.
    pub fn hub(&self) -> &AuthEventHub {
        &self.hub
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.config.api_url, path)
    }

    /// Executes a token-issuing POST and installs the resulting session.
    async fn token_request(
        &self,
        path: &str,
        body: serde_json::Value,
        event: AuthEventKind,
    ) -> AuthResult<Session> {
        let url = self.auth_url(path);
        debug!(url = %url, "identity gateway token request");

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.config.publishable_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let summary = summarize_response_body(&body);
            warn!(status, body_summary = %summary, "token request failed");
            return Err(classify_status(status, &summary));
        }

        let token: TokenResponse = response.json().await?;
        let session = token.into_session();

        {
            let mut current = self.current.write().await;
            *current = Some(session.clone());
        }

        info!(user_id = %session.user.id, event = ?event, "identity gateway session established");
        self.hub.publish(AuthNotification {
            kind: event,
            session: Some(session.clone()),
        });

        Ok(session)
    }
}

#[async_trait]
impl IdentityGateway for HttpGateway {
    async fn get_session(&self) -> AuthResult<Option<Session>> {
        Ok(self.current.read().await.clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        self.token_request(
            "token?grant_type=password",
            serde_json::json!({ "email": email, "password": password }),
            AuthEventKind::SignedIn,
        )
        .await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> AuthResult<Session> {
        self.token_request(
            "signup",
            serde_json::json!({ "email": email, "password": password, "data": metadata }),
            AuthEventKind::SignedIn,
        )
        .await
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let previous = {
            let mut current = self.current.write().await;
            current.take()
        };

        // Local state is already gone; push consumers hear about it before
        // the remote call can fail.
        self.hub.publish(AuthNotification {
            kind: AuthEventKind::SignedOut,
            session: None,
        });

        let Some(session) = previous else {
            return Ok(());
        };

        let url = self.auth_url("logout");
        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.config.publishable_key)
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let summary = summarize_response_body(&body);
            warn!(status, body_summary = %summary, "remote sign-out failed");
            return Err(classify_status(status, &summary));
        }

        Ok(())
    }

    async fn refresh_session(&self) -> AuthResult<Session> {
        let refresh_token = {
            let current = self.current.read().await;
            current.as_ref().map(|s| s.refresh_token.clone())
        };
        let Some(refresh_token) = refresh_token else {
            return Err(AuthError::ExpiredOrInvalidToken(
                "no session to refresh".to_string(),
            ));
        };

        self.token_request(
            "token?grant_type=refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
            AuthEventKind::TokenRefreshed,
        )
        .await
    }

    fn subscribe(&self) -> AuthSubscription {
        self.hub.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_rejects_invalid_url() {
        assert!(GatewayConfig::new("not a url", "key").is_err());
    }

    #[test]
    fn config_strips_trailing_slash() {
        let config = GatewayConfig::new("https://api.example.test/", "key").unwrap();
        assert_eq!(config.api_url, "https://api.example.test");
    }

    #[test]
    fn config_default_uses_compile_time_endpoint() {
        let config = GatewayConfig::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.publishable_key, DEFAULT_PUBLISHABLE_KEY);
    }

    #[test]
    fn classify_maps_statuses_to_taxonomy() {
        assert!(matches!(
            classify_status(400, ""),
            AuthError::InvalidCredentials(_)
        ));
        assert!(matches!(
            classify_status(422, ""),
            AuthError::InvalidCredentials(_)
        ));
        assert!(matches!(
            classify_status(401, ""),
            AuthError::ExpiredOrInvalidToken(_)
        ));
        assert!(matches!(classify_status(500, ""), AuthError::Unknown(_)));
    }

    #[test]
    fn token_response_parses_and_converts() {
        let json = serde_json::json!({
            "access_token": "at-1",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rt-1",
            "user": {
                "id": "user-1",
                "email": "ana@agency.example",
                "user_metadata": { "full_name": "Ana Souza" }
            }
        });

        let token: TokenResponse = serde_json::from_value(json).unwrap();
        let session = token.into_session();
        assert_eq!(session.access_token, "at-1");
        assert_eq!(session.user.metadata_str("full_name"), Some("Ana Souza"));
        assert!(session.expires_at > Utc::now());
        assert!(!session.is_expired(Utc::now()));
    }

    #[test]
    fn body_summary_hides_content() {
        let summary = summarize_response_body("{\"secret\":\"token\"}");
        assert!(summary.starts_with("len=18,digest="));
        assert!(!summary.contains("token"));
    }

    #[tokio::test]
    async fn get_session_starts_empty() {
        let gateway = HttpGateway::new(GatewayConfig::default());
        assert!(gateway.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn refresh_without_session_is_invalid_token() {
        let gateway = HttpGateway::new(GatewayConfig::default());
        let err = gateway.refresh_session().await.unwrap_err();
        assert!(matches!(err, AuthError::ExpiredOrInvalidToken(_)));
    }

    #[tokio::test]
    async fn sign_out_without_session_publishes_and_succeeds() {
        let gateway = HttpGateway::new(GatewayConfig::default());
        let mut sub = gateway.subscribe();

        gateway.sign_out().await.unwrap();

        let note = sub.next().await.unwrap();
        assert_eq!(note.kind, AuthEventKind::SignedOut);
        assert!(note.session.is_none());
    }
}
