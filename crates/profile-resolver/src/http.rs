//! REST implementation of the profile store.
//!
//! Reads and writes the `agency_profiles` table through the backend's REST
//! layer with a filtered query keyed by user id. The access token is an
//! injected context: the application wiring sets it after sign-in and
//! clears it on sign-out, so this client never owns token lifecycle.

use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ProfileError, ProfileResult};
use crate::store::{ProfileRecord, ProfileStore, ProfileUpdate};

const PROFILE_TABLE: &str = "agency_profiles";

/// HTTP profile store client.
pub struct HttpProfileStore {
    http_client: reqwest::Client,
    api_url: String,
    publishable_key: String,
    access_token: RwLock<Option<String>>,
}

impl HttpProfileStore {
    /// Creates a client for the given backend.
    pub fn new(api_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into(),
            publishable_key: publishable_key.into(),
            access_token: RwLock::new(None),
        }
    }

    /// Installs the access token used for store calls.
    pub fn set_access_token(&self, token: impl Into<String>) {
        let mut guard = self.access_token.write().expect("lock poisoned");
        *guard = Some(token.into());
    }

    /// Removes the access token. Calls fail with `NoContext` until a new
    /// one is installed.
    pub fn clear_access_token(&self) {
        let mut guard = self.access_token.write().expect("lock poisoned");
        *guard = None;
    }

    fn token(&self) -> ProfileResult<String> {
        self.access_token
            .read()
            .expect("lock poisoned")
            .clone()
            .ok_or_else(|| ProfileError::NoContext("profile store has no access token".to_string()))
    }

    fn rest_url(&self) -> String {
        format!("{}/rest/v1/{}", self.api_url, PROFILE_TABLE)
    }
}

#[async_trait]
impl ProfileStore for HttpProfileStore {
    async fn fetch(&self, user_id: &str) -> ProfileResult<Option<ProfileRecord>> {
        let token = self.token()?;
        let url = format!(
            "{}?user_id=eq.{}&select=setup_completed,agency_name,display_name&limit=1",
            self.rest_url(),
            user_id
        );

        debug!(user_id = %user_id, "fetching agency profile");

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProfileError::Api {
                status,
                message: format!("len={}", message.len()),
            });
        }

        let rows: Vec<ProfileRecord> = response.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn update(&self, user_id: &str, update: ProfileUpdate) -> ProfileResult<()> {
        let token = self.token()?;
        let url = format!("{}?user_id=eq.{}", self.rest_url(), user_id);

        debug!(user_id = %user_id, "updating agency profile");

        let response = self
            .http_client
            .patch(&url)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(&update)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProfileError::Api {
                status,
                message: format!("len={}", message.len()),
            });
        }

        Ok(())
    }
}
