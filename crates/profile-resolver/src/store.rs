//! Profile data-store contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProfileResult;

/// The agency profile row for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Whether the user completed agency onboarding.
    #[serde(default)]
    pub setup_completed: bool,
    /// The travel agency's display name.
    #[serde(default)]
    pub agency_name: Option<String>,
    /// Preferred display name, when set in the profile.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Partial update for a profile row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    /// New onboarding status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_completed: Option<bool>,
    /// New agency name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency_name: Option<String>,
    /// New display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Remote profile storage, keyed by provider user id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetches the profile row, or `None` when the user has none yet.
    async fn fetch(&self, user_id: &str) -> ProfileResult<Option<ProfileRecord>>;

    /// Applies a partial update to the profile row.
    async fn update(&self, user_id: &str, update: ProfileUpdate) -> ProfileResult<()>;
}
