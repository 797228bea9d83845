//! Deadline-guarded profile resolution.

use std::sync::Arc;
use std::time::Duration;

use deadline_guard::{with_deadline, DeadlineOutcome};
use identity_gateway::IdentityUser;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::{ProfileRecord, ProfileStore};

/// Default upper bound for a profile lookup.
pub const DEFAULT_PROFILE_DEADLINE: Duration = Duration::from_secs(3);

/// Metadata keys sign-up attaches to the identity record.
const META_FULL_NAME: &str = "full_name";
const META_NAME: &str = "name";
const META_AGENCY_NAME: &str = "agency_name";

/// The application-facing identity.
///
/// Derived by merging the provider's identity record with the agency
/// profile. Replaced wholesale on every refresh or profile update, never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Provider user id.
    pub id: String,
    /// Account email.
    pub email: String,
    /// Name shown in the UI; falls back to the email local part.
    pub display_name: String,
    /// The travel agency this user belongs to, once known.
    pub agency_name: Option<String>,
    /// Whether agency onboarding finished. Conservative: `false` whenever
    /// the profile could not be confirmed, so routing sends uncertain users
    /// to onboarding rather than past it.
    pub setup_completed: bool,
}

impl User {
    /// Builds the minimal user from the identity record alone.
    ///
    /// Used when the profile store is unreachable, slow, or has no row: the
    /// provider already confirmed a session, so there is always *a* user.
    pub fn fallback(identity: &IdentityUser) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            display_name: display_name_for(identity, None),
            agency_name: identity.metadata_str(META_AGENCY_NAME).map(str::to_string),
            setup_completed: false,
        }
    }

    /// Builds the full user by merging the identity record with a profile row.
    pub fn merged(identity: &IdentityUser, record: &ProfileRecord) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            display_name: display_name_for(identity, record.display_name.as_deref()),
            agency_name: record
                .agency_name
                .clone()
                .or_else(|| identity.metadata_str(META_AGENCY_NAME).map(str::to_string)),
            setup_completed: record.setup_completed,
        }
    }
}

/// Display-name precedence: identity metadata, then the profile row, then
/// the email local part, then the raw id.
fn display_name_for(identity: &IdentityUser, profile_name: Option<&str>) -> String {
    if let Some(name) = identity
        .metadata_str(META_FULL_NAME)
        .or_else(|| identity.metadata_str(META_NAME))
    {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    if let Some(name) = profile_name {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    email_local_part(&identity.email).unwrap_or_else(|| identity.id.clone())
}

fn email_local_part(email: &str) -> Option<String> {
    let local = email.split('@').next()?.trim();
    if local.is_empty() {
        None
    } else {
        Some(local.to_string())
    }
}

/// Resolves identity records into [`User`] values with a bounded wait.
pub struct ProfileResolver {
    store: Arc<dyn ProfileStore>,
    deadline: Duration,
}

impl ProfileResolver {
    /// Creates a resolver with the default deadline.
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self::with_deadline(store, DEFAULT_PROFILE_DEADLINE)
    }

    /// Creates a resolver with an explicit deadline.
    pub fn with_deadline(store: Arc<dyn ProfileStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    /// The store this resolver reads from.
    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    /// Resolves a confirmed identity into a `User`.
    ///
    /// Never fails: a store error, timeout, or missing row yields the
    /// fallback user with `setup_completed: false`. Partial information
    /// beats none — the provider has already confirmed the session.
    pub async fn resolve(&self, identity: &IdentityUser) -> User {
        match with_deadline(self.store.fetch(&identity.id), self.deadline, "profile-fetch").await {
            DeadlineOutcome::Completed(Ok(Some(record))) => User::merged(identity, &record),
            DeadlineOutcome::Completed(Ok(None)) => {
                debug!(user_id = %identity.id, "no profile row; using fallback user");
                User::fallback(identity)
            }
            DeadlineOutcome::Completed(Err(err)) => {
                warn!(user_id = %identity.id, error = %err, "profile fetch failed; using fallback user");
                User::fallback(identity)
            }
            DeadlineOutcome::TimedOut => {
                warn!(user_id = %identity.id, "profile fetch timed out; using fallback user");
                User::fallback(identity)
            }
        }
    }
}
