//! The gateway trait consumed by the session coordinator.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::AuthResult;
use crate::events::AuthSubscription;
use crate::types::Session;

/// Remote identity provider operations.
///
/// Every method is a suspension point; callers bound them with the deadline
/// guard. Implementations must publish auth-change notifications through
/// their hub so [`IdentityGateway::subscribe`] observers stay consistent
/// with the pull-based calls.
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    /// Returns the current session, if one exists.
    async fn get_session(&self) -> AuthResult<Option<Session>>;

    /// Signs in with email and password.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session>;

    /// Creates an account, attaching `metadata` to the identity record.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> AuthResult<Session>;

    /// Signs out.
    ///
    /// Implementations drop their local session and publish `SignedOut`
    /// even when the remote call fails; the error is still returned so the
    /// caller can log it.
    async fn sign_out(&self) -> AuthResult<()>;

    /// Exchanges the refresh token for a fresh session.
    async fn refresh_session(&self) -> AuthResult<Session>;

    /// Subscribes to push notifications of auth state changes.
    fn subscribe(&self) -> AuthSubscription;
}
