//! Identity provider gateway for the Tourline client.
//!
//! This crate is the boundary between the session subsystem and the hosted
//! identity provider. It provides:
//! - Wire types for sessions and provider identity records
//! - The [`IdentityGateway`] trait that the session coordinator consumes
//! - A broadcast-backed auth event stream ([`AuthEventHub`] / [`AuthSubscription`])
//! - An HTTP implementation ([`HttpGateway`]) speaking the provider's REST API
//! - The error taxonomy shared across the auth subsystem ([`AuthError`])
//!
//! The provider itself is a black box: consumers only see typed events and
//! `Session` values, never transport details.

mod error;
mod events;
mod gateway;
mod http;
mod types;

pub use error::{AuthError, AuthResult};
pub use events::{AuthEventHub, AuthEventKind, AuthNotification, AuthSubscription};
pub use gateway::IdentityGateway;
pub use http::{GatewayConfig, HttpGateway, DEFAULT_API_URL, DEFAULT_PUBLISHABLE_KEY};
pub use types::{IdentityUser, Session};
