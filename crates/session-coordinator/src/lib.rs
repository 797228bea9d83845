//! Session coordination for the Tourline client.
//!
//! This crate owns the single source of truth for "who is signed in".
//! It reconciles the identity gateway's push events with an explicit pull
//! check, bounds every remote wait, debounces duplicate events, serializes
//! token refreshes, and exposes one observable [`SessionState`] snapshot
//! plus a recovery contract for the rare case where nothing settles.
//!
//! Construction wires four collaborators together:
//! - an [`identity_gateway::IdentityGateway`] for the provider
//! - a [`profile_resolver::ProfileStore`] for agency profiles
//! - an [`auth_vault::AuthVault`] for persisted token material
//! - a [`CoordinatorConfig`] for timing and retry budgets

mod config;
mod debounce;
mod machine;
mod recovery;
mod refresh;
mod state;

pub use config::CoordinatorConfig;
pub use debounce::BurstLevel;
pub use machine::SessionCoordinator;
pub use recovery::{RecoveryAction, StuckReport};
pub use refresh::{RefreshOutcome, SkipReason};
pub use state::{SessionPhase, SessionState};

// The coordinator's public surface speaks these types.
pub use identity_gateway::{AuthError, Session};
pub use profile_resolver::User;
