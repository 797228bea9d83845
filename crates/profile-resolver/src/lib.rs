//! Agency profile lookup and the derived `User` identity.
//!
//! The identity provider confirms *who* is signed in; the profile store
//! knows *where they are* in agency onboarding. This crate merges the two
//! into the application-facing [`User`] value:
//! - [`ProfileStore`]: the data-store contract, keyed by user id
//! - [`HttpProfileStore`]: REST implementation with an injected auth context
//! - [`ProfileResolver`]: deadline-guarded resolution with a mandatory
//!   fallback — a confirmed session never resolves to "no user"

mod error;
mod http;
mod resolver;
mod store;

pub use error::{ProfileError, ProfileResult};
pub use http::HttpProfileStore;
pub use resolver::{ProfileResolver, User, DEFAULT_PROFILE_DEADLINE};
pub use store::{ProfileRecord, ProfileStore, ProfileUpdate};
