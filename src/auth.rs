//! Credential model: scopes, redacted secrets, and the per-session credential.

pub mod credential;
pub mod scope;
pub mod secret;

pub use credential::*;
pub use scope::*;
pub use secret::*;
