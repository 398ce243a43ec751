//! Credential descriptors and credential sets.
//!
//! `scheme` exposes [`RegistryCredentials`], the closed set of descriptor variants callers hand to
//! a session (`docker` v1 carries credentials inline, `registry-credentials-callback` v1 points at
//! a callback endpoint). `request` holds the callback [`RequestSpec`], `set` the fetched
//! [`CredentialSet`], and `secret` a redacting wrapper for sensitive values.

pub mod request;
pub mod scheme;
pub mod secret;
pub mod set;

pub use request::*;
pub use scheme::*;
pub use secret::*;
pub use set::*;
