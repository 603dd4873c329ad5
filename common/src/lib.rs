//! The `common` crate provides the cross-cutting pieces shared by the provisioning tooling:
//! logging setup and a redacting wrapper for secrets such as account passwords.

pub mod secret;
pub mod tracing;

pub use secret::Secret;
