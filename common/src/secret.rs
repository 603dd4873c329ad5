//! Secrets such as account passwords are passed around the provisioning code a lot: prompted
//! for, handed to subprocesses on stdin, logged alongside the invocation that consumes them.
//! Wrapping them in [`Secret`] means a stray `{:?}` in a log line prints a placeholder instead
//! of the value.

use std::fmt;

const REDACTED_VALUE: &str = "<REDACTED>";

#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the underlying value. Call sites should be the places that actually
    /// consume the secret, e.g. writing it to a child process' stdin.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED_VALUE)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED_VALUE)
    }
}
