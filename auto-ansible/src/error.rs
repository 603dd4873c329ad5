use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::{runner::CommandOutput, steps::packages::PackageManager};

/// The failure of a single provisioning step.
///
/// Every variant is fatal to the run except [`ProvisionError::Collection`], which the
/// pipeline may be configured to tolerate.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("failed to provision account '{account}': {source}")]
    Account {
        account: String,
        #[source]
        source: AccountError,
    },
    #[error("package manager '{manager}' failed to {action}\n{output}")]
    PackageManager {
        manager: PackageManager,
        action: &'static str,
        output: CommandOutput,
    },
    #[error("no supported package manager found, tried: {tried}")]
    PackageManagerNotFound { tried: String },
    #[error("failed to install '{package}'\n{output}")]
    Install {
        package: String,
        output: CommandOutput,
    },
    #[error("failed to install collection '{collection}'\n{output}")]
    Collection {
        collection: String,
        output: CommandOutput,
    },
    #[error("failed to fetch inventory template from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("failed to generate SSH key pair {}\n{output}", .private_key.display())]
    Keygen {
        private_key: PathBuf,
        output: CommandOutput,
    },
    #[error("invalid input: {0}")]
    Input(String),
    #[error("{0}")]
    Preflight(String),
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("refusing to use {} since it is {found}", .path.display())]
    UnsafePath { path: PathBuf, found: &'static str },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ProvisionError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        ProvisionError::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("identity lookup failed\n{0}")]
    Lookup(CommandOutput),
    #[error("unable to read the account password: {0}")]
    Secret(#[source] io::Error),
    #[error("refusing to create an account with an empty password")]
    EmptySecret,
    #[error("account creation failed\n{0}")]
    Create(CommandOutput),
    #[error("setting the password failed, the account has been rolled back\n{0}")]
    SetPassword(String),
    #[error(
        "setting the password failed and rolling back the account also failed\npassword error: {password}\nrollback error: {rollback}"
    )]
    RollbackFailed { password: String, rollback: String },
    #[error("account is not visible to the identity lookup after creation")]
    MissingAfterCreate,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("server responded with {0}")]
    Status(reqwest::StatusCode),
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
}
