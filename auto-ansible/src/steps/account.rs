use std::{
    fs::File,
    os::unix::fs::fchown,
    path::{Path, PathBuf},
};

use common::Secret;
use serde::Serialize;

use crate::{
    error::{AccountError, ProvisionError},
    operator::SecretProvider,
    runner::{execute, CommandRunner, Invocation},
};

/// Directory under the account home holding the automation tool's configuration and inventory.
pub const WORKSPACE_DIR_NAME: &str = "ansible";
pub const INVENTORY_FILE_NAME: &str = "hosts";

// `getent` exits with 2 when the key could not be found in the database
const GETENT_NOT_FOUND: i32 = 2;

/// The service account the automation tool runs as.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Account {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

impl Account {
    /// Parse a `passwd(5)` line, e.g. `ansible:x:1001:1001::/home/ansible:/bin/bash`
    pub fn from_passwd_entry(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim_end().split(':').collect();
        if fields.len() != 7 || fields[0].is_empty() || fields[5].is_empty() {
            return None;
        }

        Some(Self {
            name: fields[0].to_string(),
            uid: fields[2].parse().ok()?,
            gid: fields[3].parse().ok()?,
            home: PathBuf::from(fields[5]),
        })
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.home.join(WORKSPACE_DIR_NAME)
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.workspace_dir().join(INVENTORY_FILE_NAME)
    }

    pub fn ssh_dir(&self) -> PathBuf {
        self.home.join(".ssh")
    }

    /// Location of executables installed with `pip install --user`
    pub fn local_bin(&self, binary: &str) -> PathBuf {
        self.home.join(".local").join("bin").join(binary)
    }

    /// Hand ownership of a file created by the privileged process over to the account.
    /// Takes the open handle so a link swapped in at `path` can't redirect the change.
    pub fn take_ownership(&self, handle: &File, path: &Path) -> Result<(), ProvisionError> {
        fchown(handle, Some(self.uid), Some(self.gid)).map_err(|e| {
            ProvisionError::io(
                format!("failed to change owner of {} to '{}'", path.display(), self.name),
                e,
            )
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountResult {
    pub account: Account,
    pub created: bool,
}

fn account_error(name: &str, source: AccountError) -> ProvisionError {
    ProvisionError::Account {
        account: name.to_string(),
        source,
    }
}

/// Look the account up in the system's user database.
pub async fn lookup_account(
    runner: &dyn CommandRunner,
    name: &str,
) -> Result<Option<Account>, ProvisionError> {
    let output = execute(runner, &Invocation::new("getent").args(["passwd", name])).await?;

    match output.code {
        Some(0) => {
            let account = output
                .stdout
                .lines()
                .find_map(Account::from_passwd_entry)
                .filter(|account| account.name == name)
                .ok_or_else(|| account_error(name, AccountError::Lookup(output.clone())))?;

            Ok(Some(account))
        }
        Some(GETENT_NOT_FOUND) => Ok(None),
        _ => Err(account_error(name, AccountError::Lookup(output))),
    }
}

/// Make sure the service account exists, creating it with a home directory and a password
/// when it does not.
///
/// If the password cannot be set, the freshly created account is deleted again so that a
/// re-run starts from a clean slate.
pub async fn ensure_account(
    runner: &dyn CommandRunner,
    secrets: &dyn SecretProvider,
    name: &str,
) -> Result<AccountResult, ProvisionError> {
    if let Some(account) = lookup_account(runner, name).await? {
        tracing::info!("User '{}' already exists", name);
        return Ok(AccountResult {
            account,
            created: false,
        });
    }

    let secret = secrets
        .get(&format!("Enter password for '{name}' user: "))
        .map_err(|e| account_error(name, AccountError::Secret(e)))?;

    if secret.is_empty() {
        return Err(account_error(name, AccountError::EmptySecret));
    }

    tracing::info!("Creating user '{}'", name);

    let output = execute(runner, &Invocation::new("useradd").arg("-m").arg(name)).await?;
    if !output.success() {
        return Err(account_error(name, AccountError::Create(output)));
    }

    // chpasswd reads `user:password` pairs from stdin
    let payload = Secret::new(format!("{name}:{}", secret.expose()));
    let password_failure = match execute(runner, &Invocation::new("chpasswd").stdin(payload)).await
    {
        Ok(output) if output.success() => None,
        Ok(output) => Some(output.to_string()),
        Err(e) => Some(e.to_string()),
    };

    if let Some(password_failure) = password_failure {
        tracing::error!("[!] Failed to set password for '{}'", name);
        return Err(roll_back_account(runner, name, password_failure).await);
    }

    let account = lookup_account(runner, name)
        .await?
        .ok_or_else(|| account_error(name, AccountError::MissingAfterCreate))?;

    tracing::info!("User '{}' created successfully", name);

    Ok(AccountResult {
        account,
        created: true,
    })
}

async fn roll_back_account(
    runner: &dyn CommandRunner,
    name: &str,
    password_failure: String,
) -> ProvisionError {
    let rollback_failure =
        match execute(runner, &Invocation::new("userdel").arg("-r").arg(name)).await {
            Ok(output) if output.success() => None,
            Ok(output) => Some(output.to_string()),
            Err(e) => Some(e.to_string()),
        };

    match rollback_failure {
        None => {
            tracing::warn!("[*] Rolled back user creation for '{}'", name);
            account_error(name, AccountError::SetPassword(password_failure))
        }
        Some(rollback_failure) => {
            tracing::error!("[!] Failed to roll back user creation for '{}'", name);
            account_error(
                name,
                AccountError::RollbackFailed {
                    password: password_failure,
                    rollback: rollback_failure,
                },
            )
        }
    }
}
