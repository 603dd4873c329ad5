use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use common::Secret;
use serde::Serialize;

use crate::{
    error::ProvisionError,
    runner::{execute, run_as, CommandRunner, Invocation},
};

use super::{
    account::Account,
    home_fs::{create_account_dir, entry_exists, open_dir, open_file, set_mode},
};

const KEY_TYPE: &str = "rsa";
const KEY_BITS: &str = "4096";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KeyPaths {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

impl KeyPaths {
    /// `<home>/.ssh/<label>_rsa` and its `.pub` sibling
    pub fn for_label(account: &Account, label: &str) -> Self {
        // Host names may contain dots, so `with_extension` can't be used for the public key
        let private_key = account.ssh_dir().join(format!("{label}_{KEY_TYPE}"));
        let public_key = account.ssh_dir().join(format!("{label}_{KEY_TYPE}.pub"));

        Self {
            private_key,
            public_key,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPairOutcome {
    pub paths: KeyPaths,
    pub generated: bool,
}

/// The host's network name, used to label key pairs.
pub async fn host_label(runner: &dyn CommandRunner) -> Result<String, ProvisionError> {
    let output = execute(runner, &Invocation::new("uname").arg("-n")).await?;

    let label = output.stdout.trim();
    if !output.success() || label.is_empty() {
        return Err(ProvisionError::Input(format!(
            "unable to determine the host name\n{output}"
        )));
    }

    if label.contains('/') {
        return Err(ProvisionError::Input(format!(
            "host name '{label}' cannot be used in a file name"
        )));
    }

    Ok(label.to_string())
}

/// Make sure the account has an SSH key pair for this host.
///
/// An existing private key is never regenerated, since peers may already trust its public
/// half. Anything at the private key path counts as existing, including a dangling link.
/// New keys are created as the account with the passphrase from `passphrase`, which is only
/// asked for when a key is actually generated. An empty passphrase is only acceptable for
/// demo setups.
pub async fn ensure_keypair<F>(
    runner: &dyn CommandRunner,
    account: &Account,
    label: &str,
    passphrase: F,
) -> Result<KeyPairOutcome, ProvisionError>
where
    F: FnOnce() -> Result<Secret, ProvisionError>,
{
    let paths = KeyPaths::for_label(account, label);

    if entry_exists(&paths.private_key)? {
        tracing::info!(
            "SSH key {} already exists, not regenerating it",
            paths.private_key.display()
        );

        if !entry_exists(&paths.public_key)? {
            tracing::warn!(
                "Public key {} is missing, recreate it with `ssh-keygen -y`",
                paths.public_key.display()
            );
        }

        return Ok(KeyPairOutcome {
            paths,
            generated: false,
        });
    }

    let passphrase = passphrase()?;

    ensure_ssh_dir(account)?;

    if passphrase.is_empty() {
        tracing::warn!("Generating SSH key without a passphrase, do not use this key in production");
    }

    tracing::info!(
        "Generating SSH key {} for '{}'",
        paths.private_key.display(),
        account.name
    );

    let output = run_as(
        runner,
        account,
        Invocation::new("ssh-keygen")
            .args(["-t", KEY_TYPE, "-b", KEY_BITS, "-q", "-f"])
            .arg(paths.private_key.to_string_lossy())
            .arg("-C")
            .arg(format!("{}@{}", account.name, label))
            .arg("-N")
            .secret_arg(passphrase),
    )
    .await?;

    if !output.success() {
        tracing::error!("[!] Error generating SSH key");
        return Err(ProvisionError::Keygen {
            private_key: paths.private_key,
            output,
        });
    }

    restrict(&paths.private_key, 0o600)?;
    if entry_exists(&paths.public_key)? {
        restrict(&paths.public_key, 0o644)?;
    }

    tracing::info!(
        "SSH key {} successfully created",
        paths.private_key.display()
    );

    Ok(KeyPairOutcome {
        paths,
        generated: true,
    })
}

fn ensure_ssh_dir(account: &Account) -> Result<(), ProvisionError> {
    let ssh_dir = account.ssh_dir();

    create_account_dir(account, &ssh_dir, 0o700)?;

    let dir = open_dir(&ssh_dir)?;
    set_mode(&dir, &ssh_dir, 0o700)
}

fn restrict(path: &Path, mode: u32) -> Result<(), ProvisionError> {
    let file = open_file(path, OpenOptions::new().read(true))?;
    set_mode(&file, path, mode)
}
