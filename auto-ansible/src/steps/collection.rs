use crate::{
    error::ProvisionError,
    runner::{run_as, CommandRunner, Invocation},
};

use super::account::Account;

/// Install a collection required by playbooks, using the `ansible-galaxy` binary from the
/// account's pip user install. Installing an already present collection is a no-op.
pub async fn install_plugin(
    runner: &dyn CommandRunner,
    account: &Account,
    name: &str,
) -> Result<(), ProvisionError> {
    tracing::info!("Installing collection '{}' for '{}'", name, account.name);

    let galaxy = account.local_bin("ansible-galaxy");

    let output = run_as(
        runner,
        account,
        Invocation::new(galaxy.to_string_lossy())
            .args(["collection", "install"])
            .arg(name),
    )
    .await?;

    if !output.success() {
        return Err(ProvisionError::Collection {
            collection: name.to_string(),
            output,
        });
    }

    Ok(())
}
