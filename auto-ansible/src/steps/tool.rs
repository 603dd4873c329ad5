use crate::{
    error::ProvisionError,
    runner::{run_as, CommandRunner, Invocation},
};

use super::{account::Account, home_fs::create_account_dir, packages::PackageManager};

/// Install the automation engine for the service account.
///
/// pip itself comes from the OS package manager and needs the invoking privileges. The engine
/// is then installed with `pip install --user` as the account, so every installed file is
/// owned by it. Finally the account's workspace directory is created if missing.
///
/// Returns whether the workspace directory had to be created.
pub async fn install_tool(
    runner: &dyn CommandRunner,
    manager: PackageManager,
    account: &Account,
    pip_package: &str,
    tool_package: &str,
) -> Result<bool, ProvisionError> {
    manager.install(runner, pip_package).await?;

    tracing::info!(
        "Installing '{}' via pip for '{}'",
        tool_package,
        account.name
    );

    let output = run_as(
        runner,
        account,
        Invocation::new("python3")
            .args(["-m", "pip", "install", "--user"])
            .arg(tool_package),
    )
    .await?;

    if !output.success() {
        tracing::error!("[!] Error during {} installation", tool_package);
        return Err(ProvisionError::Install {
            package: tool_package.to_string(),
            output,
        });
    }

    ensure_workspace(account)
}

/// Create the account's workspace directory. An existing directory is kept as is.
pub fn ensure_workspace(account: &Account) -> Result<bool, ProvisionError> {
    let workspace = account.workspace_dir();

    let created = create_account_dir(account, &workspace, 0o755)?;
    if created {
        tracing::info!("Created workspace directory {}", workspace.display());
    } else {
        tracing::info!("Workspace directory {} already exists", workspace.display());
    }

    Ok(created)
}
