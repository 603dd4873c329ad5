use std::fmt::{self, Display};

use common::Secret;
use serde::Serialize;
use strum::{EnumIter, IntoEnumIterator};

use crate::{
    config::{FailurePolicy, PassphrasePolicy, ProvisionConfig},
    error::ProvisionError,
    fetch::TemplateFetcher,
    operator::{PeerListSource, SecretProvider},
    runner::CommandRunner,
    steps::{
        account::{ensure_account, Account},
        collection::install_plugin,
        inventory::{stage_inventory, InventoryOutcome},
        keys::{ensure_keypair, host_label, KeyPaths},
        packages::{resolve_package_manager, sync_packages, PackageManager},
        tool::install_tool,
        trust::{build_trust_commands, parse_peer_list, TrustCommands},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// The host automation is driven from
    Control,
    /// A host managed by a control node
    Worker,
}

impl Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Control => write!(f, "control-node"),
            NodeRole::Worker => write!(f, "worker-node"),
        }
    }
}

/// The provisioning sequence. Steps run in declaration order, each one relying on the
/// state left behind by the ones before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    EnsureAccount,
    SyncPackages,
    InstallTool,
    InstallCollection,
    StageInventory,
    EnsureKeyPair,
    EmitTrustCommands,
}

impl Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStep::EnsureAccount => write!(f, "Ensure Service Account"),
            ProvisionStep::SyncPackages => write!(f, "Sync Package Index"),
            ProvisionStep::InstallTool => write!(f, "Install Ansible"),
            ProvisionStep::InstallCollection => write!(f, "Install Collection"),
            ProvisionStep::StageInventory => write!(f, "Stage Inventory"),
            ProvisionStep::EnsureKeyPair => write!(f, "Ensure SSH Key Pair"),
            ProvisionStep::EmitTrustCommands => write!(f, "Emit Trust Commands"),
        }
    }
}

impl ProvisionStep {
    pub fn applies_to(&self, role: NodeRole) -> bool {
        match self {
            ProvisionStep::EnsureAccount
            | ProvisionStep::SyncPackages
            | ProvisionStep::EnsureKeyPair => true,
            ProvisionStep::InstallTool
            | ProvisionStep::InstallCollection
            | ProvisionStep::StageInventory
            | ProvisionStep::EmitTrustCommands => role == NodeRole::Control,
        }
    }

    pub fn for_role(role: NodeRole) -> Vec<ProvisionStep> {
        ProvisionStep::iter()
            .filter(|step| step.applies_to(role))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step changed the host
    Applied,
    /// The host was already in the target state
    AlreadyDone,
    /// Disabled by configuration or nothing to act on
    Skipped,
    /// Failed, but configured as non-fatal
    FailedContinued(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: ProvisionStep,
    pub status: StepStatus,
}

/// Everything a run found out or produced, in the order the steps ran.
#[derive(Clone, Debug, Serialize)]
pub struct ProvisionReport {
    pub role: NodeRole,
    pub steps: Vec<StepRecord>,
    pub account: Option<Account>,
    pub package_manager: Option<PackageManager>,
    pub inventory: Option<InventoryOutcome>,
    pub key_paths: Option<KeyPaths>,
    pub trust: Option<TrustCommands>,
}

impl ProvisionReport {
    fn new(role: NodeRole) -> Self {
        Self {
            role,
            steps: vec![],
            account: None,
            package_manager: None,
            inventory: None,
            key_paths: None,
            trust: None,
        }
    }

    pub fn executed_steps(&self) -> Vec<ProvisionStep> {
        self.steps.iter().map(|record| record.step).collect()
    }

    pub fn status_of(&self, step: ProvisionStep) -> Option<&StepStatus> {
        self.steps
            .iter()
            .find(|record| record.step == step)
            .map(|record| &record.status)
    }
}

fn missing_precondition(step: ProvisionStep, what: &str) -> ProvisionError {
    ProvisionError::Input(format!("step '{step}' requires {what} from an earlier step"))
}

pub struct Provisioner<'a> {
    config: &'a ProvisionConfig,
    runner: &'a dyn CommandRunner,
    secrets: &'a dyn SecretProvider,
    peers: &'a dyn PeerListSource,
    fetcher: &'a dyn TemplateFetcher,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        config: &'a ProvisionConfig,
        runner: &'a dyn CommandRunner,
        secrets: &'a dyn SecretProvider,
        peers: &'a dyn PeerListSource,
        fetcher: &'a dyn TemplateFetcher,
    ) -> Self {
        Self {
            config,
            runner,
            secrets,
            peers,
            fetcher,
        }
    }

    /// Walk through every step that applies to `role`, stopping at the first fatal error.
    pub async fn run(&self, role: NodeRole) -> Result<ProvisionReport, ProvisionError> {
        tracing::info!("Starting [{}] installation", role);

        let mut report = ProvisionReport::new(role);

        for step in ProvisionStep::for_role(role) {
            tracing::info!("=== {} ===", step);

            let status = self.execute(step, &mut report).await?;
            tracing::info!("{}: {:?}", step, status);

            report.steps.push(StepRecord { step, status });
        }

        tracing::info!("[{}] installation complete", role);

        Ok(report)
    }

    async fn execute(
        &self,
        step: ProvisionStep,
        report: &mut ProvisionReport,
    ) -> Result<StepStatus, ProvisionError> {
        match step {
            ProvisionStep::EnsureAccount => {
                let result = ensure_account(self.runner, self.secrets, &self.config.account).await?;
                report.account = Some(result.account);

                Ok(if result.created {
                    StepStatus::Applied
                } else {
                    StepStatus::AlreadyDone
                })
            }
            ProvisionStep::SyncPackages => {
                let manager =
                    resolve_package_manager(self.runner, self.config.package_manager).await?;
                sync_packages(self.runner, manager).await?;
                report.package_manager = Some(manager);

                Ok(StepStatus::Applied)
            }
            ProvisionStep::InstallTool => {
                let account = report
                    .account
                    .as_ref()
                    .ok_or_else(|| missing_precondition(step, "the service account"))?;
                let manager = report
                    .package_manager
                    .ok_or_else(|| missing_precondition(step, "a package manager"))?;

                install_tool(
                    self.runner,
                    manager,
                    account,
                    &self.config.pip_package,
                    &self.config.tool_package,
                )
                .await?;

                Ok(StepStatus::Applied)
            }
            ProvisionStep::InstallCollection => {
                let Some(collection) = &self.config.collection else {
                    tracing::info!("No collection configured, skipping");
                    return Ok(StepStatus::Skipped);
                };

                let account = report
                    .account
                    .as_ref()
                    .ok_or_else(|| missing_precondition(step, "the service account"))?;

                match install_plugin(self.runner, account, collection).await {
                    Ok(()) => Ok(StepStatus::Applied),
                    Err(e @ ProvisionError::Collection { .. })
                        if self.config.collection_failure == FailurePolicy::Continue =>
                    {
                        tracing::warn!("Continuing despite collection failure: {}", e);
                        Ok(StepStatus::FailedContinued(e.to_string()))
                    }
                    Err(e) => Err(e),
                }
            }
            ProvisionStep::StageInventory => {
                let account = report
                    .account
                    .as_ref()
                    .ok_or_else(|| missing_precondition(step, "the service account"))?;

                let outcome = stage_inventory(
                    self.fetcher,
                    account,
                    &self.config.inventory_source,
                    self.config.fetch_timeout,
                )
                .await?;

                let status = match outcome {
                    InventoryOutcome::AlreadyPopulated { .. } => StepStatus::AlreadyDone,
                    _ => StepStatus::Applied,
                };
                report.inventory = Some(outcome);

                Ok(status)
            }
            ProvisionStep::EnsureKeyPair => {
                let account = report
                    .account
                    .as_ref()
                    .ok_or_else(|| missing_precondition(step, "the service account"))?;

                let label = host_label(self.runner).await?;

                let outcome =
                    ensure_keypair(self.runner, account, &label, || self.key_passphrase()).await?;
                report.key_paths = Some(outcome.paths);

                Ok(if outcome.generated {
                    StepStatus::Applied
                } else {
                    StepStatus::AlreadyDone
                })
            }
            ProvisionStep::EmitTrustCommands => {
                let account = report
                    .account
                    .as_ref()
                    .ok_or_else(|| missing_precondition(step, "the service account"))?;
                let key_paths = report
                    .key_paths
                    .as_ref()
                    .ok_or_else(|| missing_precondition(step, "a key pair"))?;

                let raw = self.peers.peer_list().map_err(|e| {
                    ProvisionError::Input(format!("unable to read the peer list: {e}"))
                })?;
                let peers = parse_peer_list(&raw)?;

                let trust = build_trust_commands(&key_paths.public_key, &account.name, &peers);
                let status = if trust.commands.is_empty() {
                    StepStatus::Skipped
                } else {
                    StepStatus::Applied
                };
                report.trust = Some(trust);

                Ok(status)
            }
        }
    }

    fn key_passphrase(&self) -> Result<Secret, ProvisionError> {
        match self.config.key_passphrase {
            PassphrasePolicy::Empty => Ok(Secret::new("")),
            PassphrasePolicy::Prompt => {
                let passphrase = self
                    .secrets
                    .get("Enter passphrase for the SSH key: ")
                    .map_err(|e| {
                        ProvisionError::Input(format!("unable to read the key passphrase: {e}"))
                    })?;

                if passphrase.is_empty() {
                    return Err(ProvisionError::Input(
                        "the key passphrase must not be empty".to_string(),
                    ));
                }

                Ok(passphrase)
            }
        }
    }
}
