use std::{path::PathBuf, time::Duration};

use auto_ansible::{
    config::{
        FailurePolicy, InventorySource, PassphrasePolicy, ProvisionConfig, DEFAULT_ACCOUNT,
        DEFAULT_COLLECTION, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_INVENTORY_URL, DEFAULT_PIP_PACKAGE,
        DEFAULT_TOOL_PACKAGE,
    },
    pipeline::NodeRole,
    steps::packages::PackageManager,
};
use clap::{ArgGroup, Parser};

/// Prepare a host to take part in Ansible based configuration management.
///
/// Must be run with sudo. A control node gets the full toolchain and an inventory, a worker
/// node only gets the service account and an SSH key pair.
#[derive(Parser, Debug)]
#[clap(name = "auto-ansible", version)]
#[clap(group(ArgGroup::new("role").required(true).args(["control_node", "worker_node"])))]
pub struct Cli {
    /// Set this host up as the node Ansible is run from
    #[clap(long)]
    pub control_node: bool,
    /// Set this host up as a node managed by a control node
    #[clap(long)]
    pub worker_node: bool,

    /// Name of the service account Ansible connects as
    #[clap(long, env = "AUTO_ANSIBLE_ACCOUNT", default_value = DEFAULT_ACCOUNT)]
    pub account: String,
    /// Read the service account password from this file instead of prompting for it
    #[clap(long, env = "AUTO_ANSIBLE_PASSWORD_PATH")]
    pub password_path: Option<PathBuf>,

    /// Use this package manager instead of probing for one
    #[clap(long, env = "AUTO_ANSIBLE_PACKAGE_MANAGER", value_enum)]
    pub package_manager: Option<PackageManager>,
    /// OS package providing pip
    #[clap(long, env = "AUTO_ANSIBLE_PIP_PACKAGE", default_value = DEFAULT_PIP_PACKAGE)]
    pub pip_package: String,
    /// pip package providing the Ansible engine
    #[clap(long, env = "AUTO_ANSIBLE_TOOL_PACKAGE", default_value = DEFAULT_TOOL_PACKAGE)]
    pub tool_package: String,

    /// Ansible collection to install on the control node
    #[clap(long, env = "AUTO_ANSIBLE_COLLECTION", default_value = DEFAULT_COLLECTION)]
    pub collection: String,
    #[clap(long)]
    pub skip_collection: bool,
    /// Treat a failed collection install as a warning
    #[clap(long)]
    pub continue_on_collection_failure: bool,

    /// Inventory template downloaded when the control node has no inventory yet
    #[clap(long, env = "AUTO_ANSIBLE_INVENTORY_URL", default_value = DEFAULT_INVENTORY_URL)]
    pub inventory_url: String,
    /// Create an empty inventory instead of downloading the template
    #[clap(long)]
    pub no_inventory_fetch: bool,
    #[clap(long, env = "AUTO_ANSIBLE_FETCH_TIMEOUT_SECS", default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
    pub fetch_timeout_secs: u64,

    /// Protect the generated SSH key with a passphrase. Without this flag the key has an
    /// empty passphrase, which is only suitable for demo environments.
    #[clap(long)]
    pub prompt_key_passphrase: bool,
    /// Comma separated addresses of the other nodes, prompted for when not given
    #[clap(long, env = "AUTO_ANSIBLE_PEERS")]
    pub peers: Option<String>,

    #[clap(long)]
    pub skip_preflight_checks: bool,
    /// Print a JSON report of the run on stdout
    #[clap(long)]
    pub json: bool,
}

impl Cli {
    pub fn role(&self) -> NodeRole {
        if self.control_node {
            NodeRole::Control
        } else {
            NodeRole::Worker
        }
    }

    pub fn provision_config(&self) -> ProvisionConfig {
        ProvisionConfig {
            account: self.account.clone(),
            package_manager: self.package_manager,
            pip_package: self.pip_package.clone(),
            tool_package: self.tool_package.clone(),
            collection: (!self.skip_collection).then(|| self.collection.clone()),
            collection_failure: if self.continue_on_collection_failure {
                FailurePolicy::Continue
            } else {
                FailurePolicy::Abort
            },
            inventory_source: if self.no_inventory_fetch {
                InventorySource::Empty
            } else {
                InventorySource::Remote(self.inventory_url.clone())
            },
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            key_passphrase: if self.prompt_key_passphrase {
                PassphrasePolicy::Prompt
            } else {
                PassphrasePolicy::Empty
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use auto_ansible::{
        config::{FailurePolicy, InventorySource, PassphrasePolicy, DEFAULT_INVENTORY_URL},
        pipeline::NodeRole,
        steps::packages::PackageManager,
    };
    use clap::{error::ErrorKind, CommandFactory, Parser};

    use super::Cli;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exactly_one_role_is_required() {
        let none = Cli::try_parse_from(["auto-ansible"]).unwrap_err();
        assert_eq!(none.kind(), ErrorKind::MissingRequiredArgument);

        let both = Cli::try_parse_from(["auto-ansible", "--control-node", "--worker-node"])
            .unwrap_err();
        assert_eq!(both.kind(), ErrorKind::ArgumentConflict);

        let unknown = Cli::try_parse_from(["auto-ansible", "--control-nod"]).unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn defaults_match_the_demo_setup() {
        let cli = Cli::try_parse_from(["auto-ansible", "--worker-node"]).unwrap();

        assert_eq!(cli.role(), NodeRole::Worker);

        let config = cli.provision_config();
        assert_eq!(config.account, "ansible");
        assert_eq!(config.package_manager, None);
        assert_eq!(config.collection.as_deref(), Some("ansible.posix"));
        assert_eq!(config.collection_failure, FailurePolicy::Abort);
        assert_eq!(
            config.inventory_source,
            InventorySource::Remote(DEFAULT_INVENTORY_URL.to_string())
        );
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.key_passphrase, PassphrasePolicy::Empty);
    }

    #[test]
    fn flags_are_mapped_onto_the_config() {
        let cli = Cli::try_parse_from([
            "auto-ansible",
            "--control-node",
            "--package-manager",
            "apt-get",
            "--skip-collection",
            "--no-inventory-fetch",
            "--fetch-timeout-secs",
            "5",
            "--prompt-key-passphrase",
            "--peers",
            "10.0.0.2,10.0.0.3",
        ])
        .unwrap();

        assert_eq!(cli.role(), NodeRole::Control);
        assert_eq!(cli.peers.as_deref(), Some("10.0.0.2,10.0.0.3"));

        let config = cli.provision_config();
        assert_eq!(config.package_manager, Some(PackageManager::AptGet));
        assert_eq!(config.collection, None);
        assert_eq!(config.inventory_source, InventorySource::Empty);
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.key_passphrase, PassphrasePolicy::Prompt);
    }
}
