use std::time::Duration;

use crate::steps::packages::PackageManager;

pub const DEFAULT_ACCOUNT: &str = "ansible";
pub const DEFAULT_PIP_PACKAGE: &str = "python3-pip";
pub const DEFAULT_TOOL_PACKAGE: &str = "ansible-core";
pub const DEFAULT_COLLECTION: &str = "ansible.posix";
pub const DEFAULT_INVENTORY_URL: &str =
    "https://raw.githubusercontent.com/ToyoLandi/teleport-concept/refs/heads/main/ansible/hosts";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Where the initial inventory file comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InventorySource {
    /// Download a template, to be edited by the operator afterwards
    Remote(String),
    /// Create an empty file and leave it to the operator to populate
    Empty,
}

/// What to do when an optional step fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    Abort,
    Continue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassphrasePolicy {
    /// Generate keys without a passphrase. Only suitable for demo environments.
    Empty,
    /// Ask the operator for a non-empty passphrase
    Prompt,
}

#[derive(Clone, Debug)]
pub struct ProvisionConfig {
    pub account: String,
    /// Skip detection and use this package manager
    pub package_manager: Option<PackageManager>,
    pub pip_package: String,
    pub tool_package: String,
    pub collection: Option<String>,
    pub collection_failure: FailurePolicy,
    pub inventory_source: InventorySource,
    pub fetch_timeout: Duration,
    pub key_passphrase: PassphrasePolicy,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            account: DEFAULT_ACCOUNT.to_string(),
            package_manager: None,
            pip_package: DEFAULT_PIP_PACKAGE.to_string(),
            tool_package: DEFAULT_TOOL_PACKAGE.to_string(),
            collection: Some(DEFAULT_COLLECTION.to_string()),
            collection_failure: FailurePolicy::Abort,
            inventory_source: InventorySource::Remote(DEFAULT_INVENTORY_URL.to_string()),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            key_passphrase: PassphrasePolicy::Empty,
        }
    }
}
