use std::fmt;

use clap::ValueEnum;
use serde::Serialize;
use strum::{EnumIter, IntoEnumIterator};

use crate::{
    error::ProvisionError,
    runner::{binary_available, execute, CommandRunner, Invocation},
};

/// The OS package managers we know how to drive, in order of preference when probing.
///
/// `dnf` is listed before `yum` since newer RHEL-like systems ship a `yum` compatibility
/// shim that points at `dnf`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageManager {
    Dnf,
    Yum,
    #[value(name = "apt-get")]
    AptGet,
    Zypper,
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

impl PackageManager {
    pub fn binary(&self) -> &'static str {
        match self {
            PackageManager::Dnf => "dnf",
            PackageManager::Yum => "yum",
            PackageManager::AptGet => "apt-get",
            PackageManager::Zypper => "zypper",
        }
    }

    fn refresh_invocation(&self) -> Invocation {
        match self {
            PackageManager::Dnf | PackageManager::Yum => {
                Invocation::new(self.binary()).args(["makecache", "-y"])
            }
            PackageManager::AptGet => Invocation::new(self.binary())
                .arg("update")
                .env("DEBIAN_FRONTEND", "noninteractive"),
            PackageManager::Zypper => {
                Invocation::new(self.binary()).args(["--non-interactive", "refresh"])
            }
        }
    }

    fn install_invocation(&self, package: &str) -> Invocation {
        match self {
            PackageManager::Dnf | PackageManager::Yum => Invocation::new(self.binary())
                .args(["install", "-y"])
                .arg(package),
            PackageManager::AptGet => Invocation::new(self.binary())
                .args(["install", "-y"])
                .arg(package)
                .env("DEBIAN_FRONTEND", "noninteractive"),
            PackageManager::Zypper => Invocation::new(self.binary())
                .args(["--non-interactive", "install"])
                .arg(package),
        }
    }

    /// Pick the first supported package manager present on the host.
    pub async fn detect(runner: &dyn CommandRunner) -> Result<Self, ProvisionError> {
        for candidate in PackageManager::iter() {
            if binary_available(runner, candidate.binary()).await? {
                tracing::info!("Using package manager '{}'", candidate);
                return Ok(candidate);
            }
        }

        let tried = PackageManager::iter()
            .map(|candidate| candidate.binary())
            .collect::<Vec<_>>()
            .join(", ");

        Err(ProvisionError::PackageManagerNotFound { tried })
    }

    /// Refresh the package index.
    pub async fn sync(&self, runner: &dyn CommandRunner) -> Result<(), ProvisionError> {
        tracing::info!("Refreshing package index with '{}'", self);

        let output = execute(runner, &self.refresh_invocation()).await?;
        if !output.success() {
            return Err(ProvisionError::PackageManager {
                manager: *self,
                action: "refresh the package index",
                output,
            });
        }

        Ok(())
    }

    /// Install an OS package. Installing an already present package is a no-op for every
    /// supported manager.
    pub async fn install(
        &self,
        runner: &dyn CommandRunner,
        package: &str,
    ) -> Result<(), ProvisionError> {
        tracing::info!("Installing '{}' with '{}'", package, self);

        let output = execute(runner, &self.install_invocation(package)).await?;
        if !output.success() {
            return Err(ProvisionError::Install {
                package: package.to_string(),
                output,
            });
        }

        Ok(())
    }
}

/// Resolve the package manager, either the one configured or the first one found.
pub async fn resolve_package_manager(
    runner: &dyn CommandRunner,
    configured: Option<PackageManager>,
) -> Result<PackageManager, ProvisionError> {
    match configured {
        Some(manager) => {
            tracing::info!("Using configured package manager '{}'", manager);
            Ok(manager)
        }
        None => PackageManager::detect(runner).await,
    }
}

pub async fn sync_packages(
    runner: &dyn CommandRunner,
    manager: PackageManager,
) -> Result<(), ProvisionError> {
    manager.sync(runner).await
}
