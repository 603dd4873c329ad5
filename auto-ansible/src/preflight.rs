//! Checks run before touching the host, so a run doesn't fail halfway through because it
//! was started without privileges or on a system missing a basic tool.

use std::ffi::OsString;

use crate::{
    error::ProvisionError,
    pipeline::NodeRole,
    runner::{binary_available, CommandRunner},
};

#[derive(Clone, Copy, Debug)]
pub struct ExternalDependency {
    pub binary: &'static str,
    pub install_advice: &'static str,
}

impl ExternalDependency {
    pub const fn new(binary: &'static str, install_advice: &'static str) -> Self {
        Self {
            binary,
            install_advice,
        }
    }
}

const ACCOUNT_TOOLS_ADVICE: &str =
    "Install your distribution's shadow-utils (RHEL, SUSE) or passwd (Debian) package";

pub const GETENT: ExternalDependency = ExternalDependency::new(
    "getent",
    "Install your distribution's glibc-common (RHEL) or libc-bin (Debian) package",
);
pub const USERADD: ExternalDependency = ExternalDependency::new("useradd", ACCOUNT_TOOLS_ADVICE);
pub const USERDEL: ExternalDependency = ExternalDependency::new("userdel", ACCOUNT_TOOLS_ADVICE);
pub const CHPASSWD: ExternalDependency = ExternalDependency::new("chpasswd", ACCOUNT_TOOLS_ADVICE);
pub const UNAME: ExternalDependency =
    ExternalDependency::new("uname", "Install your distribution's coreutils package");
pub const SSH_KEYGEN: ExternalDependency = ExternalDependency::new(
    "ssh-keygen",
    "Install your distribution's openssh-clients (RHEL, SUSE) or openssh-client (Debian) package",
);
pub const PYTHON3: ExternalDependency =
    ExternalDependency::new("python3", "Install your distribution's python3 package");

const COMMON_DEPENDENCIES: [ExternalDependency; 6] =
    [GETENT, USERADD, USERDEL, CHPASSWD, UNAME, SSH_KEYGEN];

pub fn dependencies_for(role: NodeRole) -> Vec<ExternalDependency> {
    let mut dependencies = COMMON_DEPENDENCIES.to_vec();
    if role == NodeRole::Control {
        dependencies.push(PYTHON3);
    }
    dependencies
}

/// The installer must be started through `sudo`, which leaves the name of the invoking user
/// in `SUDO_USER`.
pub fn check_privilege_marker(sudo_user: Option<OsString>) -> Result<String, ProvisionError> {
    match sudo_user {
        Some(user) if !user.is_empty() => Ok(user.to_string_lossy().into_owned()),
        _ => Err(ProvisionError::Preflight(
            "This script must be run with sudo, e.g. `sudo auto-ansible --control-node`"
                .to_string(),
        )),
    }
}

pub async fn external_dependency_preflight_check(
    runner: &dyn CommandRunner,
    role: NodeRole,
) -> Result<(), ProvisionError> {
    let mut missing = vec![];

    for dep in dependencies_for(role) {
        if !binary_available(runner, dep.binary).await? {
            tracing::error!(
                "Binary '{}' not found or not executable. {}",
                dep.binary,
                dep.install_advice
            );
            missing.push(dep.binary);
        }
    }

    if !missing.is_empty() {
        return Err(ProvisionError::Preflight(format!(
            "One or more missing dependencies found: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use crate::{error::ProvisionError, pipeline::NodeRole, testing::FakeHost};

    use super::{check_privilege_marker, external_dependency_preflight_check};

    #[test]
    fn privilege_marker_must_be_present_and_non_empty() {
        assert_eq!(
            check_privilege_marker(Some(OsString::from("alice"))).unwrap(),
            "alice"
        );
        assert!(matches!(
            check_privilege_marker(None),
            Err(ProvisionError::Preflight(_))
        ));
        assert!(matches!(
            check_privilege_marker(Some(OsString::new())),
            Err(ProvisionError::Preflight(_))
        ));
    }

    #[tokio::test]
    async fn worker_does_not_need_python() {
        let root = tempfile::tempdir().unwrap();
        let host = FakeHost::new(root.path()).without_binary("python3");

        external_dependency_preflight_check(&host, NodeRole::Worker)
            .await
            .unwrap();

        assert_eq!(host.count("which"), 6);
    }

    #[tokio::test]
    async fn every_missing_binary_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let host = FakeHost::new(root.path())
            .without_binary("python3")
            .without_binary("ssh-keygen");

        let err = external_dependency_preflight_check(&host, NodeRole::Control)
            .await
            .unwrap_err();

        match err {
            ProvisionError::Preflight(message) => {
                assert!(message.contains("ssh-keygen, python3"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(host.count("which"), 7);
    }
}
