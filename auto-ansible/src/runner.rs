//! Every host mutation that is not a plain filesystem write goes through a [`CommandRunner`].
//!
//! Commands are never passed through a shell: an [`Invocation`] is a program and an argument
//! vector. Running a command as the service account drops privileges in the child process
//! (uid, gid and supplementary groups) instead of wrapping the command line in `su -c`.

use std::{fmt, io, process::Stdio};

use async_trait::async_trait;
use common::Secret;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::{error::ProvisionError, steps::account::Account};

#[derive(Clone, Debug)]
enum Arg {
    Plain(String),
    Secret(Secret),
}

impl Arg {
    fn expose(&self) -> &str {
        match self {
            Arg::Plain(arg) => arg,
            Arg::Secret(secret) => secret.expose(),
        }
    }
}

/// A single external command: program, arguments, optional stdin payload and the
/// identity it should run under.
#[derive(Clone, Debug)]
pub struct Invocation {
    program: String,
    args: Vec<Arg>,
    stdin: Option<Secret>,
    env: Vec<(String, String)>,
    run_as: Option<Account>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            stdin: None,
            env: vec![],
            run_as: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Plain(arg.into()));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args
            .extend(args.into_iter().map(|arg| Arg::Plain(arg.into())));
        self
    }

    /// An argument that must not show up in logs, it is still visible in the process list
    pub fn secret_arg(mut self, secret: Secret) -> Self {
        self.args.push(Arg::Secret(secret));
        self
    }

    /// Data written to the child's stdin, used to hand over secrets without putting them on
    /// the command line.
    pub fn stdin(mut self, payload: Secret) -> Self {
        self.stdin = Some(payload);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn as_user(mut self, account: &Account) -> Self {
        self.run_as = Some(account.clone());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn argv(&self) -> Vec<&str> {
        self.args.iter().map(Arg::expose).collect()
    }

    pub fn stdin_payload(&self) -> Option<&Secret> {
        self.stdin.as_ref()
    }

    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn identity(&self) -> Option<&Account> {
        self.run_as.as_ref()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            match arg {
                Arg::Plain(arg) => write!(f, " {arg}")?,
                Arg::Secret(secret) => write!(f, " {secret}")?,
            }
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", stderr) => stderr.to_string(),
            (stdout, "") => stdout.to_string(),
            (stdout, stderr) => format!("{stdout}\n{stderr}"),
        }
    }
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}")?,
            None => f.write_str("terminated by signal")?,
        }

        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            write!(f, "\nstdout:\n{stdout}")?;
        }

        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            write!(f, "\nstderr:\n{stderr}")?;
        }

        Ok(())
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the invocation to completion. An `Err` means the process could not be started
    /// or waited on, a non-zero exit is reported through [`CommandOutput::code`].
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput>;
}

/// Spawns real processes on the local host.
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        let mut command = tokio::process::Command::new(invocation.program());

        command
            .args(invocation.argv())
            .kill_on_drop(true)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin_payload().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        for (key, value) in invocation.env_vars() {
            command.env(key, value);
        }

        if let Some(account) = invocation.identity() {
            // When the parent is root, setting the uid also clears supplementary groups
            command
                .uid(account.uid)
                .gid(account.gid)
                .current_dir(&account.home)
                .env("HOME", &account.home)
                .env("USER", &account.name)
                .env("LOGNAME", &account.name);
        }

        let mut child = command.spawn()?;

        if let Some(payload) = invocation.stdin_payload() {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(payload.expose().as_bytes()).await?;
                stdin.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run a command in the invoking (privileged) context.
pub async fn execute(
    runner: &dyn CommandRunner,
    invocation: &Invocation,
) -> Result<CommandOutput, ProvisionError> {
    match invocation.identity() {
        Some(account) => tracing::debug!("Running `{}` as '{}'", invocation, account.name),
        None => tracing::debug!("Running `{}`", invocation),
    }

    let output = runner
        .run(invocation)
        .await
        .map_err(|source| ProvisionError::Spawn {
            program: invocation.program().to_string(),
            source,
        })?;

    if output.success() {
        let combined = output.combined();
        if !combined.is_empty() {
            tracing::debug!("{} output:\n{}", invocation.program(), combined);
        }
    } else {
        tracing::debug!("`{}` failed with {}", invocation, output);
    }

    Ok(output)
}

/// Run a command in the security context of `account`.
pub async fn run_as(
    runner: &dyn CommandRunner,
    account: &Account,
    invocation: Invocation,
) -> Result<CommandOutput, ProvisionError> {
    execute(runner, &invocation.as_user(account)).await
}

/// Checks whether `binary` resolves on the `PATH` of the invoking context.
pub async fn binary_available(
    runner: &dyn CommandRunner,
    binary: &str,
) -> Result<bool, ProvisionError> {
    let output = execute(runner, &Invocation::new("which").arg(binary)).await?;
    Ok(output.success())
}
