//! In-memory stand-ins for the host, the operator and the network, so the provisioning steps
//! can run against a temporary directory instead of a real machine.

use std::{
    collections::{HashMap, HashSet},
    fs,
    io,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use common::Secret;

use crate::{
    error::FetchError,
    fetch::TemplateFetcher,
    operator::SecretProvider,
    runner::{CommandOutput, CommandRunner, Invocation},
    steps::account::Account,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub env: Vec<(String, String)>,
    pub run_as: Option<String>,
}

#[derive(Default)]
struct HostState {
    accounts: HashMap<String, Account>,
    passwords: HashMap<String, String>,
    invocations: Vec<RecordedInvocation>,
}

/// Simulates the handful of system tools the provisioning steps call. Account homes are
/// created under `home_root`, owned by whoever runs the tests.
pub struct FakeHost {
    home_root: PathBuf,
    uid: u32,
    gid: u32,
    hostname: String,
    failures: HashMap<String, (i32, String)>,
    missing_binaries: HashSet<String>,
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn new(home_root: &Path) -> Self {
        let metadata = fs::metadata(home_root).unwrap();

        Self {
            home_root: home_root.to_path_buf(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            hostname: "node1".to_string(),
            failures: HashMap::new(),
            missing_binaries: HashSet::new(),
            state: Mutex::new(HostState::default()),
        }
    }

    pub fn with_account(self, name: &str) -> Self {
        let account = self.new_account(name);
        fs::create_dir_all(&account.home).unwrap();
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(name.to_string(), account);
        self
    }

    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = hostname.to_string();
        self
    }

    /// Make every invocation of `program` exit with `code` and `stderr`
    pub fn failing(mut self, program: &str, code: i32, stderr: &str) -> Self {
        self.failures
            .insert(program.to_string(), (code, stderr.to_string()));
        self
    }

    /// Make `which <binary>` report the binary as absent
    pub fn without_binary(mut self, binary: &str) -> Self {
        self.missing_binaries.insert(binary.to_string());
        self
    }

    pub fn account(&self, name: &str) -> Account {
        self.state.lock().unwrap().accounts[name].clone()
    }

    pub fn account_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().accounts.contains_key(name)
    }

    pub fn password(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().passwords.get(name).cloned()
    }

    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.state.lock().unwrap().invocations.clone()
    }

    pub fn invocations_of(&self, program: &str) -> Vec<RecordedInvocation> {
        self.invocations()
            .into_iter()
            .filter(|invocation| invocation.program == program)
            .collect()
    }

    pub fn programs(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .map(|invocation| invocation.program)
            .collect()
    }

    pub fn count(&self, program: &str) -> usize {
        self.invocations_of(program).len()
    }

    fn new_account(&self, name: &str) -> Account {
        Account {
            name: name.to_string(),
            uid: self.uid,
            gid: self.gid,
            home: self.home_root.join(name),
        }
    }

    fn simulate(&self, program: &str, args: &[String], stdin: Option<&str>) -> CommandOutput {
        let mut state = self.state.lock().unwrap();

        match program {
            "getent" => match args.get(1).and_then(|name| state.accounts.get(name)) {
                Some(account) => ok(format!(
                    "{}:x:{}:{}::{}:/bin/bash\n",
                    account.name,
                    account.uid,
                    account.gid,
                    account.home.display()
                )),
                None => exit(2, ""),
            },
            "useradd" => {
                let name = args.last().cloned().unwrap_or_default();
                if state.accounts.contains_key(&name) {
                    return exit(9, &format!("useradd: user '{name}' already exists"));
                }

                let account = self.new_account(&name);
                fs::create_dir_all(&account.home).unwrap();
                state.accounts.insert(name, account);
                ok(String::new())
            }
            "userdel" => {
                let name = args.last().cloned().unwrap_or_default();
                match state.accounts.remove(&name) {
                    Some(account) => {
                        if account.home.exists() {
                            fs::remove_dir_all(&account.home).unwrap();
                        }
                        state.passwords.remove(&name);
                        ok(String::new())
                    }
                    None => exit(6, &format!("userdel: user '{name}' does not exist")),
                }
            }
            "chpasswd" => {
                let payload = stdin.unwrap_or_default().trim();
                match payload.split_once(':') {
                    Some((name, password)) if state.accounts.contains_key(name) => {
                        state
                            .passwords
                            .insert(name.to_string(), password.to_string());
                        ok(String::new())
                    }
                    _ => exit(1, "chpasswd: line 1: user not found"),
                }
            }
            "which" => {
                let binary = args.first().cloned().unwrap_or_default();
                if self.missing_binaries.contains(&binary) {
                    exit(1, "")
                } else {
                    ok(format!("/usr/bin/{binary}\n"))
                }
            }
            "uname" => ok(format!("{}\n", self.hostname)),
            "ssh-keygen" => {
                let private_key = args
                    .iter()
                    .position(|arg| arg == "-f")
                    .and_then(|index| args.get(index + 1))
                    .cloned()
                    .unwrap_or_default();
                fs::write(&private_key, "PRIVATE KEY").unwrap();
                fs::write(format!("{private_key}.pub"), "ssh-rsa AAAA").unwrap();
                ok(String::new())
            }
            _ => ok(String::new()),
        }
    }
}

fn ok(stdout: String) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout,
        stderr: String::new(),
    }
}

fn exit(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl CommandRunner for FakeHost {
    async fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        let recorded = RecordedInvocation {
            program: invocation.program().to_string(),
            args: invocation.argv().into_iter().map(str::to_string).collect(),
            stdin: invocation
                .stdin_payload()
                .map(|payload| payload.expose().to_string()),
            env: invocation.env_vars().to_vec(),
            run_as: invocation.identity().map(|account| account.name.clone()),
        };

        self.state
            .lock()
            .unwrap()
            .invocations
            .push(recorded.clone());

        if let Some((code, stderr)) = self.failures.get(&recorded.program) {
            return Ok(exit(*code, stderr));
        }

        Ok(self.simulate(
            &recorded.program,
            &recorded.args,
            recorded.stdin.as_deref(),
        ))
    }
}

/// Answers every prompt with the same value.
pub struct CannedSecrets {
    value: String,
    calls: AtomicUsize,
}

impl CannedSecrets {
    pub fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SecretProvider for CannedSecrets {
    fn get(&self, _prompt: &str) -> io::Result<Secret> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Secret::new(self.value.clone()))
    }
}

enum CannedResponse {
    Body(Vec<u8>),
    Timeout,
}

pub struct CannedFetcher {
    response: CannedResponse,
    requests: Mutex<Vec<(String, Duration)>>,
}

impl CannedFetcher {
    pub fn body(body: &str) -> Self {
        Self {
            response: CannedResponse::Body(body.as_bytes().to_vec()),
            requests: Mutex::new(vec![]),
        }
    }

    pub fn timeout() -> Self {
        Self {
            response: CannedResponse::Timeout,
            requests: Mutex::new(vec![]),
        }
    }

    pub fn requests(&self) -> Vec<(String, Duration)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TemplateFetcher for CannedFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), timeout));

        match &self.response {
            CannedResponse::Body(body) => Ok(body.clone()),
            CannedResponse::Timeout => Err(FetchError::Timeout(timeout)),
        }
    }
}
