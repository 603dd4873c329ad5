//! Input the operator supplies while the sequence runs: the account password, an optional
//! key passphrase and the list of peer nodes.

use std::{
    fs::read_to_string,
    io::{self, Write},
    path::PathBuf,
};

use common::Secret;
use rpassword::prompt_password;

pub trait SecretProvider {
    fn get(&self, prompt: &str) -> io::Result<Secret>;
}

/// Prompts on the terminal with echo disabled, asking twice to catch typos.
pub struct PromptSecretProvider;

impl SecretProvider for PromptSecretProvider {
    fn get(&self, prompt: &str) -> io::Result<Secret> {
        let secret = prompt_password(prompt)?;
        if secret.trim().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "An empty value is not allowed",
            ));
        }

        let confirm = prompt_password("Confirm: ")?;

        if secret != confirm {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Provided values did not match",
            ));
        }

        Ok(Secret::new(secret.trim()))
    }
}

/// Reads the secret from a file, ignoring surrounding whitespace. Useful for unattended runs.
pub struct FileSecretProvider {
    path: PathBuf,
}

impl FileSecretProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SecretProvider for FileSecretProvider {
    fn get(&self, _prompt: &str) -> io::Result<Secret> {
        let contents = read_to_string(&self.path)?;
        Ok(Secret::new(contents.trim()))
    }
}

/// Supplies the raw, comma separated list of peer addresses.
pub trait PeerListSource {
    fn peer_list(&self) -> io::Result<String>;
}

pub struct StaticPeerList(pub String);

impl PeerListSource for StaticPeerList {
    fn peer_list(&self) -> io::Result<String> {
        Ok(self.0.clone())
    }
}

pub struct StdinPeerList;

impl PeerListSource for StdinPeerList {
    fn peer_list(&self) -> io::Result<String> {
        print!("Enter the addresses of the other nodes, separated by commas: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().to_string())
    }
}
