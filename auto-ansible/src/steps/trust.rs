use std::{fmt, net::IpAddr, path::Path, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::error::ProvisionError;

const MAX_HOSTNAME_LEN: usize = 253;
const HOSTNAME_REGEX_STR: &str =
    r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$";

lazy_static! {
    static ref HOSTNAME_REGEX: Regex = Regex::new(HOSTNAME_REGEX_STR).unwrap();
}

/// A peer node, given either as an IP address or as a DNS host name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PeerAddress(String);

impl FromStr for PeerAddress {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let is_ip = s.parse::<IpAddr>().is_ok();
        let is_hostname = s.len() <= MAX_HOSTNAME_LEN && HOSTNAME_REGEX.is_match(s);

        if is_ip || is_hostname {
            Ok(PeerAddress(s.to_string()))
        } else {
            Err(ProvisionError::Input(format!(
                "'{s}' is not an IP address or host name"
            )))
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Split an operator-entered, comma separated list of peers. Blank entries and duplicates
/// are dropped; any other malformed entry rejects the whole list.
pub fn parse_peer_list(raw: &str) -> Result<Vec<PeerAddress>, ProvisionError> {
    let mut peers: Vec<PeerAddress> = vec![];

    for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let peer = entry.parse::<PeerAddress>()?;
        if !peers.contains(&peer) {
            peers.push(peer);
        }
    }

    Ok(peers)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TrustCommands {
    pub commands: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// One `ssh-copy-id` command per peer, for the operator to run by hand.
///
/// These are never executed here: accepting the peer's host key fingerprint and
/// authenticating to the peer both need the operator.
pub fn build_trust_commands(
    public_key: &Path,
    account: &str,
    peers: &[PeerAddress],
) -> TrustCommands {
    if peers.is_empty() {
        let warning = "No peer nodes supplied, the public key will not be shared".to_string();
        tracing::warn!("{}", warning);

        return TrustCommands {
            commands: vec![],
            warning: Some(warning),
        };
    }

    let commands = peers
        .iter()
        .map(|peer| {
            format!(
                "ssh-copy-id -i {} {}@{}",
                public_key.display(),
                account,
                peer
            )
        })
        .collect();

    TrustCommands {
        commands,
        warning: None,
    }
}
