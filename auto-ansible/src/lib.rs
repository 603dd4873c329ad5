//! Prepares Linux hosts to take part in Ansible based configuration management: a dedicated
//! service account, the Ansible toolchain on the control node, an inventory to start from and
//! per-host SSH key pairs, with commands for the operator to establish trust between nodes.

#[cfg(not(unix))]
compile_error!("auto-ansible manages unix accounts and can only be built for unix targets");

pub mod config;
pub mod error;
pub mod fetch;
pub mod operator;
pub mod pipeline;
pub mod preflight;
pub mod runner;
pub mod steps;

#[cfg(test)]
mod testing;
