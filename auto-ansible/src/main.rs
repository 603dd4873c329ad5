use std::{env, process::ExitCode};

use auto_ansible::{
    fetch::HttpTemplateFetcher,
    operator::{
        FileSecretProvider, PeerListSource, PromptSecretProvider, SecretProvider, StaticPeerList,
        StdinPeerList,
    },
    pipeline::{NodeRole, ProvisionReport, Provisioner},
    preflight::{check_privilege_marker, external_dependency_preflight_check},
    runner::SystemRunner,
    steps::inventory::InventoryOutcome,
};
use clap::Parser;
use cli::Cli;
use common::tracing::init_tracing;

mod cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version also end up here
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("auto-ansible: [!] {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    init_tracing("info")?;

    let sudo_user = check_privilege_marker(env::var_os("SUDO_USER"))?;
    tracing::debug!("Invoked via sudo by '{}'", sudo_user);

    let role = cli.role();
    let config = cli.provision_config();
    let runner = SystemRunner;

    if !cli.skip_preflight_checks {
        external_dependency_preflight_check(&runner, role).await?;
    }

    let secrets: Box<dyn SecretProvider> = match &cli.password_path {
        Some(path) => Box::new(FileSecretProvider::new(path)),
        None => Box::new(PromptSecretProvider),
    };

    let peers: Box<dyn PeerListSource> = match &cli.peers {
        Some(peers) => Box::new(StaticPeerList(peers.clone())),
        None => Box::new(StdinPeerList),
    };

    let fetcher = HttpTemplateFetcher::new();

    let report = Provisioner::new(
        &config,
        &runner,
        secrets.as_ref(),
        peers.as_ref(),
        &fetcher,
    )
    .run(role)
    .await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    Ok(())
}

fn print_summary(report: &ProvisionReport) {
    if let Some(InventoryOutcome::AlreadyPopulated { path, contents }) = &report.inventory {
        println!("Current inventory {}:", path.display());
        println!("{}", contents.trim_end());
        println!();
    }

    if let Some(trust) = &report.trust {
        if !trust.commands.is_empty() {
            println!("Run the following to share the public key with the other nodes:");
            for command in &trust.commands {
                println!("  {command}");
            }
            println!();
        }
    }

    if let Some(key_paths) = &report.key_paths {
        println!("Public key: {}", key_paths.public_key.display());
    }

    match (report.role, &report.account) {
        (NodeRole::Control, Some(account)) => {
            println!(
                "Control node ready. Edit {} with the host names and IP addresses of your nodes before running any playbooks.",
                account.inventory_path().display()
            );
        }
        (NodeRole::Worker, Some(account)) => {
            println!(
                "Worker node ready. Add this host to the inventory on the control node and share the control node's key with '{}'.",
                account.name
            );
        }
        (_, None) => {}
    }
}
