//! hopbox - disposable SSH jump host for private Azure VMs
//!
//! Finds the target VM, provisions a throwaway jump host on the same
//! virtual network, opens a local SSH tunnel through it, and removes every
//! created resource when the session ends.

mod console;
mod ssh;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use hopbox_arm::{ArmClient, AzCliTokenProvider};
use hopbox_jump::{IpifyResolver, JumpHost, SessionContext, VmLocator};
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hopbox", version)]
#[command(about = "Open an SSH tunnel to a private Azure VM through a disposable jump host")]
struct Cli {
    /// Subscription id or display name (interactive pick when omitted)
    #[arg(short, long, env = "HOPBOX_SUBSCRIPTION")]
    subscription: Option<String>,

    /// Resource group of the target VM (interactive pick when omitted)
    #[arg(short = 'r', long = "resource-group", env = "HOPBOX_RESOURCE_GROUP")]
    resource_group: Option<String>,

    /// Private IP address of the target VM (interactive pick when omitted)
    #[arg(short = 'i', long = "vm-ip")]
    vm_ip: Option<IpAddr>,

    /// Admin user created on the jump host
    #[arg(short, long, default_value = "hopbox")]
    user: String,

    /// VM size for the jump host
    #[arg(long, default_value = "Standard_F1S")]
    vm_size: String,

    /// Local port the tunnel listens on
    #[arg(short, long, default_value_t = 50022)]
    local_port: u16,

    /// Port to reach on the target VM
    #[arg(short = 'p', long, default_value_t = 22)]
    remote_port: u16,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{}", "interrupted, cleaning up...".yellow());
                cancel.cancel();
            }
        });
    }

    run(cli, &cancel).await
}

async fn run(cli: Cli, cancel: &CancellationToken) -> anyhow::Result<()> {
    let auth = Arc::new(AzCliTokenProvider::new());

    // Subscription and group are not known yet, so discovery runs against
    // a client without a default subscription.
    let discovery = Arc::new(ArmClient::new(auth.clone()));
    let locator = VmLocator::new(discovery, Arc::new(console::ConsoleSelection));
    let target = cli.vm_ip.map(|ip| ip.to_string());
    let ctx = locator
        .locate(
            cli.subscription.as_deref(),
            cli.resource_group.as_deref(),
            target.as_deref(),
            cancel,
        )
        .await
        .context("could not locate the target VM")?;
    println!(
        "{} {} in {} ({})",
        "target:".cyan().bold(),
        ctx.target_ip,
        ctx.resource_group,
        ctx.location
    );

    let key = ssh::ensure_key_pair().await?;
    let journal_dir = dirs::home_dir()
        .context("could not determine the home directory")?
        .join(".hopbox");

    let arm = Arc::new(ArmClient::new(auth).for_subscription(&ctx.subscription_id));
    let mut host = JumpHost::new(arm, Arc::new(IpifyResolver::new()), ctx.clone())
        .with_journal_dir(&journal_dir);

    println!(
        "{}",
        "provisioning the jump host (this takes a few minutes)...".green()
    );
    let outcome = session(&mut host, &cli, &key, &ctx, cancel).await;

    // deploy_and_start already rolled back on failure; the ledger is
    // drained by then and this becomes a no-op.
    if host.teardown().await {
        println!("{}", "all session resources removed".green());
    } else {
        eprintln!(
            "{} the journal in {} lists what is still standing",
            "some resources could not be removed;".red().bold(),
            journal_dir.display()
        );
    }
    outcome
}

/// Everything between a successful context resolution and teardown.
async fn session(
    host: &mut JumpHost,
    cli: &Cli,
    key: &ssh::KeyPair,
    ctx: &SessionContext,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    host.deploy_and_start(&cli.user, &key.public, &cli.vm_size, cancel)
        .await?;
    let jump_address = host.public_ip_address(cancel).await?;

    let mut tunnel = ssh::open_tunnel(
        key,
        &cli.user,
        jump_address,
        ctx.target_ip,
        cli.local_port,
        cli.remote_port,
    )?;
    println!(
        "{} ssh -p {} <user>@127.0.0.1  (via {})",
        "tunnel ready:".green().bold(),
        cli.local_port,
        jump_address
    );
    println!("{}", "press Ctrl-C to end the session".dimmed());

    tokio::select! {
        _ = cancel.cancelled() => {
            tunnel.kill().await.ok();
        }
        status = tunnel.wait() => {
            let status = status?;
            if !status.success() {
                tracing::warn!(%status, "tunnel process ended abnormally");
            }
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "hopbox=debug,hopbox_arm=debug,hopbox_jump=debug"
    } else {
        "hopbox=info,hopbox_arm=info,hopbox_jump=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
