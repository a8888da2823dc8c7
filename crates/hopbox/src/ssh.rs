//! Local SSH helpers
//!
//! Key generation and tunnel setup shell out to the OpenSSH client tools
//! already installed on the operator's machine.

use anyhow::{Context, bail};
use std::net::IpAddr;
use std::path::PathBuf;
use tokio::fs;
use tokio::process::{Child, Command};

const KEY_FILE: &str = "hopbox_rsa";

pub struct KeyPair {
    pub private_path: PathBuf,
    pub public: String,
}

/// Return the session key pair, generating it on first use.
///
/// The pair lives in `~/.ssh/hopbox_rsa` and is reused across sessions so
/// repeated runs do not litter the agent with one-off keys.
pub async fn ensure_key_pair() -> anyhow::Result<KeyPair> {
    let ssh_dir = dirs::home_dir()
        .context("could not determine the home directory")?
        .join(".ssh");
    let private_path = ssh_dir.join(KEY_FILE);
    let public_path = ssh_dir.join(format!("{KEY_FILE}.pub"));

    if !private_path.exists() {
        fs::create_dir_all(&ssh_dir).await?;
        tracing::info!(path = %private_path.display(), "generating SSH key pair");
        let status = Command::new("ssh-keygen")
            .args(["-t", "rsa", "-b", "4096", "-q", "-N", ""])
            .arg("-f")
            .arg(&private_path)
            .status()
            .await
            .context("failed to run ssh-keygen; is OpenSSH installed?")?;
        if !status.success() {
            bail!("ssh-keygen exited with {status}");
        }
    }

    let public = fs::read_to_string(&public_path)
        .await
        .with_context(|| format!("could not read {}", public_path.display()))?
        .trim()
        .to_string();
    Ok(KeyPair {
        private_path,
        public,
    })
}

/// Spawn an ssh process forwarding `localhost:local_port` through the jump
/// host to `target:remote_port`. The child is killed when dropped.
///
/// Host key checking is disabled: the jump host is minutes old and its key
/// will never be seen again.
pub fn open_tunnel(
    key: &KeyPair,
    user: &str,
    jump_address: IpAddr,
    target: IpAddr,
    local_port: u16,
    remote_port: u16,
) -> anyhow::Result<Child> {
    let forward = format!("{local_port}:{target}:{remote_port}");
    let child = Command::new("ssh")
        .arg("-i")
        .arg(&key.private_path)
        .args(["-o", "StrictHostKeyChecking=no"])
        .args(["-o", "UserKnownHostsFile=/dev/null"])
        .args(["-o", "ExitOnForwardFailure=yes"])
        .arg("-N")
        .args(["-L", &forward])
        .arg(format!("{user}@{jump_address}"))
        .kill_on_drop(true)
        .spawn()
        .context("failed to start ssh; is OpenSSH installed?")?;
    tracing::debug!(%forward, %jump_address, "tunnel process started");
    Ok(child)
}
