//! Jump-host provisioning and teardown
//!
//! One `JumpHost` owns one session: it creates the four-resource chain
//! (public address → network security group → network interface → virtual
//! machine), waits until the VM reports running, and unwinds its rollback
//! ledger in exact reverse creation order on disposal, failure or
//! cancellation. The ledger and session context are never shared with
//! another task.

use crate::error::{JumpError, Result};
use crate::journal::Journal;
use crate::locate::SessionContext;
use crate::myip::PublicAddressResolver;
use hopbox_arm::ControlPlane;
use serde_json::{Value, json};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const COMPUTE_API_VERSION: &str = "2024-07-01";

/// The closed set of resources a session creates, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKind {
    PublicAddress,
    SecurityRules,
    Interface,
    Instance,
}

impl StepKind {
    /// Name suffix appended to the session token.
    fn suffix(self) -> &'static str {
        match self {
            StepKind::PublicAddress => "pip",
            StepKind::SecurityRules => "nsg",
            StepKind::Interface => "nic",
            StepKind::Instance => "vm",
        }
    }

    fn provider_type(self) -> &'static str {
        match self {
            StepKind::PublicAddress => "Microsoft.Network/publicIPAddresses",
            StepKind::SecurityRules => "Microsoft.Network/networkSecurityGroups",
            StepKind::Interface => "Microsoft.Network/networkInterfaces",
            StepKind::Instance => "Microsoft.Compute/virtualMachines",
        }
    }

    /// Compute resources speak a different api-version than the network
    /// default; it travels inside the resource id so deletes use it too.
    fn api_version(self) -> Option<&'static str> {
        match self {
            StepKind::Instance => Some(COMPUTE_API_VERSION),
            _ => None,
        }
    }

    /// Whether deletion must be confirmed complete before older ledger
    /// entries are processed. The VM holds its NIC and disk until it is
    /// fully gone.
    fn wait_for_removal(self) -> bool {
        matches!(self, StepKind::Instance)
    }
}

/// One created resource, as remembered for rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub resource_id: String,
    pub wait_for_removal: bool,
}

/// Orchestrates one jump-host session.
pub struct JumpHost {
    arm: Arc<dyn ControlPlane>,
    resolver: Arc<dyn PublicAddressResolver>,
    ctx: SessionContext,
    session: String,
    ledger: Vec<LedgerEntry>,
    journal: Option<Journal>,
    poll_interval: Duration,
    public_address_id: Option<String>,
    os_disk_id: Option<String>,
}

impl JumpHost {
    pub fn new(
        arm: Arc<dyn ControlPlane>,
        resolver: Arc<dyn PublicAddressResolver>,
        ctx: SessionContext,
    ) -> Self {
        // Leading letter keeps the token a valid name for every resource
        // type; the uuid guarantees no collision with prior sessions.
        let session = format!("a{}", Uuid::new_v4().simple());
        Self {
            arm,
            resolver,
            ctx,
            session,
            ledger: Vec::new(),
            journal: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            public_address_id: None,
            os_disk_id: None,
        }
    }

    /// Write a rollback journal for this session under `dir`.
    pub fn with_journal_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.journal = Some(Journal::new(dir, &self.session));
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn session_token(&self) -> &str {
        &self.session
    }

    fn resource_name(&self, step: StepKind) -> String {
        format!("{}-{}", self.session, step.suffix())
    }

    fn resource_id(&self, step: StepKind) -> String {
        let mut id = format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
            self.ctx.subscription_id,
            self.ctx.resource_group,
            step.provider_type(),
            self.resource_name(step),
        );
        if let Some(version) = step.api_version() {
            id.push_str(&format!("?api-version={version}"));
        }
        id
    }

    /// Provision the full chain and wait until the jump host is running.
    ///
    /// Any failure or cancellation first tears down everything created so
    /// far; the error reaches the caller only after the unwind.
    pub async fn deploy_and_start(
        &mut self,
        root_user: &str,
        ssh_public_key: &str,
        vm_size: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self.provision(root_user, ssh_public_key, vm_size, cancel).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, "provisioning did not complete, rolling back");
                self.teardown().await;
                Err(err)
            }
        }
    }

    async fn provision(
        &mut self,
        root_user: &str,
        ssh_public_key: &str,
        vm_size: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let address_id = self.create_public_address(cancel).await?;
        let rules_id = self.create_security_rules(cancel).await?;
        let interface_id = self
            .create_interface(&address_id, &rules_id, cancel)
            .await?;
        let instance_id = self
            .create_instance(&interface_id, root_user, ssh_public_key, vm_size, cancel)
            .await?;
        self.await_running(&instance_id, cancel).await
    }

    /// Create one resource and remember it for rollback. The ledger push
    /// happens before any readiness polling, so a later step's failure
    /// still rolls this resource back.
    async fn create(
        &mut self,
        step: StepKind,
        body: Value,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(JumpError::Cancelled);
        }
        let id = self.resource_id(step);
        tracing::info!(name = %self.resource_name(step), "creating resource");
        if let Some(journal) = self.journal.as_mut() {
            journal.record(&id, step.wait_for_removal()).await?;
        }
        self.arm.put(&id, body, cancel).await?;
        self.ledger.push(LedgerEntry {
            resource_id: id.clone(),
            wait_for_removal: step.wait_for_removal(),
        });
        Ok(id)
    }

    async fn create_public_address(&mut self, cancel: &CancellationToken) -> Result<String> {
        let body = json!({
            "location": self.ctx.location,
            "properties": {
                "publicIPAllocationMethod": "Dynamic",
                "publicIPAddressVersion": "IPv4",
            }
        });
        let id = self.create(StepKind::PublicAddress, body, cancel).await?;
        self.public_address_id = Some(id.clone());
        Ok(id)
    }

    async fn create_security_rules(&mut self, cancel: &CancellationToken) -> Result<String> {
        let source = match self.resolver.resolve().await {
            Ok(address) => address,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "could not discover the outgoing public address; \
                     the jump host will accept SSH connections from any host"
                );
                "Internet".to_string()
            }
        };
        let body = json!({
            "location": self.ctx.location,
            "properties": {
                "securityRules": [{
                    "name": "ssh",
                    "properties": {
                        "protocol": "Tcp",
                        "sourcePortRange": "*",
                        "destinationPortRange": "22",
                        "sourceAddressPrefix": source,
                        "destinationAddressPrefix": "*",
                        "access": "Allow",
                        "direction": "Inbound",
                        "priority": 100,
                    }
                }]
            }
        });
        self.create(StepKind::SecurityRules, body, cancel).await
    }

    async fn create_interface(
        &mut self,
        address_id: &str,
        rules_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let body = json!({
            "location": self.ctx.location,
            "properties": {
                "networkSecurityGroup": { "id": rules_id },
                "ipConfigurations": [{
                    "name": "vmip",
                    "properties": {
                        "subnet": { "id": self.ctx.subnet_id },
                        "privateIPAllocationMethod": "Dynamic",
                        "publicIPAddress": { "id": address_id },
                    }
                }]
            }
        });
        self.create(StepKind::Interface, body, cancel).await
    }

    async fn create_instance(
        &mut self,
        interface_id: &str,
        root_user: &str,
        ssh_public_key: &str,
        vm_size: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let name = self.resource_name(StepKind::Instance);
        let body = json!({
            "name": name,
            "location": self.ctx.location,
            "properties": {
                "hardwareProfile": { "vmSize": vm_size },
                "storageProfile": {
                    "imageReference": {
                        "publisher": "canonical",
                        "offer": "ubuntu-24_04-lts",
                        "sku": "server",
                        "version": "latest",
                    },
                    "osDisk": { "createOption": "fromImage" },
                },
                "osProfile": {
                    "computerName": name,
                    "adminUsername": root_user,
                    "linuxConfiguration": {
                        "disablePasswordAuthentication": true,
                        "ssh": {
                            "publicKeys": [{
                                "path": format!("/home/{root_user}/.ssh/authorized_keys"),
                                "keyData": ssh_public_key,
                            }]
                        },
                    },
                },
                "networkProfile": {
                    "networkInterfaces": [{
                        "id": interface_id,
                        "properties": { "primary": true }
                    }]
                },
                "diagnosticsProfile": {
                    "bootDiagnostics": { "enabled": false }
                },
            }
        });
        self.create(StepKind::Instance, body, cancel).await
    }

    /// Poll the VM document until it reports a terminal running state,
    /// checking cancellation every iteration.
    async fn await_running(&mut self, instance_id: &str, cancel: &CancellationToken) -> Result<()> {
        tracing::info!("waiting for the jump host to report running");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(JumpError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            let doc = self.arm.get(instance_id, cancel).await?;
            self.track_os_disk(&doc).await?;
            if provisioning_succeeded(&doc) {
                return Ok(());
            }
            tracing::debug!("jump host still provisioning");
        }
    }

    /// The managed OS disk only becomes known once the VM document reports
    /// it. It must be removed after the VM, so its entry slots in directly
    /// beneath the VM's (the newest ledger entry).
    async fn track_os_disk(&mut self, vm: &Value) -> Result<()> {
        if self.os_disk_id.is_some() {
            return Ok(());
        }
        let Some(disk) = vm["properties"]["storageProfile"]["osDisk"]["managedDisk"]["id"].as_str()
        else {
            return Ok(());
        };
        let disk_id = format!("{disk}?api-version={COMPUTE_API_VERSION}");
        if let Some(journal) = self.journal.as_mut() {
            journal.record(&disk_id, false).await?;
        }
        let below_instance = self.ledger.len().saturating_sub(1);
        self.ledger.insert(
            below_instance,
            LedgerEntry {
                resource_id: disk_id.clone(),
                wait_for_removal: false,
            },
        );
        self.os_disk_id = Some(disk_id);
        Ok(())
    }

    /// The address assigned to the jump host once it is running.
    pub async fn public_ip_address(&self, cancel: &CancellationToken) -> Result<IpAddr> {
        let id = self
            .public_address_id
            .as_deref()
            .ok_or(JumpError::AddressNotAssigned)?;
        let doc = self.arm.get(id, cancel).await?;
        doc["properties"]["ipAddress"]
            .as_str()
            .and_then(|raw| raw.parse().ok())
            .ok_or(JumpError::AddressNotAssigned)
    }

    /// Unwind the ledger newest-first. Returns true once every recorded
    /// resource is confirmed gone.
    ///
    /// Runs to completion even when the session was cancelled: cleanup
    /// calls use their own, never-cancelled token. Per-entry failures are
    /// logged and the unwind continues with the next entry; entries that
    /// failed to delete stay on the ledger and in the journal, so a later
    /// call retries exactly those and the operator keeps a record of what
    /// is still standing. Once drained, calling this again is a no-op.
    pub async fn teardown(&mut self) -> bool {
        let cancel = CancellationToken::new();
        let mut survivors: Vec<LedgerEntry> = Vec::new();
        while let Some(entry) = self.ledger.pop() {
            tracing::info!(resource = %entry.resource_id, "removing resource");
            if let Err(err) = self.arm.delete(&entry.resource_id, &cancel).await {
                tracing::warn!(
                    resource = %entry.resource_id,
                    error = %err,
                    "failed to remove resource, continuing with the rest"
                );
                survivors.push(entry);
                continue;
            }
            if entry.wait_for_removal {
                self.await_removal(&entry.resource_id, &cancel).await;
            }
        }
        // Survivors were collected newest-first; the ledger holds creation
        // order.
        survivors.reverse();
        self.ledger = survivors;
        if let Some(journal) = self.journal.as_mut() {
            let kept = &self.ledger;
            let result = if kept.is_empty() {
                journal.clear().await
            } else {
                journal
                    .retain(|record| kept.iter().any(|e| e.resource_id == record.resource_id))
                    .await
            };
            if let Err(err) = result {
                tracing::warn!(error = %err, "could not update the rollback journal");
            }
        }
        self.ledger.is_empty()
    }

    /// Block until the resource's asynchronous deletion has finished; the
    /// next (older) entry may be locked by it until then.
    async fn await_removal(&self, resource_id: &str, cancel: &CancellationToken) {
        loop {
            match self.arm.exists(resource_id, cancel).await {
                Ok(false) => return,
                Ok(true) => {
                    tracing::debug!(resource = %resource_id, "still deleting");
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(err) => {
                    tracing::warn!(
                        resource = %resource_id,
                        error = %err,
                        "existence probe failed while waiting for removal"
                    );
                    return;
                }
            }
        }
    }
}

fn provisioning_succeeded(doc: &Value) -> bool {
    doc["properties"]["provisioningState"]
        .as_str()
        .is_some_and(|s| s.eq_ignore_ascii_case("succeeded"))
}
