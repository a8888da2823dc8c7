//! Target VM localization
//!
//! Resolves a subscription, resource group and target IP address into the
//! network context a jump host must be provisioned into. A bare IP is
//! resolved to its subnet by CIDR containment; when no IP is given, running
//! VMs in the group are enumerated and offered to the selection provider.

use crate::cidr::CidrBlock;
use crate::error::{JumpError, Result};
use crate::select::SelectionProvider;
use hopbox_arm::{ControlPlane, virtual_network_id_of_subnet};
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Network context for one provisioning session.
///
/// Built once at session start; read-only afterwards. All resource bodies
/// derive their location and subnet references from it.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub subscription_id: String,
    pub resource_group: String,
    pub location: String,
    pub virtual_network_id: String,
    pub subnet_id: String,
    pub target_ip: IpAddr,
}

pub struct VmLocator {
    arm: Arc<dyn ControlPlane>,
    select: Arc<dyn SelectionProvider>,
}

struct VmCandidate {
    name: String,
    ip: IpAddr,
    subnet_id: String,
}

impl VmLocator {
    pub fn new(arm: Arc<dyn ControlPlane>, select: Arc<dyn SelectionProvider>) -> Self {
        Self { arm, select }
    }

    /// Resolve the hints into a full session context.
    pub async fn locate(
        &self,
        subscription_hint: Option<&str>,
        resource_group_hint: Option<&str>,
        target_ip: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<SessionContext> {
        let subscription_id = self.resolve_subscription(subscription_hint, cancel).await?;
        let (resource_group, location) = self
            .resolve_resource_group(&subscription_id, resource_group_hint, cancel)
            .await?;

        match target_ip {
            Some(raw) => {
                let ip: IpAddr = raw
                    .parse()
                    .map_err(|_| JumpError::InvalidAddress(raw.to_string()))?;
                let (virtual_network_id, subnet_id) = self
                    .find_containing_subnet(&subscription_id, &resource_group, ip, cancel)
                    .await?;
                Ok(SessionContext {
                    subscription_id,
                    resource_group,
                    location,
                    virtual_network_id,
                    subnet_id,
                    target_ip: ip,
                })
            }
            None => {
                self.pick_virtual_machine(subscription_id, resource_group, location, cancel)
                    .await
            }
        }
    }

    async fn resolve_subscription(
        &self,
        hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if let Some(hint) = hint {
            if Uuid::parse_str(hint).is_ok() {
                return Ok(hint.to_string());
            }
            tracing::debug!(hint, "subscription hint is not an id, listing subscriptions");
        }

        let doc = self.arm.get("/subscriptions", cancel).await?;
        let subscriptions = list_of(&doc);

        // A non-id hint may still name a subscription.
        if let Some(hint) = hint {
            if let Some(named) = subscriptions.iter().find(|s| {
                s["displayName"]
                    .as_str()
                    .is_some_and(|name| name.eq_ignore_ascii_case(hint))
            }) {
                return required_str(named, "subscriptionId");
            }
        }

        match subscriptions.len() {
            0 => Err(JumpError::NoSubscription),
            1 => required_str(&subscriptions[0], "subscriptionId"),
            _ => {
                let items: Vec<String> = subscriptions
                    .iter()
                    .map(|s| {
                        format!(
                            "{} ({})",
                            s["displayName"].as_str().unwrap_or("unnamed"),
                            s["subscriptionId"].as_str().unwrap_or("?"),
                        )
                    })
                    .collect();
                let index = self
                    .select
                    .choose("Subscriptions found for your account:", &items)
                    .await?;
                let chosen = subscriptions.get(index).ok_or(JumpError::InvalidSelection)?;
                required_str(chosen, "subscriptionId")
            }
        }
    }

    async fn resolve_resource_group(
        &self,
        subscription: &str,
        hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(String, String)> {
        if let Some(name) = hint {
            // The name is not validated here; a bad one fails on the GET.
            let path = hopbox_arm::resource_group_path(subscription, name);
            let doc = self.arm.get(&path, cancel).await?;
            return Ok((name.to_string(), required_str(&doc, "location")?));
        }

        let doc = self
            .arm
            .get(&format!("/subscriptions/{subscription}/resourceGroups"), cancel)
            .await?;
        let groups = list_of(&doc);

        match groups.len() {
            0 => Err(JumpError::NoResourceGroup(subscription.to_string())),
            1 => Ok((
                required_str(&groups[0], "name")?,
                required_str(&groups[0], "location")?,
            )),
            _ => {
                let items: Vec<String> = groups
                    .iter()
                    .map(|g| required_str(g, "name"))
                    .collect::<Result<_>>()?;
                let index = self
                    .select
                    .choose("Resource groups found in the subscription:", &items)
                    .await?;
                let group = groups.get(index).ok_or(JumpError::InvalidSelection)?;
                Ok((
                    required_str(group, "name")?,
                    required_str(group, "location")?,
                ))
            }
        }
    }

    /// Scan every subnet of every virtual network in the group; the first
    /// one containing `ip` in listing order wins. This is a documented
    /// simplification - there is no most-specific-prefix tie-break.
    async fn find_containing_subnet(
        &self,
        subscription: &str,
        group: &str,
        ip: IpAddr,
        cancel: &CancellationToken,
    ) -> Result<(String, String)> {
        tracing::debug!(%ip, group, "searching for the subnet containing the target address");
        let path = format!(
            "/subscriptions/{subscription}/resourceGroups/{group}/providers/Microsoft.Network/virtualnetworks"
        );
        let doc = self.arm.get(&path, cancel).await?;

        for network in list_of(&doc) {
            for subnet in network["properties"]["subnets"]
                .as_array()
                .into_iter()
                .flatten()
            {
                let Some(prefix) = subnet["properties"]["addressPrefix"].as_str() else {
                    continue;
                };
                let block = match CidrBlock::parse(prefix) {
                    Ok(block) => block,
                    Err(_) => {
                        tracing::warn!(prefix, "skipping subnet with unparseable address prefix");
                        continue;
                    }
                };
                if block.contains(ip) {
                    return Ok((required_str(&network, "id")?, required_str(subnet, "id")?));
                }
            }
        }

        Err(JumpError::NoMatchingSubnet {
            group: group.to_string(),
            ip,
        })
    }

    /// Interactive fallback: enumerate the group's network interfaces and
    /// offer the VMs behind them.
    async fn pick_virtual_machine(
        &self,
        subscription: String,
        group: String,
        location: String,
        cancel: &CancellationToken,
    ) -> Result<SessionContext> {
        let path = format!(
            "/subscriptions/{subscription}/resourceGroups/{group}/providers/Microsoft.Network/networkInterfaces"
        );
        let doc = self.arm.get(&path, cancel).await?;

        let mut candidates = Vec::new();
        for nic in list_of(&doc) {
            let Some(vm_id) = nic["properties"]["virtualMachine"]["id"].as_str() else {
                continue;
            };
            let name = vm_id.rsplit('/').next().unwrap_or(vm_id).to_string();
            for ip_config in nic["properties"]["ipConfigurations"]
                .as_array()
                .into_iter()
                .flatten()
            {
                let props = &ip_config["properties"];
                let ready = props["provisioningState"]
                    .as_str()
                    .is_some_and(|s| s.eq_ignore_ascii_case("succeeded"));
                if !ready {
                    continue;
                }
                let (Some(raw_ip), Some(subnet_id)) =
                    (props["privateIPAddress"].as_str(), props["subnet"]["id"].as_str())
                else {
                    continue;
                };
                let Ok(ip) = raw_ip.parse() else { continue };
                candidates.push(VmCandidate {
                    name: name.clone(),
                    ip,
                    subnet_id: subnet_id.to_string(),
                });
            }
        }

        if candidates.is_empty() {
            return Err(JumpError::NoTargetVm(group));
        }

        let index = if candidates.len() == 1 {
            0
        } else {
            let items: Vec<String> = candidates
                .iter()
                .map(|c| format!("{}, ip: {}", c.name, c.ip))
                .collect();
            self.select
                .choose("Virtual machines found in the resource group:", &items)
                .await?
        };
        let chosen = candidates.get(index).ok_or(JumpError::InvalidSelection)?;

        Ok(SessionContext {
            subscription_id: subscription,
            resource_group: group,
            location,
            virtual_network_id: virtual_network_id_of_subnet(&chosen.subnet_id),
            subnet_id: chosen.subnet_id.clone(),
            target_ip: chosen.ip,
        })
    }
}

fn list_of(doc: &Value) -> Vec<Value> {
    doc["value"].as_array().cloned().unwrap_or_default()
}

fn required_str(doc: &Value, key: &str) -> Result<String> {
    doc[key]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| JumpError::Malformed(key.to_string()))
}
