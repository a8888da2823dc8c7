//! Outgoing public address discovery
//!
//! The security group's inbound SSH rule is scoped to the caller's public
//! address. Discovery failures are soft: the orchestrator falls back to a
//! wildcard source and warns.

use crate::error::{JumpError, Result};
use async_trait::async_trait;
use hopbox_arm::ArmError;
use std::net::IpAddr;

const IPIFY_ENDPOINT: &str = "https://api.ipify.org";

#[async_trait]
pub trait PublicAddressResolver: Send + Sync {
    /// The caller's outgoing public IP address, as a string usable in a
    /// firewall rule source.
    async fn resolve(&self) -> Result<String>;
}

/// Resolver backed by the ipify address-echo service.
pub struct IpifyResolver {
    http: reqwest::Client,
    endpoint: String,
}

impl IpifyResolver {
    pub fn new() -> Self {
        Self::with_endpoint(IPIFY_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl Default for IpifyResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PublicAddressResolver for IpifyResolver {
    async fn resolve(&self) -> Result<String> {
        let response = self
            .http
            .get(&self.endpoint)
            .send()
            .await
            .map_err(ArmError::from)?;
        if !response.status().is_success() {
            return Err(ArmError::Protocol {
                status: response.status().as_u16(),
                path: self.endpoint.clone(),
            }
            .into());
        }
        let body = response.text().await.map_err(ArmError::from)?;
        let ip: IpAddr = body
            .trim()
            .parse()
            .map_err(|_| JumpError::InvalidAddress(body.trim().to_string()))?;
        Ok(ip.to_string())
    }
}
