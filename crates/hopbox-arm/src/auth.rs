//! Token acquisition
//!
//! hopbox never implements an OAuth flow of its own: it borrows the
//! signed-in Azure CLI session via `az account get-access-token`, the same
//! way other tooling here shells out to vendor CLIs.

use crate::error::{ArmError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::Mutex;

/// Subscription-scoped bearer credential. Short-lived, never persisted.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// True when the token expires within `margin` (or carries no expiry).
    pub fn expires_within(&self, margin: chrono::Duration) -> bool {
        match self.expires_on {
            Some(at) => Utc::now() + margin >= at,
            None => true,
        }
    }
}

/// Produces a bearer token for control-plane calls.
///
/// `subscription` of `None` asks for a token against the account's default
/// subscription (needed before any subscription has been resolved).
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, subscription: Option<&str>) -> Result<AccessToken>;
}

/// Token provider backed by the `az` CLI.
pub struct AzCliTokenProvider {
    cached: Mutex<Option<(Option<String>, AccessToken)>>,
}

#[derive(Deserialize)]
struct AzTokenOutput {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "expiresOn")]
    expires_on: Option<String>,
}

impl AzCliTokenProvider {
    pub fn new() -> Self {
        Self {
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self, subscription: Option<&str>) -> Result<AccessToken> {
        let mut cmd = Command::new("az");
        cmd.args(["account", "get-access-token", "--output", "json"]);
        if let Some(subscription) = subscription {
            cmd.args(["--subscription", subscription]);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!(?subscription, "requesting access token from the Azure CLI");

        let output = cmd.output().await.map_err(|e| {
            ArmError::Auth(format!(
                "failed to run `az` - is the Azure CLI installed? ({e})"
            ))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ArmError::Auth(stderr.trim().to_string()));
        }

        let parsed: AzTokenOutput = serde_json::from_slice(&output.stdout)?;
        Ok(AccessToken {
            token: parsed.access_token,
            expires_on: parsed.expires_on.as_deref().and_then(parse_az_expiry),
        })
    }
}

impl Default for AzCliTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenProvider for AzCliTokenProvider {
    async fn token(&self, subscription: Option<&str>) -> Result<AccessToken> {
        let mut cached = self.cached.lock().await;
        if let Some((scope, token)) = cached.as_ref() {
            if scope.as_deref() == subscription
                && !token.expires_within(chrono::Duration::minutes(5))
            {
                return Ok(token.clone());
            }
        }

        let token = self.fetch(subscription).await?;
        *cached = Some((subscription.map(str::to_string), token.clone()));
        Ok(token)
    }
}

// az prints expiresOn as a local timestamp without an offset, e.g.
// "2026-08-29 14:03:21.000000". It is read as UTC; the refresh margin
// covers the offset error.
fn parse_az_expiry(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_az_expiry_format() {
        let parsed = parse_az_expiry("2026-08-29 14:03:21.000000").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-08-29T14:03:21+00:00");
    }

    #[test]
    fn rejects_garbage_expiry() {
        assert!(parse_az_expiry("soon").is_none());
    }

    #[test]
    fn token_without_expiry_always_counts_as_expiring() {
        let token = AccessToken {
            token: "t".into(),
            expires_on: None,
        };
        assert!(token.expires_within(chrono::Duration::minutes(5)));
    }

    #[test]
    fn fresh_token_is_not_expiring() {
        let token = AccessToken {
            token: "t".into(),
            expires_on: Some(Utc::now() + chrono::Duration::hours(1)),
        };
        assert!(!token.expires_within(chrono::Duration::minutes(5)));
    }
}
