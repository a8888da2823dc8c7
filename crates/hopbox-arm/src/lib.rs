//! Azure Resource Manager REST client
//!
//! This crate provides the thin, authenticated transport hopbox speaks to
//! the Azure control plane with. It exposes the [`ControlPlane`] trait (the
//! seam everything else is written and tested against), the [`ArmClient`]
//! implementation over reqwest, and token acquisition via the Azure CLI.
//!
//! The client performs no retries other than the mandatory 429
//! accommodation; every other failure is classified and surfaced.

pub mod auth;
pub mod client;
pub mod error;
pub mod path;

// Re-exports
pub use auth::{AccessToken, AzCliTokenProvider, TokenProvider};
pub use client::{ArmClient, ControlPlane, RetryPolicy};
pub use error::{ArmError, Result};
pub use path::{ensure_api_version, resource_group_path, virtual_network_id_of_subnet};
