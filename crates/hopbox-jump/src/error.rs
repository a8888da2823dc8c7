//! Jump-host error types

use hopbox_arm::ArmError;
use std::net::IpAddr;
use thiserror::Error;

/// Errors raised while locating the target VM or driving a session
#[derive(Error, Debug)]
pub enum JumpError {
    #[error("invalid format of the IP address: {0}")]
    InvalidAddress(String),

    #[error("no subscriptions found for the signed-in account")]
    NoSubscription,

    #[error("no resource groups found in subscription {0}")]
    NoResourceGroup(String),

    #[error("no subnet in resource group '{group}' contains the address {ip}")]
    NoMatchingSubnet { group: String, ip: IpAddr },

    #[error("no running virtual machines found in resource group '{0}'")]
    NoTargetVm(String),

    #[error("invalid selection")]
    InvalidSelection,

    #[error("unexpected control-plane document: missing {0}")]
    Malformed(String),

    #[error("public IP address was not assigned to the jump host")]
    AddressNotAssigned,

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Arm(ArmError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// A cancelled control-plane call is a normal trigger into teardown, not a
// transport failure, so it keeps its own variant.
impl From<ArmError> for JumpError {
    fn from(err: ArmError) -> Self {
        match err {
            ArmError::Cancelled => JumpError::Cancelled,
            other => JumpError::Arm(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, JumpError>;
