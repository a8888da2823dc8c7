//! ARM client error types

use thiserror::Error;

/// Errors surfaced by the control-plane client
#[derive(Error, Debug)]
pub enum ArmError {
    #[error("control plane not reachable: {0}")]
    NotReachable(#[from] reqwest::Error),

    #[error("request rejected (http {status}): {body}")]
    ClientRejected { status: u16, body: String },

    #[error("control plane fault (http {status}): {body}")]
    ServerFault { status: u16, body: String },

    #[error("still throttled after {attempts} attempts")]
    Throttled { attempts: u32 },

    #[error("unexpected status {status} from {path}")]
    Protocol { status: u16, path: String },

    #[error("token acquisition failed: {0}")]
    Auth(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArmError>;
