//! Crate-wide error kinds.
//!
//! Mirrors the error taxonomy every subsystem surfaces into RPC
//! `{status, message}` responses or into a periodic task's log-and-continue
//! handler. No subsystem retries on its own; the Dispatcher's peer-switch
//! loop is the only retry behavior in the system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("no instances registered")]
    NoInstances,

    #[error("all {suspects} instance(s) unreachable")]
    AllUnreachable { suspects: usize },

    #[error("election aborted: {0}")]
    ElectionAborted(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for BrokerError {
    fn from(e: std::io::Error) -> Self {
        BrokerError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(e: serde_json::Error) -> Self {
        BrokerError::Internal(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for BrokerError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        BrokerError::Internal(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for BrokerError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        BrokerError::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
