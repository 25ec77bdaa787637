//! Error types shared across the fleet

use thiserror::Error;

use crate::models::Address;

/// Failures reported by the external ledger.
///
/// Each variant is scoped to the smallest unit it affects: one account, one
/// lookup, one subscription, or one submission.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("registration failed for {account}: {reason}")]
    RegistrationFailed { account: Address, reason: String },

    #[error("index lookup failed for {account}: {reason}")]
    LookupFailed { account: Address, reason: String },

    #[error("ledger connection error: {0}")]
    ConnectionError(String),

    #[error("submission rejected for {account}: {reason}")]
    SubmissionRejected { account: Address, reason: String },

    #[error("undecodable ledger payload: {0}")]
    Decode(String),
}

impl LedgerError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Connection errors end a subscription; everything else is per-item.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::ConnectionError(_))
    }
}

/// Invalid or missing startup configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}
