//! Data models for the oracle fleet

use serde::{Deserialize, Serialize};

pub mod flight;
pub mod oracle;

/// 20-byte ledger account reference, serialized as `0x`-prefixed hex
pub use alloy_primitives::Address;
pub use flight::{FlightRef, FlightStatus, ObservedRequest, StatusRequest};
pub use oracle::{IndexSet, OracleIdentity, StatusResponse};

/// Standard API response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
