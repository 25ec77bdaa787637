//! Flight references, status requests and the contract's status codes

use serde::{Deserialize, Serialize};

use super::Address;

/// Flight a status request is about
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlightRef {
    pub airline: Address,
    pub flight: String,
    /// Scheduled departure, unix seconds
    pub timestamp: u64,
}

/// Status request emitted by the ledger's `OracleRequest` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    pub target_index: u8,
    pub subject: FlightRef,
}

/// A request together with where it was seen in the ledger history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedRequest {
    pub request: StatusRequest,
    pub block_number: Option<u64>,
}

/// Flight status codes accepted by the FlightSurety contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    Unknown,
    OnTime,
    LateAirline,
    LateWeather,
    LateTechnical,
    LateOther,
}

impl FlightStatus {
    pub const ALL: [FlightStatus; 6] = [
        FlightStatus::Unknown,
        FlightStatus::OnTime,
        FlightStatus::LateAirline,
        FlightStatus::LateWeather,
        FlightStatus::LateTechnical,
        FlightStatus::LateOther,
    ];

    /// On-chain `uint8` status code
    pub fn code(self) -> u8 {
        match self {
            FlightStatus::Unknown => 0,
            FlightStatus::OnTime => 10,
            FlightStatus::LateAirline => 20,
            FlightStatus::LateWeather => 30,
            FlightStatus::LateTechnical => 40,
            FlightStatus::LateOther => 50,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }
}
