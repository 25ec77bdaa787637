//! Oracle identities, index assignments and submitted responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Address, FlightRef, FlightStatus};

/// A registered oracle account.
///
/// Its index assignment lives in the `IndexAssignmentCache`, not here: the
/// ledger only hands it out through a separate lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OracleIdentity {
    pub handle: Address,
    pub registered_at: DateTime<Utc>,
}

impl OracleIdentity {
    pub fn new(handle: Address) -> Self {
        Self {
            handle,
            registered_at: Utc::now(),
        }
    }
}

/// The three indexes the ledger assigned to an oracle.
///
/// The ledger draws them independently, so the same value can appear more than
/// once. They are kept as issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSet(pub [u8; 3]);

impl IndexSet {
    pub fn contains(&self, index: u8) -> bool {
        self.0.contains(&index)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

/// Response submitted on behalf of one oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub identity: Address,
    pub target_index: u8,
    pub subject: FlightRef,
    pub status: FlightStatus,
}
