//! Oracle identity registry

use tracing::{info, warn};

use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::models::{Address, OracleIdentity};

/// Outcome of registering a batch of accounts
#[derive(Debug, Default)]
pub struct RegistrationReport {
    pub registered: Vec<Address>,
    pub failed: Vec<(Address, LedgerError)>,
}

/// The fleet of oracle identities, fixed after startup
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    identities: Vec<OracleIdentity>,
}

impl IdentityRegistry {
    /// Registers every account with `stake` wei. A failed account is recorded
    /// in the report and the remaining accounts are still attempted.
    pub async fn register_all(
        ledger: &dyn Ledger,
        accounts: &[Address],
        stake: u128,
    ) -> (Self, RegistrationReport) {
        let mut registry = IdentityRegistry::default();
        let mut report = RegistrationReport::default();

        for account in accounts {
            match ledger.register(*account, stake).await {
                Ok(()) => {
                    info!(account = %account, "oracle registered");
                    registry.identities.push(OracleIdentity::new(*account));
                    report.registered.push(*account);
                }
                Err(err) => {
                    warn!(account = %account, error = %err, "oracle registration failed");
                    report.failed.push((*account, err));
                }
            }
        }

        info!(
            registered = report.registered.len(),
            failed = report.failed.len(),
            "oracle registration complete"
        );

        (registry, report)
    }

    pub fn from_identities(identities: Vec<OracleIdentity>) -> Self {
        Self { identities }
    }

    pub fn identities(&self) -> &[OracleIdentity] {
        &self.identities
    }

    pub fn handles(&self) -> impl Iterator<Item = Address> + '_ {
        self.identities.iter().map(|identity| identity.handle)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
