//! Lazily populated cache of oracle index assignments

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{OnceCell, RwLock};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::models::{Address, IndexSet};

const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Index assignments never change once issued, so entries live for the whole
/// process. Each identity has its own cell: concurrent first lookups wait on
/// one ledger call, and a failed or timed-out call leaves the cell empty for
/// the next try.
pub struct IndexAssignmentCache {
    ledger: Arc<dyn Ledger>,
    lookup_timeout: Duration,
    entries: RwLock<HashMap<Address, Arc<OnceCell<IndexSet>>>>,
}

impl IndexAssignmentCache {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    pub async fn indexes_of(&self, identity: Address) -> Result<IndexSet, LedgerError> {
        let cell = self.cell(identity).await;
        cell.get_or_try_init(|| self.fetch(identity)).await.copied()
    }

    async fn fetch(&self, identity: Address) -> Result<IndexSet, LedgerError> {
        timeout(self.lookup_timeout, self.ledger.indexes_of(identity))
            .await
            .unwrap_or_else(|_| {
                Err(LedgerError::LookupFailed {
                    account: identity,
                    reason: format!("no answer within {:?}", self.lookup_timeout),
                })
            })
    }

    /// Cached entry, without touching the ledger.
    pub async fn peek(&self, identity: Address) -> Option<IndexSet> {
        let entries = self.entries.read().await;
        entries.get(&identity).and_then(|cell| cell.get().copied())
    }

    /// Fetches every identity's indexes up front. Failures are logged and
    /// left for the next access to retry.
    pub async fn warm(&self, identities: impl IntoIterator<Item = Address>) -> usize {
        let lookups = identities.into_iter().map(|identity| async move {
            match self.indexes_of(identity).await {
                Ok(indexes) => {
                    info!(account = %identity, indexes = ?indexes.as_slice(), "oracle indexes cached");
                    true
                }
                Err(err) => {
                    warn!(account = %identity, error = %err, "oracle index lookup failed");
                    false
                }
            }
        });

        join_all(lookups).await.into_iter().filter(|ok| *ok).count()
    }

    async fn cell(&self, identity: Address) -> Arc<OnceCell<IndexSet>> {
        if let Some(cell) = self.entries.read().await.get(&identity) {
            return cell.clone();
        }

        let mut entries = self.entries.write().await;
        entries.entry(identity).or_default().clone()
    }
}
