//! Interface to the external ledger hosting the FlightSurety contract

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::LedgerError;
use crate::models::{Address, IndexSet, ObservedRequest, StatusResponse};

pub mod abi;
pub mod rpc;

#[cfg(test)]
pub mod mock;

pub use rpc::EthLedger;

/// Stream of status requests from a subscription. A `ConnectionError` item
/// means the subscription is gone; other errors concern a single event.
pub type RequestStream = BoxStream<'static, Result<ObservedRequest, LedgerError>>;

/// Where in the ledger history a subscription starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPoint {
    Genesis,
    Latest,
    Block(u64),
}

impl FromStr for SubscriptionPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "genesis" | "earliest" | "0" => Ok(SubscriptionPoint::Genesis),
            "latest" => Ok(SubscriptionPoint::Latest),
            other => other
                .parse::<u64>()
                .map(SubscriptionPoint::Block)
                .map_err(|_| format!("expected `genesis`, `latest` or a block number, got `{s}`")),
        }
    }
}

impl fmt::Display for SubscriptionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionPoint::Genesis => write!(f, "genesis"),
            SubscriptionPoint::Latest => write!(f, "latest"),
            SubscriptionPoint::Block(n) => write!(f, "block {n}"),
        }
    }
}

/// Operations the fleet consumes from the ledger
#[async_trait]
pub trait Ledger: Send + Sync + 'static {
    /// Registers `account` as an oracle, paying `stake` wei.
    async fn register(&self, account: Address, stake: u128) -> Result<(), LedgerError>;

    /// Looks up the indexes the ledger assigned to `account`.
    async fn indexes_of(&self, account: Address) -> Result<IndexSet, LedgerError>;

    /// Opens a stream of status requests starting at `from`.
    async fn subscribe_requests(&self, from: SubscriptionPoint) -> Result<RequestStream, LedgerError>;

    /// Submits one oracle's answer to a status request.
    async fn submit_response(&self, response: &StatusResponse) -> Result<(), LedgerError>;
}
