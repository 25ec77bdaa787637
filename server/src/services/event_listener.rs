//! Event listener for `OracleRequest` notifications

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use super::dispatcher::ResponseDispatcher;
use crate::error::LedgerError;
use crate::health::FleetHealth;
use crate::ledger::{Ledger, SubscriptionPoint};

const MAX_BACKOFF_EXPONENT: u32 = 5;
const MAX_BACKOFF_UNITS: u64 = 30;
/// A session that stays up this many backoff units counts as healthy.
const STABLE_SESSION_UNITS: u32 = 30;

enum SessionEnd {
    /// The ledger refused the subscription.
    Refused(LedgerError),
    /// The subscription was up and then went away.
    Dropped { error: LedgerError, uptime: Duration },
}

/// Long-lived subscription feeding the dispatcher
pub struct EventListener {
    ledger: Arc<dyn Ledger>,
    dispatcher: Arc<ResponseDispatcher>,
    health: Arc<FleetHealth>,
    backoff_unit: Duration,
}

impl EventListener {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        dispatcher: Arc<ResponseDispatcher>,
        health: Arc<FleetHealth>,
    ) -> Self {
        Self {
            ledger,
            dispatcher,
            health,
            backoff_unit: Duration::from_secs(1),
        }
    }

    /// Scales every reconnect delay; one unit is a second by default.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Runs until `shutdown` flips to `true` (or its sender goes away). After
    /// a drop the subscription resumes from the last block seen, so events
    /// from that block are delivered again.
    pub async fn run(self, from: SubscriptionPoint, mut shutdown: watch::Receiver<bool>) {
        info!(from = %from, "starting oracle request listener");

        let mut last_block: Option<u64> = None;
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let resume_from = last_block.map(SubscriptionPoint::Block).unwrap_or(from);
            let block_before = last_block;
            let end = tokio::select! {
                _ = shutdown.changed() => break,
                end = self.session(resume_from, &mut last_block) => end,
            };
            self.health.set_listener_connected(false);

            failures = match end {
                SessionEnd::Refused(err) => {
                    error!(error = %err, from = %resume_from, "oracle request subscription failed");
                    failures.saturating_add(1)
                }
                SessionEnd::Dropped { error, uptime } => {
                    // Reset only after progress past the resume block or a long session.
                    let advanced = last_block > block_before;
                    let stable = uptime >= self.backoff_unit.saturating_mul(STABLE_SESSION_UNITS);
                    warn!(
                        error = %error,
                        uptime_ms = uptime.as_millis() as u64,
                        advanced,
                        "oracle request subscription dropped"
                    );
                    if advanced || stable {
                        1
                    } else {
                        failures.saturating_add(1)
                    }
                }
            };

            let backoff_units =
                2u64.saturating_pow(failures.min(MAX_BACKOFF_EXPONENT)).min(MAX_BACKOFF_UNITS);
            let backoff = self.backoff_unit.saturating_mul(backoff_units as u32);
            warn!(failures, backoff_ms = backoff.as_millis() as u64, "listener reconnect backoff");

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(backoff) => {}
            }
        }

        self.health.set_listener_connected(false);
        info!("oracle request listener stopped");
    }

    async fn session(&self, from: SubscriptionPoint, last_block: &mut Option<u64>) -> SessionEnd {
        let mut requests = match self.ledger.subscribe_requests(from).await {
            Ok(stream) => stream,
            Err(err) => return SessionEnd::Refused(err),
        };

        let connected_at = Instant::now();
        self.health.set_listener_connected(true);
        info!(from = %from, "subscribed to oracle requests");

        while let Some(item) = requests.next().await {
            match item {
                Ok(observed) => {
                    if let Some(block) = observed.block_number {
                        *last_block = Some(last_block.map_or(block, |seen| seen.max(block)));
                    }

                    let request = observed.request;
                    info!(
                        index = request.target_index,
                        airline = %request.subject.airline,
                        flight = %request.subject.flight,
                        timestamp = request.subject.timestamp,
                        block = ?observed.block_number,
                        "oracle request received"
                    );
                    self.health.record_request().await;
                    self.dispatcher.dispatch(request);
                }
                Err(error) if error.is_connection() => {
                    return SessionEnd::Dropped {
                        error,
                        uptime: connected_at.elapsed(),
                    }
                }
                Err(err) => warn!(error = %err, "skipping undecodable oracle request"),
            }
        }

        SessionEnd::Dropped {
            error: LedgerError::connection("request stream ended"),
            uptime: connected_at.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::{account, observed, MockLedger, Session};
    use crate::models::OracleIdentity;
    use crate::services::dispatcher::DispatchSettings;
    use crate::services::index_cache::IndexAssignmentCache;
    use crate::services::registry::IdentityRegistry;
    use crate::services::status_generator::RandomStatusGenerator;

    struct Harness {
        ledger: Arc<MockLedger>,
        health: Arc<FleetHealth>,
        shutdown: watch::Sender<bool>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start(ledger: MockLedger, from: SubscriptionPoint) -> Harness {
        start_with_backoff(ledger, from, Duration::from_millis(1))
    }

    fn start_with_backoff(ledger: MockLedger, from: SubscriptionPoint, unit: Duration) -> Harness {
        let ledger = Arc::new(ledger);
        let health = Arc::new(FleetHealth::new());
        let registry = Arc::new(IdentityRegistry::from_identities(vec![OracleIdentity::new(
            account(1),
        )]));
        let cache = Arc::new(IndexAssignmentCache::new(ledger.clone()));
        let dispatcher = Arc::new(ResponseDispatcher::new(
            registry,
            cache,
            ledger.clone(),
            Arc::new(RandomStatusGenerator),
            health.clone(),
            DispatchSettings::default(),
        ));

        let listener = EventListener::new(ledger.clone(), dispatcher, health.clone())
            .with_backoff_unit(unit);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(listener.run(from, shutdown_rx));

        Harness {
            ledger,
            health,
            shutdown,
            handle,
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(tokio::time::Instant::now() < deadline, "condition not reached");
            sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_reconnects_from_last_seen_block() {
        let ledger = MockLedger::new()
            .with_indexes(account(1), [4, 5, 6])
            .with_session(Session::Finite(vec![
                Ok(observed(4, "AA1", 10)),
                Ok(observed(5, "AA2", 12)),
            ]))
            .with_session(Session::Open(vec![Ok(observed(6, "AA3", 12))]));
        let harness = start(ledger, SubscriptionPoint::Genesis);

        wait_until(|| harness.ledger.submissions().len() == 3).await;
        wait_until(|| harness.health.listener_connected()).await;

        assert_eq!(
            harness.ledger.subscribe_points(),
            vec![SubscriptionPoint::Genesis, SubscriptionPoint::Block(12)]
        );
        assert_eq!(harness.health.snapshot().await.requests_received, 3);

        harness.shutdown.send(true).unwrap();
        harness.handle.await.unwrap();
        assert!(!harness.health.listener_connected());
    }

    #[tokio::test]
    async fn test_refused_subscription_is_retried() {
        let ledger = MockLedger::new()
            .with_indexes(account(1), [0, 1, 2])
            .with_session(Session::Refuse(LedgerError::connection("connection refused")))
            .with_session(Session::Refuse(LedgerError::connection("connection refused")))
            .with_session(Session::Open(vec![Ok(observed(2, "KL601", 3))]));
        let harness = start(ledger, SubscriptionPoint::Latest);

        wait_until(|| harness.ledger.submissions().len() == 1).await;

        assert_eq!(
            harness.ledger.subscribe_points(),
            vec![SubscriptionPoint::Latest; 3]
        );
        assert!(harness.health.listener_connected());

        harness.shutdown.send(true).unwrap();
        harness.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_decode_error_does_not_reconnect() {
        let ledger = MockLedger::new()
            .with_indexes(account(1), [7, 8, 9])
            .with_session(Session::Open(vec![
                Err(LedgerError::Decode("bad log".to_string())),
                Ok(observed(9, "EK202", 40)),
            ]));
        let harness = start(ledger, SubscriptionPoint::Block(30));

        wait_until(|| harness.ledger.submissions().len() == 1).await;

        assert_eq!(harness.ledger.subscribe_points(), vec![SubscriptionPoint::Block(30)]);
        assert_eq!(harness.health.snapshot().await.requests_received, 1);

        drop(harness.shutdown);
        harness.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_replaying_drops_keep_backing_off() {
        let replay = || Session::Finite(vec![Ok(observed(4, "AA1", 12))]);
        let ledger = MockLedger::new()
            .with_indexes(account(1), [4, 5, 6])
            .with_session(replay())
            .with_session(replay())
            .with_session(replay())
            .with_session(replay())
            .with_session(Session::Open(Vec::new()));
        let harness = start_with_backoff(ledger, SubscriptionPoint::Genesis, Duration::from_millis(5));

        wait_until(|| harness.ledger.subscribe_points().len() == 5).await;

        // First drop advanced to block 12; the replays of block 12 did not.
        let gaps = harness.ledger.subscribe_gaps();
        assert_eq!(gaps.len(), 4);
        assert!(gaps[1] >= Duration::from_millis(20));
        assert!(gaps[2] >= Duration::from_millis(40));
        assert!(gaps[3] >= Duration::from_millis(80));
        assert_eq!(
            harness.ledger.subscribe_points()[1..],
            [SubscriptionPoint::Block(12); 4]
        );

        harness.shutdown.send(true).unwrap();
        harness.handle.await.unwrap();
    }
}
