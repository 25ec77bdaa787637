//! Response dispatch: match requests to oracles and submit their answers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::index_cache::IndexAssignmentCache;
use super::registry::IdentityRegistry;
use super::status_generator::StatusGenerator;
use crate::error::LedgerError;
use crate::health::FleetHealth;
use crate::ledger::Ledger;
use crate::models::{Address, StatusRequest, StatusResponse};

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Upper bound on submissions in flight across all requests
    pub max_in_flight: usize,
    pub submission_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            submission_timeout: Duration::from_secs(30),
        }
    }
}

/// What happened to one request
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub matched: Vec<Address>,
    pub submitted: usize,
    pub rejected: usize,
    pub lookup_failed: usize,
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard(Arc<InFlight>);

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

pub struct ResponseDispatcher {
    registry: Arc<IdentityRegistry>,
    cache: Arc<IndexAssignmentCache>,
    ledger: Arc<dyn Ledger>,
    generator: Arc<dyn StatusGenerator>,
    health: Arc<FleetHealth>,
    permits: Arc<Semaphore>,
    submission_timeout: Duration,
    in_flight: Arc<InFlight>,
}

impl ResponseDispatcher {
    pub fn new(
        registry: Arc<IdentityRegistry>,
        cache: Arc<IndexAssignmentCache>,
        ledger: Arc<dyn Ledger>,
        generator: Arc<dyn StatusGenerator>,
        health: Arc<FleetHealth>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            cache,
            ledger,
            generator,
            health,
            permits: Arc::new(Semaphore::new(settings.max_in_flight)),
            submission_timeout: settings.submission_timeout,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Handles `request` in the background and returns immediately.
    pub fn dispatch(self: &Arc<Self>, request: StatusRequest) {
        let guard = self.in_flight.enter();
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            dispatcher.on_request(request).await;
        });
    }

    /// Number of background dispatches still running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Waits up to `limit` for background dispatches to finish. Returns
    /// whether everything completed.
    pub async fn drain(&self, limit: Duration) -> bool {
        let idle = async {
            loop {
                let notified = self.in_flight.idle.notified();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(limit, idle).await.is_ok()
    }

    pub async fn on_request(&self, request: StatusRequest) -> DispatchReport {
        let span = info_span!(
            "dispatch",
            dispatch_id = %Uuid::new_v4(),
            index = request.target_index,
            flight = %request.subject.flight,
            timestamp = request.subject.timestamp,
        );
        self.handle(request).instrument(span).await
    }

    async fn handle(&self, request: StatusRequest) -> DispatchReport {
        let mut report = DispatchReport::default();

        // One task per identity; a slow lookup or submission only holds up
        // its own identity.
        let request = Arc::new(request);
        let mut attempts = JoinSet::new();
        for identity in self.registry.handles() {
            let attempt = Attempt {
                identity,
                request: Arc::clone(&request),
                cache: Arc::clone(&self.cache),
                ledger: Arc::clone(&self.ledger),
                generator: Arc::clone(&self.generator),
                permits: Arc::clone(&self.permits),
                timeout: self.submission_timeout,
            };
            attempts.spawn(attempt.run().instrument(Span::current()));
        }

        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok(Outcome::Unassigned) => {}
                Ok(Outcome::LookupFailed(identity, err)) => {
                    report.lookup_failed += 1;
                    warn!(account = %identity, error = %err, "skipping oracle with unknown indexes");
                }
                Ok(Outcome::Submitted(response)) => {
                    report.matched.push(response.identity);
                    report.submitted += 1;
                    self.health.record_submission(true);
                    info!(
                        account = %response.identity,
                        status = response.status.code(),
                        "oracle response submitted"
                    );
                }
                Ok(Outcome::Rejected(identity, err)) => {
                    report.matched.push(identity);
                    report.rejected += 1;
                    self.health.record_submission(false);
                    warn!(account = %identity, error = %err, "oracle response dropped");
                }
                Err(join_error) => {
                    report.rejected += 1;
                    self.health.record_submission(false);
                    error!(error = %join_error, "oracle submission task failed");
                }
            }
        }

        report.matched.sort();
        if report.matched.is_empty() && report.lookup_failed == 0 {
            info!("no registered oracle holds this index");
        } else {
            debug!(
                matched = report.matched.len(),
                submitted = report.submitted,
                "request handled"
            );
        }

        report
    }
}

/// How one identity's attempt at a request ended
enum Outcome {
    Unassigned,
    LookupFailed(Address, LedgerError),
    Submitted(StatusResponse),
    Rejected(Address, LedgerError),
}

/// One identity's answer to one request: resolve indexes, then submit if the
/// request targets one of them.
struct Attempt {
    identity: Address,
    request: Arc<StatusRequest>,
    cache: Arc<IndexAssignmentCache>,
    ledger: Arc<dyn Ledger>,
    generator: Arc<dyn StatusGenerator>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl Attempt {
    async fn run(self) -> Outcome {
        match self.cache.indexes_of(self.identity).await {
            Ok(indexes) if indexes.contains(self.request.target_index) => {}
            Ok(_) => return Outcome::Unassigned,
            Err(err) => return Outcome::LookupFailed(self.identity, err),
        }

        match self.submit().await {
            Ok(response) => Outcome::Submitted(response),
            Err(err) => Outcome::Rejected(self.identity, err),
        }
    }

    async fn submit(&self) -> Result<StatusResponse, LedgerError> {
        let rejected = |reason: String| LedgerError::SubmissionRejected {
            account: self.identity,
            reason,
        };

        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| rejected("dispatcher shut down".to_string()))?;

        let response = StatusResponse {
            identity: self.identity,
            target_index: self.request.target_index,
            subject: self.request.subject.clone(),
            status: self.generator.generate(&self.request),
        };

        match tokio::time::timeout(self.timeout, self.ledger.submit_response(&response)).await {
            Ok(Ok(())) => Ok(response),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(rejected(format!("no answer within {:?}", self.timeout))),
        }
    }
}
