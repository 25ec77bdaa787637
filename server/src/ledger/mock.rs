//! Scripted in-memory ledger for tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use super::{Ledger, RequestStream, SubscriptionPoint};
use crate::error::LedgerError;
use crate::models::{Address, FlightRef, IndexSet, ObservedRequest, StatusRequest, StatusResponse};

/// One answer to `subscribe_requests`
pub enum Session {
    Refuse(LedgerError),
    /// Yields the items, then ends (a dropped connection).
    Finite(Vec<Result<ObservedRequest, LedgerError>>),
    /// Yields the items, then stays open.
    Open(Vec<Result<ObservedRequest, LedgerError>>),
}

#[derive(Default)]
pub struct MockLedger {
    indexes: HashMap<Address, IndexSet>,
    lookup_delay: Option<Duration>,
    lookup_failures: Mutex<HashMap<Address, u32>>,
    lookup_hangs: Mutex<HashMap<Address, u32>>,
    lookup_calls: Mutex<HashMap<Address, usize>>,
    refused_registrations: HashSet<Address>,
    registrations: Mutex<Vec<(Address, u128)>>,
    rejected_submitters: HashSet<Address>,
    submission_delay: HashMap<Address, Duration>,
    submissions: Mutex<Vec<StatusResponse>>,
    active_submissions: AtomicUsize,
    peak_submissions: AtomicUsize,
    sessions: Mutex<VecDeque<Session>>,
    subscribe_points: Mutex<Vec<SubscriptionPoint>>,
    subscribe_times: Mutex<Vec<Instant>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_indexes(mut self, account: Address, indexes: [u8; 3]) -> Self {
        self.indexes.insert(account, IndexSet(indexes));
        self
    }

    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    /// The next `times` lookups for `account` fail.
    pub fn failing_lookups(self, account: Address, times: u32) -> Self {
        self.lookup_failures
            .lock()
            .unwrap()
            .insert(account, times);
        self
    }

    /// The next `times` lookups for `account` never answer.
    pub fn hanging_lookups(self, account: Address, times: u32) -> Self {
        self.lookup_hangs.lock().unwrap().insert(account, times);
        self
    }

    pub fn refusing_registration(mut self, account: Address) -> Self {
        self.refused_registrations.insert(account);
        self
    }

    pub fn rejecting_submissions_from(mut self, account: Address) -> Self {
        self.rejected_submitters.insert(account);
        self
    }

    pub fn with_submission_delay(mut self, account: Address, delay: Duration) -> Self {
        self.submission_delay.insert(account, delay);
        self
    }

    pub fn with_session(self, session: Session) -> Self {
        self.sessions.lock().unwrap().push_back(session);
        self
    }

    pub fn lookup_calls(&self, account: Address) -> usize {
        self.lookup_calls
            .lock()
            .unwrap()
            .get(&account)
            .copied()
            .unwrap_or_default()
    }

    pub fn registrations(&self) -> Vec<(Address, u128)> {
        self.registrations.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<StatusResponse> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn subscribe_points(&self) -> Vec<SubscriptionPoint> {
        self.subscribe_points.lock().unwrap().clone()
    }

    /// Gaps between consecutive `subscribe_requests` calls
    pub fn subscribe_gaps(&self) -> Vec<Duration> {
        let times = self.subscribe_times.lock().unwrap();
        times.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }

    /// Most submissions ever in progress at once
    pub fn peak_submissions(&self) -> usize {
        self.peak_submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn register(&self, account: Address, stake: u128) -> Result<(), LedgerError> {
        if self.refused_registrations.contains(&account) {
            return Err(LedgerError::RegistrationFailed {
                account,
                reason: "already registered".to_string(),
            });
        }
        self.registrations.lock().unwrap().push((account, stake));
        Ok(())
    }

    async fn indexes_of(&self, account: Address) -> Result<IndexSet, LedgerError> {
        *self.lookup_calls.lock().unwrap().entry(account).or_default() += 1;

        if take_one(&self.lookup_hangs, account) {
            futures_util::future::pending::<()>().await;
        }

        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }

        if take_one(&self.lookup_failures, account) {
            return Err(LedgerError::LookupFailed {
                account,
                reason: "node unavailable".to_string(),
            });
        }

        self.indexes
            .get(&account)
            .copied()
            .ok_or_else(|| LedgerError::LookupFailed {
                account,
                reason: "not an oracle".to_string(),
            })
    }

    async fn subscribe_requests(&self, from: SubscriptionPoint) -> Result<RequestStream, LedgerError> {
        self.subscribe_points.lock().unwrap().push(from);
        self.subscribe_times.lock().unwrap().push(Instant::now());

        let session = self.sessions.lock().unwrap().pop_front();
        match session {
            Some(Session::Refuse(err)) => Err(err),
            Some(Session::Finite(items)) => Ok(stream::iter(items).boxed()),
            Some(Session::Open(items)) => Ok(stream::iter(items).chain(stream::pending()).boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }

    async fn submit_response(&self, response: &StatusResponse) -> Result<(), LedgerError> {
        let _active = ActiveSubmission::enter(self);
        if let Some(delay) = self.submission_delay.get(&response.identity) {
            tokio::time::sleep(*delay).await;
        }
        if self.rejected_submitters.contains(&response.identity) {
            return Err(LedgerError::SubmissionRejected {
                account: response.identity,
                reason: "unauthorized oracle".to_string(),
            });
        }
        self.submissions.lock().unwrap().push(response.clone());
        Ok(())
    }
}

/// Consumes one scripted occurrence for `account`, if any remain.
fn take_one(counts: &Mutex<HashMap<Address, u32>>, account: Address) -> bool {
    let mut counts = counts.lock().unwrap();
    match counts.get_mut(&account) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

struct ActiveSubmission<'a>(&'a AtomicUsize);

impl<'a> ActiveSubmission<'a> {
    fn enter(ledger: &'a MockLedger) -> Self {
        let now = ledger.active_submissions.fetch_add(1, Ordering::SeqCst) + 1;
        ledger.peak_submissions.fetch_max(now, Ordering::SeqCst);
        ActiveSubmission(&ledger.active_submissions)
    }
}

impl Drop for ActiveSubmission<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Deterministic account `n` for fixtures
pub fn account(n: u8) -> Address {
    let mut raw = [0u8; 20];
    raw[0] = 0xaa;
    raw[19] = n;
    Address::new(raw)
}

pub fn request(target_index: u8, flight: &str) -> StatusRequest {
    StatusRequest {
        target_index,
        subject: FlightRef {
            airline: account(200),
            flight: flight.to_string(),
            timestamp: 1_600_000_000,
        },
    }
}

pub fn observed(target_index: u8, flight: &str, block: u64) -> ObservedRequest {
    ObservedRequest {
        request: request(target_index, flight),
        block_number: Some(block),
    }
}
