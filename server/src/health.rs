//! Shared fleet health indicators

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

/// Counters and flags updated by the listener and dispatcher
#[derive(Debug, Default)]
pub struct FleetHealth {
    listener_connected: AtomicBool,
    requests_received: AtomicU64,
    submissions_accepted: AtomicU64,
    submissions_rejected: AtomicU64,
    last_request_at: RwLock<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub listener_connected: bool,
    pub requests_received: u64,
    pub submissions_accepted: u64,
    pub submissions_rejected: u64,
    pub last_request_at: Option<DateTime<Utc>>,
}

impl FleetHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listener_connected(&self, connected: bool) {
        self.listener_connected.store(connected, Ordering::SeqCst);
    }

    pub fn listener_connected(&self) -> bool {
        self.listener_connected.load(Ordering::SeqCst)
    }

    pub async fn record_request(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
        *self.last_request_at.write().await = Some(Utc::now());
    }

    pub fn record_submission(&self, accepted: bool) {
        let counter = if accepted {
            &self.submissions_accepted
        } else {
            &self.submissions_rejected
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            listener_connected: self.listener_connected(),
            requests_received: self.requests_received.load(Ordering::Relaxed),
            submissions_accepted: self.submissions_accepted.load(Ordering::Relaxed),
            submissions_rejected: self.submissions_rejected.load(Ordering::Relaxed),
            last_request_at: *self.last_request_at.read().await,
        }
    }
}
