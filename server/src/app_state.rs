//! Application state shared across handlers

use std::sync::Arc;

use crate::health::FleetHealth;
use crate::services::{IdentityRegistry, IndexAssignmentCache};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<IdentityRegistry>,
    pub cache: Arc<IndexAssignmentCache>,
    pub health: Arc<FleetHealth>,
}

impl AppState {
    pub fn new(
        registry: Arc<IdentityRegistry>,
        cache: Arc<IndexAssignmentCache>,
        health: Arc<FleetHealth>,
    ) -> Self {
        Self {
            registry,
            cache,
            health,
        }
    }
}

