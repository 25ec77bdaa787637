//! Flight status generation

use rand::seq::SliceRandom;

use crate::models::{FlightStatus, StatusRequest};

/// Picks the status an oracle reports for a request
pub trait StatusGenerator: Send + Sync + 'static {
    fn generate(&self, request: &StatusRequest) -> FlightStatus;
}

/// Uniform random choice over every status code
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomStatusGenerator;

impl StatusGenerator for RandomStatusGenerator {
    fn generate(&self, _request: &StatusRequest) -> FlightStatus {
        *FlightStatus::ALL
            .choose(&mut rand::thread_rng())
            .unwrap_or(&FlightStatus::Unknown)
    }
}

/// Always reports the same status
#[derive(Debug, Clone, Copy)]
pub struct FixedStatusGenerator(pub FlightStatus);

impl StatusGenerator for FixedStatusGenerator {
    fn generate(&self, _request: &StatusRequest) -> FlightStatus {
        self.0
    }
}
