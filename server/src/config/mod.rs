//! Startup configuration

pub mod fleet;

pub use fleet::{AccountRange, FleetConfig};
