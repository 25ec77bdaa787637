//! API handlers for the oracle fleet server

pub mod health;
pub mod oracle;

pub use health::{api_info, health_check, not_found, root};
pub use oracle::list_oracles;
