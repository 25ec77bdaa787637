//! FlightSurety Oracle Fleet Library
//!
//! A fleet of simulated oracles for the FlightSurety contract: registration,
//! index assignment lookup, `OracleRequest` subscription and response
//! dispatch, plus the HTTP health surface.

pub mod app_state;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod services;
