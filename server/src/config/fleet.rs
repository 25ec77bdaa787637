//! Fleet configuration loaded from the environment

use std::env;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::ledger::SubscriptionPoint;
use crate::models::{Address, FlightStatus};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:7545";
const DEFAULT_TX_GAS: u64 = 9_999_999;
const DEFAULT_MAX_IN_FLIGHT: usize = 64;
const DEFAULT_SUBMISSION_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_DRAIN_SECONDS: u64 = 10;
const DEFAULT_RPC_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_PORT: u16 = 3001;

/// Half-open slice `[start, end)` of the ledger's account list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountRange {
    pub start: usize,
    pub end: usize,
}

impl AccountRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Selects the oracle accounts, or `None` if the ledger has too few.
    pub fn select<'a>(&self, accounts: &'a [Address]) -> Option<&'a [Address]> {
        accounts.get(self.as_range())
    }
}

impl fmt::Display for AccountRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl FromStr for AccountRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .trim()
            .split_once("..")
            .ok_or_else(|| format!("expected `start..end`, got `{s}`"))?;
        let start: usize = start.trim().parse().map_err(|e| format!("bad start: {e}"))?;
        let end: usize = end.trim().parse().map_err(|e| format!("bad end: {e}"))?;
        if end <= start {
            return Err(format!("range {start}..{end} is empty"));
        }
        Ok(AccountRange { start, end })
    }
}

#[derive(Clone, Debug)]
pub struct FleetConfig {
    pub rpc_url: String,
    pub ws_url: String,
    pub contract_address: Address,
    pub account_range: AccountRange,
    pub stake_wei: u128,
    pub subscribe_from: SubscriptionPoint,
    pub tx_gas: u64,
    /// Bound on each ledger request, including index lookups
    pub rpc_timeout: Duration,
    pub max_in_flight: usize,
    pub submission_timeout: Duration,
    pub drain_timeout: Duration,
    /// Report this status instead of a random one
    pub fixed_status: Option<FlightStatus>,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl FleetConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_url = lookup("LEDGER_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        let ws_url = lookup("LEDGER_WS_URL").unwrap_or_else(|| rpc_url.replacen("http", "ws", 1));

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let max_in_flight = parse_or(&lookup, "MAX_IN_FLIGHT_SUBMISSIONS", DEFAULT_MAX_IN_FLIGHT)?;
        if max_in_flight == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_IN_FLIGHT_SUBMISSIONS",
                reason: "must be at least 1".to_string(),
            });
        }

        let fixed_status = match lookup("ORACLE_FIXED_STATUS") {
            Some(raw) => Some(parse_status(&raw)?),
            None => None,
        };

        Ok(Self {
            contract_address: required(&lookup, "FLIGHT_SURETY_APP_ADDRESS")?,
            account_range: required(&lookup, "ORACLE_ACCOUNT_RANGE")?,
            stake_wei: required(&lookup, "ORACLE_STAKE_WEI")?,
            subscribe_from: parse_or(&lookup, "SUBSCRIBE_FROM", SubscriptionPoint::Genesis)?,
            tx_gas: parse_or(&lookup, "ORACLE_TX_GAS", DEFAULT_TX_GAS)?,
            rpc_timeout: Duration::from_secs(parse_or(
                &lookup,
                "LEDGER_RPC_TIMEOUT_SECONDS",
                DEFAULT_RPC_TIMEOUT_SECONDS,
            )?),
            max_in_flight,
            submission_timeout: Duration::from_secs(parse_or(
                &lookup,
                "SUBMISSION_TIMEOUT_SECONDS",
                DEFAULT_SUBMISSION_TIMEOUT_SECONDS,
            )?),
            drain_timeout: Duration::from_secs(parse_or(
                &lookup,
                "SHUTDOWN_DRAIN_SECONDS",
                DEFAULT_DRAIN_SECONDS,
            )?),
            fixed_status,
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            rpc_url,
            ws_url,
            cors_allowed_origins,
        })
    }
}

fn required<F, T>(lookup: &F, name: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = lookup(name).ok_or(ConfigError::Missing(name))?;
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_status(raw: &str) -> Result<FlightStatus, ConfigError> {
    let invalid = || ConfigError::Invalid {
        name: "ORACLE_FIXED_STATUS",
        reason: format!("`{raw}` is not one of 0, 10, 20, 30, 40, 50"),
    };
    let code: u8 = raw.trim().parse().map_err(|_| invalid())?;
    FlightStatus::from_code(code).ok_or_else(invalid)
}
