//! Ethereum JSON-RPC binding of the ledger interface

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Bytes, U256, U64};
use async_trait::async_trait;
use futures_util::{stream, SinkExt, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::abi;
use super::{Ledger, RequestStream, SubscriptionPoint};
use crate::config::FleetConfig;
use crate::error::LedgerError;
use crate::models::{Address, IndexSet, ObservedRequest, StatusResponse};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const RECEIPT_POLL_ATTEMPTS: u32 = 40;
const SUBSCRIBE_REQUEST_ID: u64 = 1;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Failure of a single JSON-RPC exchange
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("node error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RpcError {
    fn reason(&self) -> String {
        self.to_string()
    }
}

/// Ledger client talking to a development node that holds the oracle
/// accounts unlocked (Ganache or similar).
pub struct EthLedger {
    rpc_url: String,
    ws_url: String,
    contract: Address,
    gas: u64,
    request_timeout: Duration,
    http: Client,
    next_id: AtomicU64,
}

impl EthLedger {
    /// Every HTTP exchange, and the WebSocket handshake, is bounded by
    /// `request_timeout`.
    pub fn new(
        rpc_url: String,
        ws_url: String,
        contract: Address,
        gas: u64,
        request_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| LedgerError::connection(format!("http client: {err}")))?;

        Ok(Self {
            rpc_url,
            ws_url,
            contract,
            gas,
            request_timeout,
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &FleetConfig) -> Result<Self, LedgerError> {
        Self::new(
            config.rpc_url.clone(),
            config.ws_url.clone(),
            config.contract_address,
            config.tx_gas,
            config.rpc_timeout,
        )
    }

    /// Accounts the node controls, in the node's order.
    pub async fn accounts(&self) -> Result<Vec<Address>, LedgerError> {
        let result = self
            .rpc_call("eth_accounts", json!([]))
            .await
            .map_err(|err| LedgerError::connection(format!("eth_accounts failed: {err}")))?;

        serde_json::from_value::<Vec<Address>>(result)
            .map_err(|err| LedgerError::Decode(format!("eth_accounts: {err}")))
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .http
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        if let Some(err) = response.get("error") {
            return Err(RpcError::Node {
                code: err.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        response
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::Malformed(format!("no result in {method} response")))
    }

    /// Sends a transaction from `from` to the contract and waits for its
    /// receipt. A reverted receipt is reported as a node error.
    async fn transact(&self, from: Address, data: Vec<u8>, value: u128) -> Result<String, RpcError> {
        let tx = json!({
            "from": from,
            "to": self.contract,
            "gas": U64::from(self.gas),
            "value": U256::from(value),
            "data": Bytes::from(data),
        });

        let tx_hash = self
            .rpc_call("eth_sendTransaction", json!([tx]))
            .await?
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| RpcError::Malformed("eth_sendTransaction returned no hash".into()))?;

        self.wait_for_receipt(&tx_hash).await?;
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<(), RpcError> {
        for _ in 0..RECEIPT_POLL_ATTEMPTS {
            let receipt = self
                .rpc_call("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;

            if receipt.is_null() {
                sleep(RECEIPT_POLL_INTERVAL).await;
                continue;
            }

            return match receipt.get("status").and_then(Value::as_str) {
                Some("0x0") => Err(RpcError::Node {
                    code: 0,
                    message: format!("transaction {tx_hash} reverted"),
                }),
                _ => Ok(()),
            };
        }

        Err(RpcError::Malformed(format!("no receipt for {tx_hash}")))
    }

    fn request_filter(&self) -> Value {
        json!({
            "address": self.contract,
            "topics": [abi::event_topic(abi::ORACLE_REQUEST_EVENT)],
        })
    }

    async fn backfill(&self, from: SubscriptionPoint) -> Result<Vec<Value>, LedgerError> {
        let from_block = match from {
            SubscriptionPoint::Latest => return Ok(Vec::new()),
            SubscriptionPoint::Genesis => json!("earliest"),
            SubscriptionPoint::Block(n) => json!(U64::from(n)),
        };

        let mut filter = self.request_filter();
        filter["fromBlock"] = from_block;
        filter["toBlock"] = json!("latest");

        let logs = self
            .rpc_call("eth_getLogs", json!([filter]))
            .await
            .map_err(|err| LedgerError::connection(format!("eth_getLogs failed: {err}")))?;

        Ok(logs.as_array().cloned().unwrap_or_default())
    }

    /// Connects the WebSocket and waits for the `eth_subscribe` ack.
    async fn open_subscription(&self) -> Result<(WsStream, String), LedgerError> {
        let (mut socket, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|err| LedgerError::connection(format!("websocket connect: {err}")))?;

        let subscribe = json!({
            "jsonrpc": "2.0",
            "id": SUBSCRIBE_REQUEST_ID,
            "method": "eth_subscribe",
            "params": ["logs", self.request_filter()],
        });
        socket
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|err| LedgerError::connection(format!("eth_subscribe send: {err}")))?;

        let subscription_id = loop {
            let frame = socket
                .next()
                .await
                .ok_or_else(|| LedgerError::connection("socket closed before subscription ack"))?
                .map_err(|err| LedgerError::connection(err.to_string()))?;

            let Message::Text(text) = frame else { continue };
            let reply: Value = serde_json::from_str(&text)
                .map_err(|err| LedgerError::connection(format!("bad subscription ack: {err}")))?;
            if reply.get("id").and_then(Value::as_u64) != Some(SUBSCRIBE_REQUEST_ID) {
                continue;
            }
            if let Some(err) = reply.get("error") {
                return Err(LedgerError::connection(format!("eth_subscribe rejected: {err}")));
            }
            break reply
                .get("result")
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .ok_or_else(|| LedgerError::connection("eth_subscribe returned no id"))?;
        };

        Ok((socket, subscription_id))
    }
}

#[async_trait]
impl Ledger for EthLedger {
    async fn register(&self, account: Address, stake: u128) -> Result<(), LedgerError> {
        let data = abi::encode_call(abi::REGISTER_ORACLE, &[]);
        let tx_hash = self
            .transact(account, data, stake)
            .await
            .map_err(|err| LedgerError::RegistrationFailed {
                account,
                reason: err.reason(),
            })?;

        debug!(account = %account, tx_hash = %tx_hash, "registerOracle mined");
        Ok(())
    }

    async fn indexes_of(&self, account: Address) -> Result<IndexSet, LedgerError> {
        let call = json!({
            "from": account,
            "to": self.contract,
            "data": Bytes::from(abi::encode_call(abi::GET_MY_INDEXES, &[])),
        });

        let lookup_failed = |reason: String| LedgerError::LookupFailed { account, reason };

        let result = self
            .rpc_call("eth_call", json!([call, "latest"]))
            .await
            .map_err(|err| lookup_failed(err.reason()))?;

        let bytes = result
            .as_str()
            .ok_or_else(|| lookup_failed("eth_call result is not a string".to_string()))
            .and_then(|raw| parse_hex_bytes(raw).map_err(lookup_failed))?;

        abi::decode_index_set(&bytes).map_err(|err| lookup_failed(err.to_string()))
    }

    async fn subscribe_requests(&self, from: SubscriptionPoint) -> Result<RequestStream, LedgerError> {
        let (socket, subscription_id) = timeout(self.request_timeout, self.open_subscription())
            .await
            .map_err(|_| {
                LedgerError::connection(format!(
                    "eth_subscribe not acknowledged within {:?}",
                    self.request_timeout
                ))
            })??;

        // Subscribed before backfilling so nothing falls between the two; the
        // overlap shows up as duplicate deliveries.
        let history = self.backfill(from).await?;
        debug!(subscription_id = %subscription_id, backfilled = history.len(), "subscribed to OracleRequest logs");

        let backlog = stream::iter(history.into_iter().filter_map(|log| decode_log(&log)));
        let live = socket.filter_map(move |frame| {
            let item = match frame {
                Ok(Message::Text(text)) => decode_notification(&text, &subscription_id),
                Ok(Message::Close(frame)) => Some(Err(LedgerError::connection(format!(
                    "subscription closed by ledger: {frame:?}"
                )))),
                Ok(_) => None,
                Err(err) => Some(Err(LedgerError::connection(err.to_string()))),
            };
            async move { item }
        });

        Ok(backlog.chain(live).boxed())
    }

    async fn submit_response(&self, response: &StatusResponse) -> Result<(), LedgerError> {
        let data = abi::encode_submit_response(response);
        self.transact(response.identity, data, 0)
            .await
            .map(|_| ())
            .map_err(|err| LedgerError::SubmissionRejected {
                account: response.identity,
                reason: err.reason(),
            })
    }
}

/// Extracts the log carried by an `eth_subscription` notification.
fn decode_notification(
    text: &str,
    subscription_id: &str,
) -> Option<Result<ObservedRequest, LedgerError>> {
    let notification: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => return Some(Err(LedgerError::Decode(err.to_string()))),
    };
    let params = notification.get("params")?;
    if params.get("subscription").and_then(Value::as_str) != Some(subscription_id) {
        return None;
    }
    decode_log(params.get("result")?)
}

/// Turns one log object into a request. Removed (reorged) logs are dropped.
fn decode_log(log: &Value) -> Option<Result<ObservedRequest, LedgerError>> {
    if log.get("removed").and_then(Value::as_bool) == Some(true) {
        warn!("skipping removed OracleRequest log");
        return None;
    }

    let decoded = log
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| LedgerError::Decode("log without data".to_string()))
        .and_then(|raw| parse_hex_bytes(raw).map_err(LedgerError::Decode))
        .and_then(|bytes| abi::decode_oracle_request(&bytes).map_err(LedgerError::from))
        .map(|request| ObservedRequest {
            request,
            block_number: log
                .get("blockNumber")
                .and_then(Value::as_str)
                .and_then(parse_hex_quantity),
        });

    Some(decoded)
}

fn parse_hex_bytes(raw: &str) -> Result<Bytes, String> {
    raw.parse::<Bytes>()
        .map_err(|err| format!("invalid hex payload: {err}"))
}

fn parse_hex_quantity(raw: &str) -> Option<u64> {
    raw.parse::<U64>().ok().and_then(|n| u64::try_from(n).ok())
}
