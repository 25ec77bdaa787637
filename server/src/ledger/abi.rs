//! Minimal Solidity ABI codec for the FlightSurety oracle surface

use alloy_primitives::{keccak256, Address, B256, U256};
use thiserror::Error;

use crate::error::LedgerError;
use crate::models::{FlightRef, IndexSet, StatusRequest, StatusResponse};

pub const REGISTER_ORACLE: &str = "registerOracle()";
pub const GET_MY_INDEXES: &str = "getMyIndexes()";
pub const SUBMIT_ORACLE_RESPONSE: &str =
    "submitOracleResponse(uint8,address,string,uint256,uint8)";
pub const ORACLE_REQUEST_EVENT: &str = "OracleRequest(uint8,address,string,uint256)";

const WORD: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AbiError {
    #[error("payload truncated: need {needed} bytes, have {len}")]
    Truncated { needed: usize, len: usize },

    #[error("value does not fit in {0}")]
    Overflow(&'static str),

    #[error("string is not valid utf-8")]
    InvalidUtf8,
}

impl From<AbiError> for LedgerError {
    fn from(err: AbiError) -> Self {
        LedgerError::Decode(err.to_string())
    }
}

/// Argument value for call encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(U256),
    Address(Address),
    String(String),
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Encodes `tokens` as a tuple: static heads then dynamic tails.
pub fn encode_tokens(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::Uint(value) => head.extend_from_slice(&value.to_be_bytes::<WORD>()),
            Token::Address(address) => head.extend_from_slice(address.into_word().as_slice()),
            Token::String(value) => {
                let offset = U256::from(head_len + tail.len());
                head.extend_from_slice(&offset.to_be_bytes::<WORD>());
                tail.extend_from_slice(&U256::from(value.len()).to_be_bytes::<WORD>());
                tail.extend_from_slice(value.as_bytes());
                let padding = (WORD - value.len() % WORD) % WORD;
                tail.resize(tail.len() + padding, 0);
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}

pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode_tokens(tokens));
    data
}

pub fn encode_submit_response(response: &StatusResponse) -> Vec<u8> {
    encode_call(
        SUBMIT_ORACLE_RESPONSE,
        &[
            Token::Uint(U256::from(response.target_index)),
            Token::Address(response.subject.airline),
            Token::String(response.subject.flight.clone()),
            Token::Uint(U256::from(response.subject.timestamp)),
            Token::Uint(U256::from(response.status.code())),
        ],
    )
}

/// Decodes the `uint8[3]` returned by `getMyIndexes()`.
pub fn decode_index_set(data: &[u8]) -> Result<IndexSet, AbiError> {
    let mut indexes = [0u8; 3];
    for (slot, index) in indexes.iter_mut().enumerate() {
        *index = read_u8(data, slot * WORD)?;
    }
    Ok(IndexSet(indexes))
}

/// Decodes the non-indexed data of an `OracleRequest` log.
pub fn decode_oracle_request(data: &[u8]) -> Result<StatusRequest, AbiError> {
    let target_index = read_u8(data, 0)?;
    let airline = read_address(data, WORD)?;
    let flight_offset = read_usize(data, 2 * WORD)?;
    let timestamp = read_u64(data, 3 * WORD)?;
    let flight = read_string(data, flight_offset)?;

    Ok(StatusRequest {
        target_index,
        subject: FlightRef {
            airline,
            flight,
            timestamp,
        },
    })
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], AbiError> {
    let end = offset.checked_add(WORD).ok_or(AbiError::Overflow("usize"))?;
    data.get(offset..end).ok_or(AbiError::Truncated {
        needed: end,
        len: data.len(),
    })
}

fn read_uint(data: &[u8], offset: usize) -> Result<U256, AbiError> {
    word_at(data, offset).map(U256::from_be_slice)
}

fn read_u8(data: &[u8], offset: usize) -> Result<u8, AbiError> {
    u8::try_from(read_uint(data, offset)?).map_err(|_| AbiError::Overflow("uint8"))
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64, AbiError> {
    u64::try_from(read_uint(data, offset)?).map_err(|_| AbiError::Overflow("uint64"))
}

fn read_usize(data: &[u8], offset: usize) -> Result<usize, AbiError> {
    usize::try_from(read_uint(data, offset)?).map_err(|_| AbiError::Overflow("usize"))
}

fn read_address(data: &[u8], offset: usize) -> Result<Address, AbiError> {
    let word = B256::from_slice(word_at(data, offset)?);
    if word[..12].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow("address"));
    }
    Ok(Address::from_word(word))
}

fn read_string(data: &[u8], offset: usize) -> Result<String, AbiError> {
    let len = read_usize(data, offset)?;
    let start = offset + WORD;
    let end = start.checked_add(len).ok_or(AbiError::Overflow("usize"))?;
    let bytes = data.get(start..end).ok_or(AbiError::Truncated {
        needed: end,
        len: data.len(),
    })?;
    String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
}
