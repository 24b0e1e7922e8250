//! Contract ABI handling on top of `alloy-json-abi` (document model, selectors,
//! topics) and `alloy-dyn-abi` (calldata and log codecs), for ABIs loaded at runtime.

use alloy_dyn_abi::{DynSolValue, EventExt, FunctionExt, JsonAbiExt};
use alloy_json_abi::JsonAbi;
use alloy_primitives::{Bytes, U256};
use serde_json::Value;
use shared::{
    domain::{MintNotification, TokenId, WalletAddress},
    protocol::RawLog,
};
use thiserror::Error;

pub use alloy_json_abi::{Event as AbiEvent, Function as AbiFunction};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("malformed ABI document: {0}")]
    Document(String),
    #[error("ABI has no function named '{0}'")]
    MissingFunction(String),
    #[error("ABI has no event named '{0}'")]
    MissingEvent(String),
    #[error("failed to encode call to '{function}': {reason}")]
    Encode { function: String, reason: String },
    #[error("unexpected output from '{function}': {reason}")]
    Output { function: String, reason: String },
    #[error("log does not match event '{event}': {reason}")]
    LogMismatch { event: String, reason: String },
    #[error("event '{0}' has no address and uint argument pair")]
    UnsupportedEventShape(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractAbi {
    abi: JsonAbi,
}

impl ContractAbi {
    /// Accepts either a compiler artifact (`{"abi": [...]}`) or a bare ABI array.
    pub fn from_json(document: &str) -> Result<Self, AbiError> {
        let document = match serde_json::from_str::<Value>(document)
            .map_err(|err| AbiError::Document(err.to_string()))?
        {
            Value::Object(mut artifact) if artifact.contains_key("abi") => {
                artifact.remove("abi").unwrap_or_default()
            }
            other => other,
        };
        let abi = serde_json::from_value::<JsonAbi>(document)
            .map_err(|err| AbiError::Document(err.to_string()))?;
        Ok(Self { abi })
    }

    /// First declaration wins when the name is overloaded.
    pub fn function(&self, name: &str) -> Result<&AbiFunction, AbiError> {
        self.abi
            .function(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| AbiError::MissingFunction(name.to_string()))
    }

    pub fn event(&self, name: &str) -> Result<&AbiEvent, AbiError> {
        self.abi
            .event(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| AbiError::MissingEvent(name.to_string()))
    }
}

/// Calldata for a function that takes no arguments.
pub fn encode_call(function: &AbiFunction) -> Result<Bytes, AbiError> {
    function
        .abi_encode_input(&[])
        .map(Bytes::from)
        .map_err(|err| AbiError::Encode {
            function: function.name.clone(),
            reason: err.to_string(),
        })
}

/// Decodes the return data of a function whose first output is a uint.
pub fn decode_uint_output(function: &AbiFunction, output: &[u8]) -> Result<U256, AbiError> {
    let output_error = |reason: String| AbiError::Output {
        function: function.name.clone(),
        reason,
    };

    let values = function
        .abi_decode_output(output, true)
        .map_err(|err| output_error(err.to_string()))?;
    match values.first() {
        Some(DynSolValue::Uint(value, _)) => Ok(*value),
        Some(other) => Err(output_error(format!("expected a uint, got {other:?}"))),
        None => Err(output_error("function declares no outputs".to_string())),
    }
}

/// Decodes an event carrying one address and one uint argument, in either
/// order, indexed or not.
pub fn decode_mint_notification(
    event: &AbiEvent,
    log: &RawLog,
) -> Result<MintNotification, AbiError> {
    let decoded = event
        .decode_log_parts(log.topics.iter().copied(), &log.data, true)
        .map_err(|err| AbiError::LogMismatch {
            event: event.name.clone(),
            reason: err.to_string(),
        })?;

    let mut indexed = decoded.indexed.into_iter();
    let mut body = decoded.body.into_iter();
    let mut from = None;
    let mut token_id = None;
    for input in &event.inputs {
        let value = if input.indexed {
            indexed.next()
        } else {
            body.next()
        };
        match value {
            Some(DynSolValue::Address(address)) if from.is_none() => {
                from = Some(WalletAddress(address));
            }
            Some(DynSolValue::Uint(value, _)) if token_id.is_none() => {
                token_id = Some(TokenId(value));
            }
            _ => {}
        }
    }

    match (from, token_id) {
        (Some(from), Some(token_id)) => Ok(MintNotification { from, token_id }),
        _ => Err(AbiError::UnsupportedEventShape(event.name.clone())),
    }
}

#[cfg(test)]
#[path = "tests/abi_tests.rs"]
mod tests;
