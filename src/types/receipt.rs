use super::serde_helpers::u256_from_value;
use crate::error::{Error, Result};
use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Execution status of a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// A log as returned by a backend, either raw or already decoded
#[derive(Debug, Clone, PartialEq)]
pub enum RawLog {
    /// Node-style log: emitter, topics and data
    Raw {
        address: Address,
        topics: Vec<B256>,
        data: Bytes,
    },
    /// Backend-decoded log: event name and named arguments
    Decoded {
        address: Option<Address>,
        event: String,
        args: Map<String, Value>,
    },
}

/// A backend-native receipt before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawReceipt {
    pub transaction_hash: B256,
    pub status: ReceiptStatus,
    pub logs: Vec<RawLog>,
}

impl RawReceipt {
    /// Parse an `eth_getTransactionReceipt` result (or the nested `receipt` of
    /// `eth_getUserOperationReceipt`)
    pub fn from_rpc(value: &Value) -> Result<Self> {
        let transaction_hash = value
            .get("transactionHash")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidParameter("receipt missing transactionHash".into()))?
            .parse::<B256>()
            .map_err(|e| Error::InvalidParameter(format!("transactionHash: {}", e)))?;

        // Pre-Byzantium receipts carry no status; treat them as successful.
        let status = match value.get("status") {
            Some(v) if !v.is_null() => {
                if u256_from_value(v)?.is_zero() {
                    ReceiptStatus::Reverted
                } else {
                    ReceiptStatus::Success
                }
            }
            _ => ReceiptStatus::Success,
        };

        let logs = value
            .get("logs")
            .and_then(Value::as_array)
            .map(|logs| logs.iter().map(parse_log).collect::<Result<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            transaction_hash,
            status,
            logs,
        })
    }
}

fn parse_log(value: &Value) -> Result<RawLog> {
    let address = value
        .get("address")
        .and_then(Value::as_str)
        .map(|s| {
            s.parse::<Address>()
                .map_err(|e| Error::InvalidParameter(format!("log address: {}", e)))
        })
        .transpose()?;

    if let Some(event) = value.get("event").and_then(Value::as_str) {
        let args = value
            .get("args")
            .or_else(|| value.get("returnValues"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        return Ok(RawLog::Decoded {
            address,
            event: event.to_string(),
            args,
        });
    }

    let address =
        address.ok_or_else(|| Error::InvalidParameter("raw log missing address".into()))?;
    let topics = value
        .get("topics")
        .and_then(Value::as_array)
        .map(|topics| {
            topics
                .iter()
                .map(|t| {
                    t.as_str()
                        .unwrap_or_default()
                        .parse::<B256>()
                        .map_err(|e| Error::InvalidParameter(format!("log topic: {}", e)))
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();
    let data = match value.get("data").and_then(Value::as_str) {
        Some(s) => super::serde_helpers::parse_bytes(s)?,
        None => Bytes::new(),
    };

    Ok(RawLog::Raw {
        address,
        topics,
        data,
    })
}

/// One decoded event occurrence: parameter name → value
pub type EventFields = BTreeMap<String, Value>;

/// Backend-agnostic outcome of a state-changing call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedReceipt {
    pub transaction_hash: B256,
    pub status: ReceiptStatus,
    /// Event name → occurrences in emission order
    pub events: BTreeMap<String, Vec<EventFields>>,
}

impl NormalizedReceipt {
    /// Occurrences of `name`, empty when the event was not emitted
    pub fn events_named(&self, name: &str) -> &[EventFields] {
        self.events.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_raw_rpc_receipt() {
        let value = json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "status": "0x1",
            "logs": [{
                "address": "0x4D97DCd97eC945f40cF65F87097ACe5EA0476045",
                "topics": [format!("0x{}", "01".repeat(32))],
                "data": "0x00ff"
            }]
        });

        let receipt = RawReceipt::from_rpc(&value).unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Success);
        assert_eq!(receipt.logs.len(), 1);
        match &receipt.logs[0] {
            RawLog::Raw { topics, data, .. } => {
                assert_eq!(topics.len(), 1);
                assert_eq!(data.as_ref(), &[0x00, 0xff]);
            }
            other => panic!("unexpected log {:?}", other),
        }
    }

    #[test]
    fn test_parse_decoded_log_and_reverted_status() {
        let value = json!({
            "transactionHash": format!("0x{}", "cd".repeat(32)),
            "status": 0,
            "logs": [{
                "event": "SharesBought",
                "args": { "amount": 5 }
            }]
        });

        let receipt = RawReceipt::from_rpc(&value).unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Reverted);
        assert!(matches!(
            &receipt.logs[0],
            RawLog::Decoded { event, address: None, .. } if event == "SharesBought"
        ));
    }

    #[test]
    fn test_missing_hash_is_error() {
        assert!(RawReceipt::from_rpc(&json!({ "status": "0x1" })).is_err());
    }
}
