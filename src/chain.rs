//! Node JSON-RPC client
//!
//! Only the handful of `eth_*` methods the dispatcher needs: reads for the
//! builder, fee data, and the conventional transaction path.

use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::types::{fmt_hex_quantity, RawReceipt};
use crate::types::serde_helpers::{parse_bytes, u256_from_value};
use alloy_primitives::{hex, Address, Bytes, B256, U256};
use serde_json::{json, Value};

/// Current fee parameters for an EIP-1559 chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeData {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

impl FeeData {
    /// Derive fees from a legacy gas price and a suggested tip: the max fee
    /// leaves room for the base fee to double before the operation is priced out
    pub fn from_gas_price(gas_price: U256, tip: U256) -> Self {
        let max_fee = gas_price.saturating_mul(U256::from(2)).max(tip);
        Self {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: tip.min(max_fee),
        }
    }
}

/// Conventional transaction fields for `eth_call` / `eth_estimateGas`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas: Option<u64>,
}

impl CallRequest {
    pub(crate) fn to_json(&self) -> Value {
        let mut obj = json!({
            "to": self.to.to_checksum(None),
            "data": format!("0x{}", hex::encode(&self.data)),
        });
        if let Some(map) = obj.as_object_mut() {
            if let Some(from) = self.from {
                map.insert("from".into(), Value::String(from.to_checksum(None)));
            }
            if !self.value.is_zero() {
                map.insert("value".into(), Value::String(fmt_hex_quantity(self.value)));
            }
            if let Some(gas) = self.gas {
                map.insert("gas".into(), Value::String(format!("0x{:x}", gas)));
            }
        }
        obj
    }
}

/// JSON-RPC client for the chain node
#[derive(Clone)]
pub struct ChainClient {
    http: HttpClient,
}

impl ChainClient {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(rpc_url),
        }
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let value = self.http.rpc("eth_chainId", json!([])).await?;
        let id = u256_from_value(&value)?;
        u64::try_from(id).map_err(|_| Error::InvalidParameter(format!("chain id {} overflows", id)))
    }

    /// `eth_call` at the latest block
    pub async fn call(&self, request: &CallRequest) -> Result<Bytes> {
        let value = self
            .http
            .rpc("eth_call", json!([request.to_json(), "latest"]))
            .await?;
        parse_data(&value)
    }

    pub async fn get_code(&self, address: Address) -> Result<Bytes> {
        let value = self
            .http
            .rpc(
                "eth_getCode",
                json!([address.to_checksum(None), "latest"]),
            )
            .await?;
        parse_data(&value)
    }

    pub async fn gas_price(&self) -> Result<U256> {
        let value = self.http.rpc("eth_gasPrice", json!([])).await?;
        u256_from_value(&value)
    }

    pub async fn max_priority_fee_per_gas(&self) -> Result<U256> {
        let value = self
            .http
            .rpc("eth_maxPriorityFeePerGas", json!([]))
            .await?;
        u256_from_value(&value)
    }

    /// Fee data from `eth_gasPrice` and `eth_maxPriorityFeePerGas`
    pub async fn fee_data(&self) -> Result<FeeData> {
        let gas_price = self.gas_price().await?;
        let tip = self.max_priority_fee_per_gas().await?;
        Ok(FeeData::from_gas_price(gas_price, tip))
    }

    pub async fn transaction_count(&self, address: Address) -> Result<u64> {
        let value = self
            .http
            .rpc(
                "eth_getTransactionCount",
                json!([address.to_checksum(None), "pending"]),
            )
            .await?;
        let count = u256_from_value(&value)?;
        u64::try_from(count).map_err(|_| Error::InvalidParameter(format!("nonce {} overflows", count)))
    }

    pub async fn estimate_gas(&self, request: &CallRequest) -> Result<u64> {
        let value = self
            .http
            .rpc("eth_estimateGas", json!([request.to_json()]))
            .await?;
        let gas = u256_from_value(&value)?;
        u64::try_from(gas).map_err(|_| Error::InvalidParameter(format!("gas {} overflows", gas)))
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        let value = self
            .http
            .rpc(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await?;
        parse_hash(&value)
    }

    /// Receipt of a mined transaction, `None` while pending
    pub async fn transaction_receipt(&self, hash: B256) -> Result<Option<RawReceipt>> {
        let value = self
            .http
            .rpc("eth_getTransactionReceipt", json!([hash]))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        RawReceipt::from_rpc(&value).map(Some)
    }
}

/// `0x` data returned by `eth_call` and `eth_getCode`
pub(crate) fn parse_data(value: &Value) -> Result<Bytes> {
    let data = value
        .as_str()
        .ok_or_else(|| Error::InvalidParameter(format!("expected hex data, got {}", value)))?;
    parse_bytes(data)
}

pub(crate) fn parse_hash(value: &Value) -> Result<B256> {
    value
        .as_str()
        .ok_or_else(|| Error::InvalidParameter(format!("expected hash, got {}", value)))?
        .parse::<B256>()
        .map_err(|e| Error::InvalidParameter(format!("invalid hash: {}", e)))
}
