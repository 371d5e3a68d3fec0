use crate::error::{Error, Result};
use alloy_primitives::{hex, Bytes, U256};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parse an integer quantity given as `0x`-prefixed hex or as a decimal string
pub fn parse_u256(s: &str) -> Result<U256> {
    let s = s.trim();
    if let Some(hex_digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex_digits.is_empty() {
            return Ok(U256::ZERO);
        }
        return U256::from_str_radix(hex_digits, 16)
            .map_err(|e| Error::InvalidParameter(format!("invalid hex quantity {}: {}", s, e)));
    }
    U256::from_str_radix(s, 10)
        .map_err(|e| Error::InvalidParameter(format!("invalid decimal quantity {}: {}", s, e)))
}

/// Parse a quantity from any JSON representation backends use: hex string,
/// decimal string or JSON number
pub fn u256_from_value(value: &Value) -> Result<U256> {
    match value {
        Value::String(s) => parse_u256(s),
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .or_else(|| parse_u256(&n.to_string()).ok())
            .ok_or_else(|| Error::InvalidParameter(format!("invalid numeric quantity {}", n))),
        Value::Null => Ok(U256::ZERO),
        other => Err(Error::InvalidParameter(format!(
            "expected quantity, got {}",
            other
        ))),
    }
}

/// Parse `0x`-prefixed (or bare) hex into bytes; empty input yields empty bytes
pub fn parse_bytes(s: &str) -> Result<Bytes> {
    let digits = s.trim().trim_start_matches("0x");
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| Error::InvalidParameter(format!("invalid hex bytes {}: {}", s, e)))
}

/// Deserialize U256 from a hex string, decimal string or number
pub fn deserialize_quantity<'de, D>(deserializer: D) -> std::result::Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    u256_from_value(&value).map_err(serde::de::Error::custom)
}

/// Format a quantity as a minimal JSON-RPC hex string
pub fn fmt_hex_quantity(v: U256) -> String {
    format!("0x{:x}", v)
}

/// Duration as integer milliseconds
pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Optional duration as integer seconds
pub mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
