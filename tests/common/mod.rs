#![allow(dead_code)]

use alloy_primitives::{hex, keccak256, Address, B256, U256};
use market_dispatch::{BackendConfig, DispatcherConfig, RetryPolicy};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::{Match, MockServer, Request, ResponseTemplate};

pub const CHAIN_ID: u64 = 84532;
pub const SHARES_BOUGHT: &str =
    "event SharesBought(address indexed buyer, uint256 outcome, uint256 amount)";

pub fn market() -> Address {
    "0x4D97DCd97eC945f40cF65F87097ACe5EA0476045".parse().unwrap()
}

/// A contract other than the market that emits look-alike events
pub fn other_contract() -> Address {
    Address::repeat_byte(0x99)
}

pub fn smart_account() -> Address {
    Address::repeat_byte(0x5a)
}

pub fn tx_hash() -> B256 {
    B256::repeat_byte(0x7e)
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature);
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn word(v: U256) -> String {
    format!("0x{}", hex::encode(v.to_be_bytes::<32>()))
}

pub fn address_word(a: Address) -> String {
    format!("0x{}", hex::encode(a.into_word()))
}

/// Matches a JSON-RPC request by method and, for `eth_call`, by the selector
/// of the call data
pub struct Rpc {
    method: &'static str,
    selector: Option<[u8; 4]>,
}

pub fn rpc(method: &'static str) -> Rpc {
    Rpc {
        method,
        selector: None,
    }
}

pub fn eth_call(signature: &str) -> Rpc {
    Rpc {
        method: "eth_call",
        selector: Some(selector(signature)),
    }
}

impl Match for Rpc {
    fn matches(&self, request: &Request) -> bool {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return false;
        };
        if body["method"] != self.method {
            return false;
        }
        match self.selector {
            None => true,
            Some(sel) => body["params"][0]["data"]
                .as_str()
                .is_some_and(|data| data.starts_with(&format!("0x{}", hex::encode(sel)))),
        }
    }
}

pub fn result(value: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": value,
    }))
}

pub fn rpc_error(code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": { "code": code, "message": message },
    }))
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        delay: Duration::from_millis(10),
    }
}

pub fn hosted_config(node: &MockServer, bundler: &MockServer, paymaster: &MockServer) -> DispatcherConfig {
    DispatcherConfig::new(
        CHAIN_ID,
        node.uri(),
        BackendConfig::Hosted {
            bundler_url: bundler.uri(),
            paymaster_url: paymaster.uri(),
            policy_id: Some("policy-1".into()),
        },
    )
    .with_retry(fast_retry())
    .with_poll_interval(Duration::from_millis(20))
}

/// Node receipt with one market `SharesBought` log, plus an unrelated log and
/// a `SharesBought` log emitted by [`other_contract`]
pub fn receipt_json(buyer: Address) -> Value {
    let topic = keccak256("SharesBought(address,uint256,uint256)");
    let data = format!(
        "0x{}{}",
        hex::encode(U256::from(1).to_be_bytes::<32>()),
        hex::encode(U256::from(1_000_000).to_be_bytes::<32>())
    );

    json!({
        "transactionHash": tx_hash(),
        "status": "0x1",
        "logs": [
            {
                "address": other_contract().to_checksum(None),
                "topics": [format!("0x{}", "ee".repeat(32))],
                "data": "0x"
            },
            {
                "address": other_contract().to_checksum(None),
                "topics": [topic, address_word(buyer)],
                "data": data
            },
            {
                "address": market().to_checksum(None),
                "topics": [topic, address_word(buyer)],
                "data": data
            }
        ]
    })
}
