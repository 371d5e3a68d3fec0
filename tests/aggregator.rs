mod common;

use alloy_primitives::U256;
use alloy_signer_local::PrivateKeySigner;
use common::*;
use market_dispatch::{
    AccountSession, ApiCreds, BackendConfig, DispatchRequest, Dispatcher, DispatcherConfig,
    OperationCall,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn aggregator_config(node: &MockServer, aggregator: &MockServer, cosigner: &MockServer) -> DispatcherConfig {
    DispatcherConfig::new(
        CHAIN_ID,
        node.uri(),
        BackendConfig::Aggregator {
            url: aggregator.uri(),
            policy_id: "policy-agg".into(),
            creds: Some(ApiCreds::new(
                "key-1".into(),
                "c2VjcmV0LWtleQ==".into(),
                "pass".into(),
            )),
            cosigner_url: Some(cosigner.uri()),
        },
    )
    .with_retry(fast_retry())
    .with_poll_interval(Duration::from_millis(20))
}

async fn bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
        .collect()
}

#[tokio::test]
async fn test_aggregator_sponsors_cosigns_and_submits_decimal() {
    let node = MockServer::start().await;
    let aggregator = MockServer::start().await;
    let cosigner = MockServer::start().await;

    Mock::given(eth_call("getAddress(address,uint256)"))
        .respond_with(result(json!(address_word(smart_account()))))
        .mount(&node)
        .await;
    Mock::given(eth_call("getNonce(address,uint192)"))
        .respond_with(result(json!(word(U256::from(7)))))
        .mount(&node)
        .await;
    // Already deployed
    Mock::given(rpc("eth_getCode"))
        .respond_with(result(json!("0x6080")))
        .mount(&node)
        .await;
    Mock::given(rpc("eth_gasPrice"))
        .respond_with(result(json!("0x3b9aca00")))
        .mount(&node)
        .await;
    Mock::given(rpc("eth_maxPriorityFeePerGas"))
        .respond_with(result(json!("0x5f5e100")))
        .mount(&node)
        .await;
    Mock::given(rpc("eth_getTransactionReceipt"))
        .respond_with(result(receipt_json(smart_account())))
        .mount(&node)
        .await;

    // Estimation happens inside the sponsorship round-trip
    Mock::given(rpc("eth_estimateUserOperationGas"))
        .respond_with(result(json!({})))
        .expect(0)
        .mount(&aggregator)
        .await;
    Mock::given(rpc("alchemy_requestGasAndPaymasterAndData"))
        .and(header_exists("X-API-KEY"))
        .and(header_exists("X-API-SIGNATURE"))
        .respond_with(result(json!({
            "paymasterAndData": "0x00000000000000000000000000000000000000bb",
            "callGasLimit": "0x30d40",
            "verificationGasLimit": "0x7a120",
            "preVerificationGas": "0xc350",
            "maxFeePerGas": "0x77359400",
            "maxPriorityFeePerGas": "0x5f5e100"
        })))
        .expect(1)
        .mount(&aggregator)
        .await;
    Mock::given(rpc("eth_sendUserOperation"))
        .and(header_exists("X-API-KEY"))
        .respond_with(result(json!(format!("0x{}", "44".repeat(32)))))
        .expect(1)
        .mount(&aggregator)
        .await;
    Mock::given(rpc("eth_getUserOperationByHash"))
        .respond_with(result(json!({ "transactionHash": tx_hash() })))
        .mount(&aggregator)
        .await;

    Mock::given(method("POST"))
        .and(path("/cosign"))
        .and(header_exists("X-API-SIGNATURE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "signature": format!("0x{}", "cd".repeat(65))
        })))
        .expect(1)
        .mount(&cosigner)
        .await;

    let session = AccountSession::delegated(Arc::new(PrivateKeySigner::random()));
    let call = OperationCall::encode_str(
        market(),
        "sellShares(uint256 outcome, uint256 amount)",
        &["0", "5"],
    )
    .unwrap();

    let receipt = Dispatcher::new(aggregator_config(&node, &aggregator, &cosigner))
        .dispatch(&session, DispatchRequest::new(call))
        .await
        .unwrap()
        .into_receipt()
        .unwrap();
    assert_eq!(receipt.transaction_hash, tx_hash());

    let sent = bodies(&aggregator)
        .await
        .into_iter()
        .find(|b| b["method"] == "eth_sendUserOperation")
        .unwrap();
    let op = &sent["params"][0];

    // Decimal quantities on the wire
    assert_eq!(op["nonce"], json!("7"));
    assert_eq!(op["callGasLimit"], json!("200000"));
    assert_eq!(op["maxFeePerGas"], json!("2000000000"));
    assert_eq!(op["initCode"], json!("0x"));
    assert_eq!(op["paymasterAndData"], json!("0x00000000000000000000000000000000000000bb"));

    // Owner signature followed by the cosigner's
    let signature = op["signature"].as_str().unwrap();
    assert_eq!(signature.len(), 2 + 130 * 2);
    assert!(signature.ends_with(&"cd".repeat(65)));

    let sponsorship = bodies(&aggregator)
        .await
        .into_iter()
        .find(|b| b["method"] == "alchemy_requestGasAndPaymasterAndData")
        .unwrap();
    assert_eq!(sponsorship["params"][0]["policyId"], json!("policy-agg"));
    assert_eq!(sponsorship["params"][0]["userOperation"]["nonce"], json!("7"));
}

#[tokio::test]
async fn test_aggregator_denial_is_sponsorship_denied() {
    let node = MockServer::start().await;
    let aggregator = MockServer::start().await;
    let cosigner = MockServer::start().await;

    Mock::given(eth_call("getAddress(address,uint256)"))
        .respond_with(result(json!(address_word(smart_account()))))
        .mount(&node)
        .await;
    Mock::given(eth_call("getNonce(address,uint192)"))
        .respond_with(result(json!(word(U256::ZERO))))
        .mount(&node)
        .await;
    Mock::given(rpc("eth_getCode"))
        .respond_with(result(json!("0x")))
        .mount(&node)
        .await;
    Mock::given(rpc("eth_gasPrice"))
        .respond_with(result(json!("0x1")))
        .mount(&node)
        .await;
    Mock::given(rpc("eth_maxPriorityFeePerGas"))
        .respond_with(result(json!("0x1")))
        .mount(&node)
        .await;
    Mock::given(rpc("alchemy_requestGasAndPaymasterAndData"))
        .respond_with(rpc_error(-32000, "policy exhausted"))
        .expect(1)
        .mount(&aggregator)
        .await;
    Mock::given(rpc("eth_sendUserOperation"))
        .respond_with(result(json!(null)))
        .expect(0)
        .mount(&aggregator)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&cosigner)
        .await;

    let session = AccountSession::delegated(Arc::new(PrivateKeySigner::random()));
    let call = OperationCall::encode_str(market(), "claim()", &[]).unwrap();

    let err = Dispatcher::new(aggregator_config(&node, &aggregator, &cosigner))
        .dispatch(&session, DispatchRequest::new(call))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), market_dispatch::ErrorKind::SponsorshipDenied);
}
