use super::{
    node_receipt, AccountBackend, BackendKind, GasEstimate, LookupStatus, PaymasterClient,
    Sponsorship, StatusLookup,
};
use crate::chain::{parse_hash, ChainClient, FeeData};
use crate::error::Result;
use crate::http::{ApiCreds, HttpClient};
use crate::types::{OperationCall, RawReceipt, SignedUserOperation, UserOperation, WireFormat};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use serde_json::{json, Value};

/// ERC-4337 bundler JSON-RPC methods
#[derive(Clone)]
pub struct BundlerRpc {
    http: HttpClient,
    entry_point: Address,
    format: WireFormat,
    creds: Option<ApiCreds>,
}

impl BundlerRpc {
    pub fn new(url: impl Into<String>, entry_point: Address) -> Self {
        Self {
            http: HttpClient::new(url),
            entry_point,
            format: WireFormat::Hex,
            creds: None,
        }
    }

    /// Sign every request with API credentials
    pub fn with_creds(mut self, creds: ApiCreds) -> Self {
        self.creds = Some(creds);
        self
    }

    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    pub(crate) async fn request(&self, method: &str, params: Value) -> Result<Value> {
        match &self.creds {
            Some(creds) => self.http.rpc_signed(method, params, creds).await,
            None => self.http.rpc(method, params).await,
        }
    }

    fn entry_point_param(&self) -> Value {
        Value::String(self.entry_point.to_checksum(None))
    }

    pub async fn estimate_user_operation_gas(&self, op: &UserOperation) -> Result<GasEstimate> {
        let result = self
            .request(
                "eth_estimateUserOperationGas",
                json!([op.to_wire(self.format), self.entry_point_param()]),
            )
            .await?;
        GasEstimate::from_value(&result)
    }

    /// Submit and return the hash the bundler assigned
    pub async fn send_user_operation(&self, op: &SignedUserOperation) -> Result<B256> {
        let result = self
            .request(
                "eth_sendUserOperation",
                json!([op.to_wire(self.format), self.entry_point_param()]),
            )
            .await?;
        let hash = parse_hash(&result)?;
        if hash != op.hash() {
            log::warn!(
                "bundler returned hash {} for operation {} (entry point {})",
                hash,
                op.hash(),
                self.entry_point
            );
        }
        Ok(hash)
    }

    /// Inclusion status from `eth_getUserOperationByHash`
    pub async fn user_operation_by_hash(&self, hash: B256) -> Result<LookupStatus> {
        let result = self
            .request("eth_getUserOperationByHash", json!([hash]))
            .await?;

        match result.get("transactionHash") {
            Some(tx) if !tx.is_null() => Ok(LookupStatus::Included(parse_hash(tx)?)),
            _ => Ok(LookupStatus::Pending),
        }
    }
}

/// Generic bundler backend with an optional paymaster
#[derive(Clone)]
pub struct BundlerRpcBackend {
    bundler: BundlerRpc,
    paymaster: Option<PaymasterClient>,
    chain: ChainClient,
}

impl BundlerRpcBackend {
    pub fn new(bundler: BundlerRpc, paymaster: Option<PaymasterClient>, chain: ChainClient) -> Self {
        Self {
            bundler,
            paymaster,
            chain,
        }
    }
}

#[async_trait]
impl StatusLookup for BundlerRpcBackend {
    async fn lookup(&self, hash: B256) -> Result<LookupStatus> {
        self.bundler.user_operation_by_hash(hash).await
    }
}

#[async_trait]
impl AccountBackend for BundlerRpcBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::BundlerRpc
    }

    fn wire_format(&self) -> WireFormat {
        self.bundler.format()
    }

    async fn fee_data(&self) -> Result<FeeData> {
        self.chain.fee_data().await
    }

    async fn estimate_gas(&self, op: &UserOperation) -> Result<GasEstimate> {
        self.bundler.estimate_user_operation_gas(op).await
    }

    async fn request_sponsorship(&self, op: &UserOperation) -> Result<Option<Sponsorship>> {
        match &self.paymaster {
            Some(paymaster) => paymaster.sponsor(op).await.map(Some),
            None => Ok(None),
        }
    }

    async fn submit(&self, op: &SignedUserOperation, call: &OperationCall) -> Result<B256> {
        log::info!(
            "submitting {} on {} via bundler",
            call.method,
            call.target
        );
        self.bundler.send_user_operation(op).await
    }

    async fn receipt(&self, transaction_hash: B256) -> Result<RawReceipt> {
        node_receipt(&self.chain, transaction_hash).await
    }
}
