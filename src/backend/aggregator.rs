use super::{
    node_receipt, AccountBackend, BackendKind, BundlerRpc, GasEstimate, LookupStatus, Sponsorship,
    StatusLookup,
};
use crate::chain::{ChainClient, FeeData};
use crate::error::{Error, Result};
use crate::http::{ApiCreds, HttpClient};
use crate::types::serde_helpers::parse_bytes;
use crate::types::{
    OperationCall, RawReceipt, SignedUserOperation, UserOperation, WireFormat, DUMMY_SIGNATURE,
};
use alloy_primitives::{hex, Address, Bytes, B256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const COSIGN_PATH: &str = "/cosign";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CosignRequest {
    user_operation_hash: B256,
    user_operation: Value,
}

#[derive(Deserialize)]
struct CosignResponse {
    signature: String,
}

/// Single-endpoint provider that estimates, prices and sponsors an operation
/// in one `alchemy_requestGasAndPaymasterAndData` round-trip
///
/// Operations travel with decimal quantities. With a cosigner configured, a
/// backend-held key signs every operation hash and its signature is appended
/// to the owner's.
#[derive(Clone)]
pub struct AggregatorBackend {
    bundler: BundlerRpc,
    policy_id: String,
    chain: ChainClient,
    creds: Option<ApiCreds>,
    cosigner: Option<HttpClient>,
}

impl AggregatorBackend {
    pub fn new(
        url: impl Into<String>,
        policy_id: String,
        entry_point: Address,
        chain: ChainClient,
        creds: Option<ApiCreds>,
    ) -> Self {
        let mut bundler = BundlerRpc::new(url, entry_point).with_format(WireFormat::Decimal);
        if let Some(creds) = &creds {
            bundler = bundler.with_creds(creds.clone());
        }

        Self {
            bundler,
            policy_id,
            chain,
            creds,
            cosigner: None,
        }
    }

    /// Enable admin cosigning through `url`
    pub fn with_cosigner(mut self, url: impl Into<String>) -> Self {
        self.cosigner = Some(HttpClient::new(url));
        self
    }

    async fn request_cosignature(&self, cosigner: &HttpClient, op: &SignedUserOperation) -> Result<Bytes> {
        let body = CosignRequest {
            user_operation_hash: op.hash(),
            user_operation: op.to_wire(WireFormat::Decimal),
        };

        let response: CosignResponse = match &self.creds {
            Some(creds) => cosigner.post_signed(COSIGN_PATH, &body, creds).await?,
            None => cosigner.post(COSIGN_PATH, &body, None).await?,
        };
        parse_bytes(&response.signature)
    }
}

#[async_trait]
impl StatusLookup for AggregatorBackend {
    async fn lookup(&self, hash: B256) -> Result<LookupStatus> {
        self.bundler.user_operation_by_hash(hash).await
    }
}

#[async_trait]
impl AccountBackend for AggregatorBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Aggregator
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::Decimal
    }

    fn sponsorship_estimates_gas(&self) -> bool {
        true
    }

    async fn fee_data(&self) -> Result<FeeData> {
        self.chain.fee_data().await
    }

    async fn estimate_gas(&self, op: &UserOperation) -> Result<GasEstimate> {
        self.bundler.estimate_user_operation_gas(op).await
    }

    async fn request_sponsorship(&self, op: &UserOperation) -> Result<Option<Sponsorship>> {
        let params = json!([{
            "policyId": self.policy_id,
            "entryPoint": self.bundler.entry_point().to_checksum(None),
            "dummySignature": format!("0x{}", hex::encode(DUMMY_SIGNATURE)),
            "userOperation": {
                "sender": op.sender.to_checksum(None),
                "nonce": op.nonce.to_string(),
                "initCode": format!("0x{}", hex::encode(&op.init_code)),
                "callData": format!("0x{}", hex::encode(&op.call_data)),
            },
        }]);

        let result = self
            .bundler
            .request("alchemy_requestGasAndPaymasterAndData", params)
            .await
            .map_err(|e| match e {
                Error::Rpc { code, message } => {
                    Error::SponsorshipDenied(format!("{} (code {})", message, code))
                }
                other => other,
            })?;

        let sponsorship = Sponsorship::from_value(&result)?;
        if sponsorship.gas.is_none() || sponsorship.fees.is_none() {
            return Err(Error::InvalidParameter(format!(
                "aggregator sponsorship without gas and fee fields: {}",
                result
            )));
        }
        Ok(Some(sponsorship))
    }

    async fn cosign(&self, op: SignedUserOperation) -> Result<SignedUserOperation> {
        let Some(cosigner) = &self.cosigner else {
            return Ok(op);
        };

        let backend_signature = self.request_cosignature(cosigner, &op).await?;
        if backend_signature.is_empty() {
            return Err(Error::Signing(format!(
                "cosigner returned an empty signature for {}",
                op.hash()
            )));
        }

        let mut combined = op.operation().signature.to_vec();
        combined.extend_from_slice(&backend_signature);
        log::debug!("cosigned operation {}", op.hash());
        Ok(op.with_signature(combined.into()))
    }

    async fn submit(&self, op: &SignedUserOperation, call: &OperationCall) -> Result<B256> {
        log::info!(
            "submitting {} on {} via aggregator (policy {})",
            call.method,
            call.target,
            self.policy_id
        );
        self.bundler.send_user_operation(op).await
    }

    async fn receipt(&self, transaction_hash: B256) -> Result<RawReceipt> {
        node_receipt(&self.chain, transaction_hash).await
    }
}
