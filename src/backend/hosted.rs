use super::{
    node_receipt, AccountBackend, BackendKind, BundlerRpc, GasEstimate, LookupStatus,
    PaymasterClient, Sponsorship, StatusLookup,
};
use crate::chain::{ChainClient, FeeData};
use crate::error::Result;
use crate::types::{OperationCall, RawReceipt, SignedUserOperation, UserOperation};
use alloy_primitives::B256;
use async_trait::async_trait;

/// Hosted bundler with a dedicated paymaster service
///
/// Gas is estimated by the bundler first; the paymaster then signs over the
/// estimated operation and may replace the gas limits with its own.
#[derive(Clone)]
pub struct HostedBackend {
    bundler: BundlerRpc,
    paymaster: PaymasterClient,
    chain: ChainClient,
}

impl HostedBackend {
    pub fn new(bundler: BundlerRpc, paymaster: PaymasterClient, chain: ChainClient) -> Self {
        Self {
            bundler,
            paymaster,
            chain,
        }
    }
}

#[async_trait]
impl StatusLookup for HostedBackend {
    async fn lookup(&self, hash: B256) -> Result<LookupStatus> {
        self.bundler.user_operation_by_hash(hash).await
    }
}

#[async_trait]
impl AccountBackend for HostedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Hosted
    }

    async fn fee_data(&self) -> Result<FeeData> {
        self.chain.fee_data().await
    }

    async fn estimate_gas(&self, op: &UserOperation) -> Result<GasEstimate> {
        self.bundler.estimate_user_operation_gas(op).await
    }

    async fn request_sponsorship(&self, op: &UserOperation) -> Result<Option<Sponsorship>> {
        self.paymaster.sponsor(op).await.map(Some)
    }

    async fn submit(&self, op: &SignedUserOperation, call: &OperationCall) -> Result<B256> {
        log::info!(
            "submitting {} on {} via hosted bundler",
            call.method,
            call.target
        );
        self.bundler.send_user_operation(op).await
    }

    async fn receipt(&self, transaction_hash: B256) -> Result<RawReceipt> {
        node_receipt(&self.chain, transaction_hash).await
    }
}
