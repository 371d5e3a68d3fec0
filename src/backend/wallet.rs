//! Conventional transaction path
//!
//! Direct keys and connected external wallets both send plain EIP-1559
//! transactions through [`TransactionSender`]. They never go through a
//! bundler and are never sponsored.

use crate::chain::{CallRequest, ChainClient};
use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryPolicy};
use crate::types::OperationCall;
use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, TxKind, B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;

/// Something that can sign and broadcast a conventional transaction
///
/// A browser extension or WalletConnect session implements this on the
/// application side; [`LocalSender`] covers keys held in process.
#[async_trait]
pub trait TransactionSender: Send + Sync {
    fn address(&self) -> Address;

    /// Sign and broadcast `request`, returning the transaction hash
    async fn send_transaction(&self, request: &CallRequest) -> Result<B256>;
}

/// Sends transactions signed with an in-process private key
pub struct LocalSender {
    signer: PrivateKeySigner,
    chain: ChainClient,
    chain_id: u64,
}

impl LocalSender {
    pub fn new(signer: PrivateKeySigner, chain: ChainClient, chain_id: u64) -> Self {
        Self {
            signer,
            chain,
            chain_id,
        }
    }

    /// Sign `tx` and return its EIP-2718 encoding
    fn sign_eip1559(&self, tx: TxEip1559) -> Result<Vec<u8>> {
        let signature = self
            .signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| Error::Signing(e.to_string()))?;
        let envelope = TxEnvelope::Eip1559(tx.into_signed(signature));
        Ok(envelope.encoded_2718())
    }
}

fn fee_u128(value: U256, name: &str) -> Result<u128> {
    u128::try_from(value).map_err(|_| Error::InvalidParameter(format!("{} {} overflows", name, value)))
}

#[async_trait]
impl TransactionSender for LocalSender {
    fn address(&self) -> Address {
        alloy_signer::Signer::address(&self.signer)
    }

    async fn send_transaction(&self, request: &CallRequest) -> Result<B256> {
        let from = self.address();
        let nonce = self.chain.transaction_count(from).await?;
        let fees = self.chain.fee_data().await?;
        let gas_limit = match request.gas {
            Some(gas) => gas,
            None => {
                self.chain
                    .estimate_gas(&CallRequest {
                        from: Some(from),
                        ..request.clone()
                    })
                    .await?
            }
        };

        let tx = TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            gas_limit,
            max_fee_per_gas: fee_u128(fees.max_fee_per_gas, "maxFeePerGas")?,
            max_priority_fee_per_gas: fee_u128(
                fees.max_priority_fee_per_gas,
                "maxPriorityFeePerGas",
            )?,
            to: TxKind::Call(request.to),
            value: request.value,
            input: request.data.clone(),
            ..Default::default()
        };

        let raw = self.sign_eip1559(tx)?;
        let hash = self.chain.send_raw_transaction(&raw).await?;
        log::info!("sent transaction {} from {}", hash, from);
        Ok(hash)
    }
}

/// Turns an [`OperationCall`] into a conventional transaction
#[derive(Clone)]
pub struct DirectWallet {
    chain: ChainClient,
    gas_limit: u64,
    retry: RetryPolicy,
}

impl DirectWallet {
    pub fn new(chain: ChainClient, gas_limit: u64, retry: RetryPolicy) -> Self {
        Self {
            chain,
            gas_limit,
            retry,
        }
    }

    fn request(sender: &dyn TransactionSender, call: &OperationCall) -> CallRequest {
        CallRequest {
            from: Some(sender.address()),
            to: call.target,
            data: call.call_data.clone(),
            value: call.value,
            gas: None,
        }
    }

    /// Send with a node gas estimate (direct keys)
    pub async fn send_estimated(
        &self,
        sender: &dyn TransactionSender,
        call: &OperationCall,
    ) -> Result<B256> {
        let mut request = Self::request(sender, call);
        let gas = with_retry(&self.retry, "eth_estimateGas", || {
            self.chain.estimate_gas(&request)
        })
        .await?;
        request.gas = Some(gas);
        sender.send_transaction(&request).await
    }

    /// Send with the fixed conservative gas limit (connected wallets, which
    /// may not be able to simulate against the node)
    pub async fn send_fixed(
        &self,
        sender: &dyn TransactionSender,
        call: &OperationCall,
    ) -> Result<B256> {
        let request = CallRequest {
            gas: Some(self.gas_limit),
            ..Self::request(sender, call)
        };
        sender.send_transaction(&request).await
    }
}
