//! Account-abstraction backends
//!
//! Every backend answers the same questions for a UserOperation: what fees to
//! use, how much gas it needs, whether a paymaster pays for it, and where it
//! ended up after submission. [`AccountBackend`] is that seam; one
//! implementation is chosen per [`DispatcherConfig`](crate::DispatcherConfig).
//!
//! The connected-wallet path does not use UserOperations at all and lives in
//! [`wallet`] behind [`TransactionSender`].

mod aggregator;
mod bundler_rpc;
mod hosted;
mod paymaster;
pub mod wallet;

pub use aggregator::AggregatorBackend;
pub use bundler_rpc::{BundlerRpc, BundlerRpcBackend};
pub use hosted::HostedBackend;
pub use paymaster::PaymasterClient;
pub use wallet::{DirectWallet, LocalSender, TransactionSender};

use crate::chain::{ChainClient, FeeData};
use crate::config::{BackendConfig, DispatcherConfig};
use crate::error::{Error, Result};
use crate::types::serde_helpers::{deserialize_quantity, parse_bytes, u256_from_value};
use crate::types::{OperationCall, RawReceipt, SignedUserOperation, UserOperation, WireFormat};
use crate::userop::random_nonce_key;
use alloy_primitives::aliases::U192;
use alloy_primitives::{Bytes, B256, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Which kind of backend carried an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Hosted,
    Aggregator,
    BundlerRpc,
    DirectWallet,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Hosted => "hosted",
            BackendKind::Aggregator => "aggregator",
            BackendKind::BundlerRpc => "bundler",
            BackendKind::DirectWallet => "wallet",
        }
    }

    /// Whether operations of this kind are UserOperations
    pub fn is_account_abstraction(&self) -> bool {
        !matches!(self, BackendKind::DirectWallet)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gas limits of a UserOperation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    #[serde(deserialize_with = "deserialize_quantity")]
    pub pre_verification_gas: U256,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub verification_gas_limit: U256,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub call_gas_limit: U256,
}

impl GasEstimate {
    /// Parse an `eth_estimateUserOperationGas`-shaped object
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }

    /// Like [`GasEstimate::from_value`] but `None` when the gas fields are absent
    pub(crate) fn from_optional(value: &Value) -> Result<Option<Self>> {
        let has_gas = ["preVerificationGas", "verificationGasLimit", "callGasLimit"]
            .iter()
            .all(|k| value.get(k).is_some_and(|v| !v.is_null()));
        if has_gas {
            Self::from_value(value).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// A paymaster's commitment to pay for an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sponsorship {
    pub paymaster_and_data: Bytes,
    /// Gas limits the paymaster signed over; they replace any estimate
    pub gas: Option<GasEstimate>,
    /// Fees the paymaster signed over
    pub fees: Option<FeeData>,
}

impl Sponsorship {
    /// Parse a sponsorship response. Accepted shapes: a bare
    /// `paymasterAndData` string, an object carrying `paymasterAndData` and
    /// optional gas/fee overrides, or such an object nested under
    /// `entrypointV06Response`.
    pub fn from_value(value: &Value) -> Result<Self> {
        if let Some(pad) = value.as_str() {
            return Ok(Self {
                paymaster_and_data: parse_bytes(pad)?,
                gas: None,
                fees: None,
            });
        }

        let value = value.get("entrypointV06Response").unwrap_or(value);
        let paymaster_and_data = value
            .get("paymasterAndData")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::InvalidParameter(format!("sponsorship missing paymasterAndData: {}", value))
            })
            .and_then(parse_bytes)?;

        let fees = match (value.get("maxFeePerGas"), value.get("maxPriorityFeePerGas")) {
            (Some(max), Some(tip)) if !max.is_null() && !tip.is_null() => Some(FeeData {
                max_fee_per_gas: u256_from_value(max)?,
                max_priority_fee_per_gas: u256_from_value(tip)?,
            }),
            _ => None,
        };

        Ok(Self {
            paymaster_and_data,
            gas: GasEstimate::from_optional(value)?,
            fees,
        })
    }
}

/// Where a submitted operation or transaction stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupStatus {
    /// Not yet included (or not yet visible to the backend)
    Pending,
    /// Included in the given transaction
    Included(B256),
    /// The backend dropped or rejected it
    Failed(String),
}

/// Anything that can report the status of a submitted hash
#[async_trait]
pub trait StatusLookup: Send + Sync {
    async fn lookup(&self, hash: B256) -> Result<LookupStatus>;
}

#[async_trait]
impl StatusLookup for ChainClient {
    /// Conventional transactions are looked up by their own hash
    async fn lookup(&self, hash: B256) -> Result<LookupStatus> {
        Ok(match self.transaction_receipt(hash).await? {
            Some(receipt) => LookupStatus::Included(receipt.transaction_hash),
            None => LookupStatus::Pending,
        })
    }
}

/// One account-abstraction provider
///
/// Implementations do single round-trips only; retrying and ordering the
/// steps is the dispatcher's job.
#[async_trait]
pub trait AccountBackend: StatusLookup {
    fn kind(&self) -> BackendKind;

    /// Integer representation this backend expects on the wire
    fn wire_format(&self) -> WireFormat {
        WireFormat::Hex
    }

    /// Nonce key for the next operation; a fresh random key by default so
    /// concurrent operations from one sender do not queue behind each other
    fn nonce_key(&self) -> U192 {
        random_nonce_key()
    }

    /// Whether [`AccountBackend::request_sponsorship`] also estimates gas and
    /// fees, making a separate estimation round-trip unnecessary
    fn sponsorship_estimates_gas(&self) -> bool {
        false
    }

    async fn fee_data(&self) -> Result<FeeData>;

    /// Estimate gas for `op`, which carries a placeholder signature
    async fn estimate_gas(&self, op: &UserOperation) -> Result<GasEstimate>;

    /// Ask the paymaster to pay for `op`.
    ///
    /// `Ok(None)` means this backend has no paymaster; a refusal is
    /// [`Error::SponsorshipDenied`].
    async fn request_sponsorship(&self, op: &UserOperation) -> Result<Option<Sponsorship>>;

    /// Add a backend-held signature, if this backend cosigns
    async fn cosign(&self, op: SignedUserOperation) -> Result<SignedUserOperation> {
        Ok(op)
    }

    /// Hand the signed operation to the bundler, returning its hash
    async fn submit(&self, op: &SignedUserOperation, call: &OperationCall) -> Result<B256>;

    /// Receipt of the transaction that included an operation
    async fn receipt(&self, transaction_hash: B256) -> Result<RawReceipt>;
}

/// Build the backend named by `config`
pub fn from_config(config: &DispatcherConfig, chain: ChainClient) -> Arc<dyn AccountBackend> {
    let entry_point = config.entry_point;
    match &config.backend {
        BackendConfig::Hosted {
            bundler_url,
            paymaster_url,
            policy_id,
        } => Arc::new(HostedBackend::new(
            BundlerRpc::new(bundler_url, entry_point),
            PaymasterClient::new(paymaster_url, entry_point, policy_id.clone()),
            chain,
        )),
        BackendConfig::Aggregator {
            url,
            policy_id,
            creds,
            cosigner_url,
        } => {
            let mut backend =
                AggregatorBackend::new(url, policy_id.clone(), entry_point, chain, creds.clone());
            if let Some(cosigner) = cosigner_url {
                backend = backend.with_cosigner(cosigner);
            }
            Arc::new(backend)
        }
        BackendConfig::BundlerRpc {
            url,
            paymaster_url,
            policy_id,
        } => {
            let paymaster = paymaster_url
                .as_ref()
                .map(|url| PaymasterClient::new(url, entry_point, policy_id.clone()));
            Arc::new(BundlerRpcBackend::new(
                BundlerRpc::new(url, entry_point),
                paymaster,
                chain,
            ))
        }
    }
}

/// Receipt from the node, treating "not yet indexed" as transient so the
/// caller's retry policy covers the gap between inclusion and indexing
pub(crate) async fn node_receipt(chain: &ChainClient, transaction_hash: B256) -> Result<RawReceipt> {
    chain
        .transaction_receipt(transaction_hash)
        .await?
        .ok_or_else(|| Error::Transient(format!("receipt for {} not available yet", transaction_hash)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sponsorship_bare_string() {
        let s = Sponsorship::from_value(&json!("0xabcd")).unwrap();
        assert_eq!(s.paymaster_and_data.as_ref(), &[0xab, 0xcd]);
        assert!(s.gas.is_none());
        assert!(s.fees.is_none());
    }

    #[test]
    fn test_sponsorship_with_gas_overrides() {
        let s = Sponsorship::from_value(&json!({
            "paymasterAndData": "0x01",
            "preVerificationGas": "0xbb80",
            "verificationGasLimit": "100000",
            "callGasLimit": 50000
        }))
        .unwrap();

        let gas = s.gas.unwrap();
        assert_eq!(gas.pre_verification_gas, U256::from(48_000));
        assert_eq!(gas.verification_gas_limit, U256::from(100_000));
        assert_eq!(gas.call_gas_limit, U256::from(50_000));
    }

    #[test]
    fn test_sponsorship_nested_v06_response() {
        let s = Sponsorship::from_value(&json!({
            "entrypointV06Response": {
                "paymasterAndData": "0x02",
                "maxFeePerGas": "0x10",
                "maxPriorityFeePerGas": "0x2"
            }
        }))
        .unwrap();

        assert_eq!(s.paymaster_and_data.as_ref(), &[0x02]);
        assert!(s.gas.is_none());
        let fees = s.fees.unwrap();
        assert_eq!(fees.max_fee_per_gas, U256::from(16));
        assert_eq!(fees.max_priority_fee_per_gas, U256::from(2));
    }

    #[test]
    fn test_sponsorship_without_paymaster_data_is_error() {
        assert!(Sponsorship::from_value(&json!({ "callGasLimit": "0x1" })).is_err());
    }

    #[test]
    fn test_partial_gas_is_ignored() {
        let gas = GasEstimate::from_optional(&json!({ "callGasLimit": "0x1" })).unwrap();
        assert!(gas.is_none());
    }
}
