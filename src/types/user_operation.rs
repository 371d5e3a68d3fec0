//! ERC-4337 UserOperation (EntryPoint v0.6 layout) and its canonical hash

use super::serde_helpers::{fmt_hex_quantity, parse_bytes, u256_from_value};
use crate::error::{Error, Result};
use crate::signing::{sign_user_op_hash, EthSigner};
use alloy_primitives::{hex, keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use serde_json::{json, Value};

/// Placeholder signature used while estimating gas. It must be a well-formed
/// 65-byte ECDSA signature so the account's validation code runs the same path
/// a real signature would.
pub const DUMMY_SIGNATURE: [u8; 65] = {
    let mut sig = [0xffu8; 65];
    sig[64] = 0x1c;
    sig
};

/// How integer fields are rendered on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `0x`-prefixed minimal hex quantities (raw JSON-RPC)
    Hex,
    /// Decimal strings (typed SDK-style clients)
    Decimal,
}

/// An unsigned, still mutable UserOperation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    /// Canonical ERC-4337 v0.6 operation hash
    ///
    /// `keccak256(abi.encode(keccak256(pack(op)), entryPoint, chainId))` where
    /// `pack` ABI-encodes every field except the signature, with `initCode`,
    /// `callData` and `paymasterAndData` replaced by their keccak256. The hash is
    /// computed from the current fields on every call.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        let packed = (
            self.sender,
            self.nonce,
            keccak256(&self.init_code),
            keccak256(&self.call_data),
            self.call_gas_limit,
            self.verification_gas_limit,
            self.pre_verification_gas,
            self.max_fee_per_gas,
            self.max_priority_fee_per_gas,
            keccak256(&self.paymaster_and_data),
        )
            .abi_encode();

        keccak256((keccak256(packed), entry_point, U256::from(chain_id)).abi_encode())
    }

    /// Copy with the estimation placeholder signature
    pub fn with_dummy_signature(&self) -> Self {
        Self {
            signature: Bytes::copy_from_slice(&DUMMY_SIGNATURE),
            ..self.clone()
        }
    }

    /// Sign the operation with the account owner. Signing consumes the
    /// operation, so no field can change after the hash was signed.
    pub fn sign(
        self,
        owner: &dyn EthSigner,
        entry_point: Address,
        chain_id: u64,
    ) -> Result<SignedUserOperation> {
        let hash = self.hash(entry_point, chain_id);
        let signature = sign_user_op_hash(owner, &hash)?;
        Ok(SignedUserOperation {
            op: Self { signature, ..self },
            hash,
        })
    }

    /// Serialize to the JSON-RPC wire shape
    pub fn to_wire(&self, format: WireFormat) -> Value {
        let q = |v: U256| match format {
            WireFormat::Hex => fmt_hex_quantity(v),
            WireFormat::Decimal => v.to_string(),
        };

        json!({
            "sender": self.sender.to_checksum(None),
            "nonce": q(self.nonce),
            "initCode": fmt_bytes(&self.init_code),
            "callData": fmt_bytes(&self.call_data),
            "callGasLimit": q(self.call_gas_limit),
            "verificationGasLimit": q(self.verification_gas_limit),
            "preVerificationGas": q(self.pre_verification_gas),
            "maxFeePerGas": q(self.max_fee_per_gas),
            "maxPriorityFeePerGas": q(self.max_priority_fee_per_gas),
            "paymasterAndData": fmt_bytes(&self.paymaster_and_data),
            "signature": fmt_bytes(&self.signature),
        })
    }

    /// Parse the wire shape; integer fields may be hex strings, decimal
    /// strings or JSON numbers
    pub fn from_wire(value: &Value) -> Result<Self> {
        let field = |name: &str| {
            value
                .get(name)
                .ok_or_else(|| Error::InvalidParameter(format!("user operation missing {}", name)))
        };
        let quantity = |name: &str| field(name).and_then(u256_from_value);
        let bytes = |name: &str| match value.get(name) {
            None | Some(Value::Null) => Ok(Bytes::new()),
            Some(Value::String(s)) => parse_bytes(s),
            Some(other) => Err(Error::InvalidParameter(format!(
                "{} must be a hex string, got {}",
                name, other
            ))),
        };

        let sender = field("sender")?
            .as_str()
            .ok_or_else(|| Error::InvalidParameter("sender must be a string".into()))?
            .parse::<Address>()
            .map_err(|e| Error::InvalidParameter(format!("sender: {}", e)))?;

        Ok(Self {
            sender,
            nonce: quantity("nonce")?,
            init_code: bytes("initCode")?,
            call_data: bytes("callData")?,
            call_gas_limit: quantity("callGasLimit")?,
            verification_gas_limit: quantity("verificationGasLimit")?,
            pre_verification_gas: quantity("preVerificationGas")?,
            max_fee_per_gas: quantity("maxFeePerGas")?,
            max_priority_fee_per_gas: quantity("maxPriorityFeePerGas")?,
            paymaster_and_data: bytes("paymasterAndData")?,
            signature: bytes("signature")?,
        })
    }
}

/// A signed, immutable UserOperation together with the hash its signature covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUserOperation {
    op: UserOperation,
    hash: B256,
}

impl SignedUserOperation {
    pub fn hash(&self) -> B256 {
        self.hash
    }

    pub fn operation(&self) -> &UserOperation {
        &self.op
    }

    /// Replace the signature with a combined (e.g. cosigned) one. The hash is
    /// unchanged since it never covers the signature.
    pub(crate) fn with_signature(self, signature: Bytes) -> Self {
        Self {
            op: UserOperation {
                signature,
                ..self.op
            },
            hash: self.hash,
        }
    }

    pub fn to_wire(&self, format: WireFormat) -> Value {
        self.op.to_wire(format)
    }
}

fn fmt_bytes(b: &Bytes) -> String {
    format!("0x{}", hex::encode(b))
}
