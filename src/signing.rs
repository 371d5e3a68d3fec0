//! Signer abstraction
//!
//! The dispatcher never holds keys of its own. Every signature it needs (the
//! smart-account owner signature over a UserOperation hash) goes through
//! [`EthSigner`], which any local or remote signer can implement.

use crate::error::{Error, Result};
use alloy_primitives::{Address, Bytes, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;

/// Minimal signing capability required by the dispatcher
pub trait EthSigner: Send + Sync {
    /// Address of the signing key
    fn address(&self) -> Address;

    /// Sign `message` with the EIP-191 personal-message prefix, returning the
    /// 65-byte `r ‖ s ‖ v` signature
    fn sign_message_sync(&self, message: &[u8]) -> Result<Bytes>;
}

impl EthSigner for PrivateKeySigner {
    fn address(&self) -> Address {
        alloy_signer::Signer::address(self)
    }

    fn sign_message_sync(&self, message: &[u8]) -> Result<Bytes> {
        let signature = SignerSync::sign_message_sync(self, message)
            .map_err(|e| Error::Signing(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&signature.as_bytes()))
    }
}

/// Sign a UserOperation hash the way SimpleAccount-style wallets validate it:
/// `ecrecover(toEthSignedMessageHash(userOpHash))`
pub fn sign_user_op_hash(signer: &dyn EthSigner, hash: &B256) -> Result<Bytes> {
    let signature = signer.sign_message_sync(hash.as_slice())?;
    if signature.len() != 65 {
        return Err(Error::Signing(format!(
            "expected 65-byte signature, got {} bytes",
            signature.len()
        )));
    }
    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_op_signature_recovers_owner() {
        let signer = PrivateKeySigner::random();
        let hash = B256::repeat_byte(0x42);

        let sig = sign_user_op_hash(&signer, &hash).unwrap();
        assert_eq!(sig.len(), 65);

        let expected = SignerSync::sign_message_sync(&signer, hash.as_slice()).unwrap();
        assert_eq!(sig.as_ref(), &expected.as_bytes()[..]);

        let recovered = expected.recover_address_from_msg(hash.as_slice()).unwrap();
        assert_eq!(recovered, EthSigner::address(&signer));
    }
}
