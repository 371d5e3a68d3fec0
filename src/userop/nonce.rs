use crate::account::contracts::IEntryPoint;
use crate::chain::{CallRequest, ChainClient};
use crate::error::{Error, Result};
use alloy_primitives::aliases::U192;
use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;

/// A fresh random 192-bit nonce key
///
/// EntryPoint v0.6 keeps one sequence per `(sender, key)`. Picking a new key
/// per operation lets concurrent operations from one sender validate
/// independently instead of racing for the same sequence number. Keys are not
/// tracked, so a sender that issues many operations accumulates many
/// never-reused sequences.
pub fn random_nonce_key() -> U192 {
    U192::from_be_bytes(rand::random::<[u8; 24]>())
}

/// Full nonce (`key << 64 | sequence`) from `EntryPoint.getNonce(sender, key)`
pub async fn fetch_nonce(
    chain: &ChainClient,
    entry_point: Address,
    sender: Address,
    key: U192,
) -> Result<U256> {
    let request = CallRequest {
        to: entry_point,
        data: IEntryPoint::getNonceCall { sender, key }.abi_encode().into(),
        ..Default::default()
    };

    let output = chain.call(&request).await?;
    let decoded = IEntryPoint::getNonceCall::abi_decode_returns(&output, true)
        .map_err(|e| Error::InvalidParameter(format!("getNonce output: {}", e)))?;
    Ok(decoded.nonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_keys_do_not_collide() {
        let keys: HashSet<U192> = (0..10_000).map(|_| random_nonce_key()).collect();
        assert_eq!(keys.len(), 10_000);
    }

    #[test]
    fn test_random_keys_use_the_full_width() {
        // Any of 64 keys having a high byte set is overwhelmingly likely
        let high = (0..64)
            .map(|_| random_nonce_key())
            .any(|k| k >= (U192::from(1u8) << 184));
        assert!(high);
    }

    #[test]
    fn test_get_nonce_encoding() {
        let call = IEntryPoint::getNonceCall {
            sender: Address::repeat_byte(0x11),
            key: U192::from(5u8),
        };
        let data = call.abi_encode();
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[..4], &IEntryPoint::getNonceCall::SELECTOR);
        assert_eq!(data[4 + 63], 5);
    }
}
