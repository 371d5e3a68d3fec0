//! Smart account identity and the session that owns it

use super::contracts::ISimpleAccountFactory;
use crate::backend::TransactionSender;
use crate::chain::{CallRequest, ChainClient};
use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryPolicy};
use crate::signing::EthSigner;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

/// A counterfactual smart account: deterministic address plus the owner key
/// that signs its operations
#[derive(Clone)]
pub struct SmartAccount {
    pub address: Address,
    pub factory: Address,
    pub salt: U256,
    owner: Arc<dyn EthSigner>,
}

impl fmt::Debug for SmartAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartAccount")
            .field("address", &self.address)
            .field("factory", &self.factory)
            .field("salt", &self.salt)
            .field("owner", &self.owner.address())
            .finish()
    }
}

impl SmartAccount {
    pub fn new(address: Address, factory: Address, salt: U256, owner: Arc<dyn EthSigner>) -> Self {
        Self {
            address,
            factory,
            salt,
            owner,
        }
    }

    /// Resolve the account address through `factory.getAddress(owner, salt)`
    pub async fn derive(
        chain: &ChainClient,
        factory: Address,
        salt: U256,
        owner: Arc<dyn EthSigner>,
        retry: &RetryPolicy,
    ) -> Result<Self> {
        let owner_address = owner.address();
        let request = CallRequest {
            to: factory,
            data: ISimpleAccountFactory::getAddressCall {
                owner: owner_address,
                salt,
            }
            .abi_encode()
            .into(),
            ..Default::default()
        };

        let output = with_retry(retry, "factory getAddress", || chain.call(&request)).await?;
        let decoded = ISimpleAccountFactory::getAddressCall::abi_decode_returns(&output, true)
            .map_err(|e| Error::Config(format!("factory {} getAddress: {}", factory, e)))?;

        log::info!(
            "derived smart account {} for owner {}",
            decoded._0,
            owner_address
        );
        Ok(Self::new(decoded._0, factory, salt, owner))
    }

    pub fn owner(&self) -> &dyn EthSigner {
        self.owner.as_ref()
    }

    /// `initCode` that deploys this account on first use:
    /// `factory ‖ createAccount(owner, salt)`
    pub fn init_code(&self) -> Bytes {
        let call = ISimpleAccountFactory::createAccountCall {
            owner: self.owner.address(),
            salt: self.salt,
        };
        let mut code = self.factory.to_vec();
        code.extend_from_slice(&call.abi_encode());
        code.into()
    }
}

/// Signing capabilities a session was opened with
#[derive(Clone, Default)]
pub struct SessionSigners {
    /// Local key sending conventional transactions and paying its own gas
    pub direct: Option<Arc<dyn TransactionSender>>,
    /// Externally connected wallet (browser extension, WalletConnect, ...)
    pub wallet: Option<Arc<dyn TransactionSender>>,
    /// Owner key of a delegated smart account
    pub owner: Option<Arc<dyn EthSigner>>,
}

/// Per-user session owning the lazily derived smart account identity
///
/// The first caller of [`AccountSession::smart_account`] derives the identity;
/// callers arriving while that is in flight await the same derivation.
/// [`AccountSession::logout`] drops the identity and every signer.
pub struct AccountSession {
    signers: RwLock<SessionSigners>,
    identity: RwLock<Arc<OnceCell<Arc<SmartAccount>>>>,
}

impl fmt::Debug for AccountSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSession").finish_non_exhaustive()
    }
}

impl AccountSession {
    pub fn new(signers: SessionSigners) -> Self {
        Self {
            signers: RwLock::new(signers),
            identity: RwLock::new(Arc::new(OnceCell::new())),
        }
    }

    /// Session with only a smart-account owner
    pub fn delegated(owner: Arc<dyn EthSigner>) -> Self {
        Self::new(SessionSigners {
            owner: Some(owner),
            ..Default::default()
        })
    }

    /// Session with only a connected external wallet
    pub fn connected(wallet: Arc<dyn TransactionSender>) -> Self {
        Self::new(SessionSigners {
            wallet: Some(wallet),
            ..Default::default()
        })
    }

    /// Session with only a direct signing account
    pub fn direct(sender: Arc<dyn TransactionSender>) -> Self {
        Self::new(SessionSigners {
            direct: Some(sender),
            ..Default::default()
        })
    }

    pub async fn signers(&self) -> SessionSigners {
        self.signers.read().await.clone()
    }

    /// Smart account for the session owner, derived once and then cached.
    /// Returns `None` when the session has no delegated owner.
    pub async fn smart_account(
        &self,
        chain: &ChainClient,
        factory: Address,
        salt: U256,
        retry: &RetryPolicy,
    ) -> Result<Option<Arc<SmartAccount>>> {
        let Some(owner) = self.signers.read().await.owner.clone() else {
            return Ok(None);
        };

        let cell = self.identity.read().await.clone();
        let account = cell
            .get_or_try_init(|| async {
                SmartAccount::derive(chain, factory, salt, owner, retry)
                    .await
                    .map(Arc::new)
            })
            .await?;
        Ok(Some(account.clone()))
    }

    /// Cached identity, if already derived
    pub async fn cached_account(&self) -> Option<Arc<SmartAccount>> {
        self.identity.read().await.get().cloned()
    }

    /// Drop the identity and all signers. In-flight derivations finish against
    /// the old cell and are discarded.
    pub async fn logout(&self) {
        *self.identity.write().await = Arc::new(OnceCell::new());
        *self.signers.write().await = SessionSigners::default();
        log::info!("account session logged out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer_local::PrivateKeySigner;

    #[test]
    fn test_init_code_prefix_is_factory() {
        let owner: Arc<dyn EthSigner> = Arc::new(PrivateKeySigner::random());
        let factory = Address::repeat_byte(0x44);
        let account = SmartAccount::new(Address::repeat_byte(0x55), factory, U256::ZERO, owner);

        let init_code = account.init_code();
        assert_eq!(&init_code[..20], factory.as_slice());
        assert_eq!(
            &init_code[20..24],
            &ISimpleAccountFactory::createAccountCall::SELECTOR
        );
        assert_eq!(init_code.len(), 20 + 4 + 64);
    }

    #[tokio::test]
    async fn test_session_without_owner_has_no_account() {
        let session = AccountSession::new(SessionSigners::default());
        let chain = ChainClient::new("http://127.0.0.1:1");
        let account = session
            .smart_account(&chain, Address::ZERO, U256::ZERO, &RetryPolicy::none())
            .await
            .unwrap();
        assert!(account.is_none());
    }
}
