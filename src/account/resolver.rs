use super::identity::{AccountSession, SmartAccount};
use crate::backend::TransactionSender;
use crate::chain::ChainClient;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use alloy_primitives::{Address, U256};
use std::fmt;
use std::sync::Arc;

/// How a call will reach the chain
#[derive(Clone)]
pub enum SignerPath {
    /// Local key signs and sends a conventional transaction
    Direct(Arc<dyn TransactionSender>),
    /// Connected external wallet sends a conventional transaction
    ConnectedWallet(Arc<dyn TransactionSender>),
    /// Delegated smart account submits a UserOperation
    SmartAccount(Arc<SmartAccount>),
}

impl fmt::Debug for SignerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerPath::Direct(s) => write!(f, "Direct({})", s.address()),
            SignerPath::ConnectedWallet(s) => write!(f, "ConnectedWallet({})", s.address()),
            SignerPath::SmartAccount(a) => write!(f, "SmartAccount({})", a.address),
        }
    }
}

impl SignerPath {
    /// Address that will appear as the caller of the target contract
    pub fn caller(&self) -> Address {
        match self {
            SignerPath::Direct(s) | SignerPath::ConnectedWallet(s) => s.address(),
            SignerPath::SmartAccount(a) => a.address,
        }
    }

    /// Whether the identity pays its own gas
    pub fn self_funded(&self, sponsored: bool) -> bool {
        match self {
            SignerPath::Direct(_) | SignerPath::ConnectedWallet(_) => true,
            SignerPath::SmartAccount(_) => !sponsored,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignerPath::Direct(_) => "direct",
            SignerPath::ConnectedWallet(_) => "wallet",
            SignerPath::SmartAccount(_) => "smart-account",
        }
    }
}

/// Picks the signing identity for a dispatch
///
/// Order: a direct signer wins only when no delegated owner exists; a connected
/// wallet always wins over account abstraction; otherwise the session's smart
/// account is derived (or reused).
#[derive(Debug, Clone)]
pub struct SignerResolver {
    factory: Address,
    salt: U256,
    retry: RetryPolicy,
}

impl SignerResolver {
    pub fn new(factory: Address, salt: U256, retry: RetryPolicy) -> Self {
        Self {
            factory,
            salt,
            retry,
        }
    }

    pub async fn resolve(&self, session: &AccountSession, chain: &ChainClient) -> Result<SignerPath> {
        let signers = session.signers().await;

        if let Some(direct) = signers.direct.clone() {
            if signers.owner.is_none() {
                return Ok(SignerPath::Direct(direct));
            }
        }

        if let Some(wallet) = signers.wallet {
            return Ok(SignerPath::ConnectedWallet(wallet));
        }

        match session
            .smart_account(chain, self.factory, self.salt, &self.retry)
            .await?
        {
            Some(account) => Ok(SignerPath::SmartAccount(account)),
            None => Err(Error::AuthRequired(
                "session has no signer; log in before dispatching".into(),
            )),
        }
    }
}
