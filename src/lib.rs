//! # market-dispatch
//!
//! Meta-transaction dispatcher for smart-contract markets.
//!
//! Applications describe a contract call once as an [`OperationCall`] and hand
//! it to a [`Dispatcher`]. Depending on who is signed in, the call is sent as a
//! plain signed transaction, through a connected wallet, or as a sponsored
//! ERC-4337 UserOperation (EntryPoint v0.6) through one of several bundler and
//! paymaster backends. State-changing calls resolve to a [`NormalizedReceipt`]
//! with the events the caller asked for already decoded.
//!
//! ```no_run
//! use market_dispatch::{
//!     AccountSession, BackendConfig, DispatchRequest, Dispatcher, DispatcherConfig,
//!     EventRegistry, OperationCall,
//! };
//! use alloy_signer_local::PrivateKeySigner;
//! use std::sync::Arc;
//!
//! # async fn run() -> market_dispatch::Result<()> {
//! let config = DispatcherConfig::new(
//!     84532,
//!     "https://sepolia.base.org",
//!     BackendConfig::Hosted {
//!         bundler_url: "https://bundler.example".into(),
//!         paymaster_url: "https://paymaster.example".into(),
//!         policy_id: None,
//!     },
//! );
//! let dispatcher = Dispatcher::new(config);
//! let session = AccountSession::delegated(Arc::new(PrivateKeySigner::random()));
//!
//! let market = "0x4D97DCd97eC945f40cF65F87097ACe5EA0476045".parse().unwrap();
//! let call = OperationCall::encode_str(market, "buyShares(uint256 outcome, uint256 amount)", &["1", "1000000"])?;
//! let events = EventRegistry::parse(&["event SharesBought(address indexed buyer, uint256 outcome, uint256 amount)"])?;
//!
//! let outcome = dispatcher
//!     .dispatch(&session, DispatchRequest::new(call).with_events(events))
//!     .await?;
//! println!("{:?}", outcome.receipt());
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod backend;
pub mod chain;
pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
mod http;
pub mod normalize;
pub mod poller;
pub mod relay;
pub mod retry;
pub mod signing;
pub mod types;
pub mod userop;

pub use account::{AccountSession, SessionSigners, SignerPath, SignerResolver, SmartAccount};
pub use backend::{
    AccountBackend, BackendKind, GasEstimate, LocalSender, LookupStatus, Sponsorship,
    TransactionSender,
};
pub use chain::{CallRequest, ChainClient, FeeData};
pub use config::{BackendConfig, DispatcherConfig};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
pub use dispatcher::{DispatchOutcome, DispatchRequest, DispatchStage, Dispatcher};
pub use error::{Error, ErrorKind, Result};
pub use http::ApiCreds;
pub use normalize::{normalize, EventRegistry};
pub use poller::{PendingOperation, Poller};
pub use relay::ObservabilityRelay;
pub use retry::RetryPolicy;
pub use signing::EthSigner;
pub use types::*;
