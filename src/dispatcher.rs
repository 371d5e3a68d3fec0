//! Meta-transaction dispatcher
//!
//! [`Dispatcher::dispatch`] is the one entry point domain wrappers call. It
//! decides per call how the invocation reaches the chain:
//!
//! 1. a direct local signer (and no delegated smart account) sends a signed
//!    EIP-1559 transaction;
//! 2. a connected external wallet sends a conventional transaction with a
//!    fixed gas limit;
//! 3. otherwise the session's smart account goes through the configured
//!    account-abstraction backend: build, estimate and sponsor, sign, submit,
//!    poll, normalize.
//!
//! Read-only calls are answered with `eth_call` and never reach a backend.

use crate::account::{AccountSession, SignerPath, SignerResolver, SmartAccount};
use crate::backend::{self, AccountBackend, BackendKind, DirectWallet};
use crate::chain::{CallRequest, ChainClient};
use crate::config::DispatcherConfig;
use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::error::Result;
use crate::normalize::{normalize, EventRegistry};
use crate::poller::{PendingOperation, Poller};
use crate::relay::ObservabilityRelay;
use crate::retry::with_retry;
use crate::types::{NormalizedReceipt, OperationCall, RawReceipt, UserOperation};
use crate::userop::{apply_gas, apply_sponsorship, UserOpBuilder};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, Bytes, B256, U256};
use std::fmt;
use std::sync::Arc;

/// Pipeline milestones reported to a [`DispatchRequest`]'s progress callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStage {
    /// The signing identity was chosen
    Resolved {
        path: &'static str,
        caller: Address,
    },
    /// The unsigned UserOperation was assembled
    Built { sender: Address, nonce: U256 },
    GasEstimated,
    /// A paymaster agreed to pay
    Sponsored,
    Signed { hash: B256 },
    /// The operation or transaction left the client
    Submitted { hash: B256 },
    /// Included on chain in `transaction_hash`
    Included { transaction_hash: B256 },
}

pub type ProgressCallback = Arc<dyn Fn(&DispatchStage) + Send + Sync>;

/// One call to dispatch
#[derive(Clone)]
pub struct DispatchRequest {
    pub call: OperationCall,
    pub read_only: bool,
    /// Events to decode from the receipt, bound to `call.target` unless
    /// registered for another emitter
    pub events: EventRegistry,
    /// `from` for read-only calls
    pub caller: Option<Address>,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for DispatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRequest")
            .field("call", &self.call)
            .field("read_only", &self.read_only)
            .field("events", &self.events)
            .field("caller", &self.caller)
            .finish_non_exhaustive()
    }
}

impl DispatchRequest {
    /// State-changing call
    pub fn new(call: OperationCall) -> Self {
        Self {
            call,
            read_only: false,
            events: EventRegistry::new(),
            caller: None,
            progress: None,
        }
    }

    /// Read-only call answered with `eth_call`
    pub fn read(call: OperationCall) -> Self {
        Self {
            read_only: true,
            ..Self::new(call)
        }
    }

    pub fn with_events(mut self, events: EventRegistry) -> Self {
        self.events = events;
        self
    }

    pub fn with_caller(mut self, caller: Address) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DispatchStage) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    fn normalize(&self, raw: &RawReceipt, diagnostics: &DiagnosticSink) -> NormalizedReceipt {
        let events = self.events.clone().bound_to(self.call.target);
        normalize(raw, &events, diagnostics)
    }

    fn emit(&self, stage: DispatchStage) {
        if let Some(progress) = &self.progress {
            progress(&stage);
        }
    }
}

/// Result of a dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Return data of a read-only call, decoded when the method signature
    /// declares outputs
    Call {
        raw: Bytes,
        values: Vec<DynSolValue>,
    },
    /// Normalized receipt of a state-changing call
    Receipt(NormalizedReceipt),
}

impl DispatchOutcome {
    pub fn receipt(&self) -> Option<&NormalizedReceipt> {
        match self {
            DispatchOutcome::Receipt(receipt) => Some(receipt),
            DispatchOutcome::Call { .. } => None,
        }
    }

    pub fn into_receipt(self) -> Option<NormalizedReceipt> {
        match self {
            DispatchOutcome::Receipt(receipt) => Some(receipt),
            DispatchOutcome::Call { .. } => None,
        }
    }
}

/// Routes calls to the chain for any number of [`AccountSession`]s
pub struct Dispatcher {
    config: DispatcherConfig,
    chain: ChainClient,
    backend: Arc<dyn AccountBackend>,
    resolver: SignerResolver,
    builder: UserOpBuilder,
    wallet: DirectWallet,
    poller: Poller,
    relay: Option<ObservabilityRelay>,
    diagnostics: DiagnosticSink,
}

impl Dispatcher {
    /// Dispatcher using the backend named in `config`
    pub fn new(config: DispatcherConfig) -> Self {
        let chain = ChainClient::new(config.rpc_url.clone());
        let backend = backend::from_config(&config, chain.clone());
        Self::with_backend(config, backend)
    }

    /// Dispatcher using a caller-provided backend
    pub fn with_backend(config: DispatcherConfig, backend: Arc<dyn AccountBackend>) -> Self {
        let chain = ChainClient::new(config.rpc_url.clone());
        let relay = config
            .relay_url
            .as_ref()
            .map(|url| ObservabilityRelay::new(url.clone(), config.chain_id));

        let mut poller = Poller::new(config.poll_interval, config.confirmation_timeout);
        if let Some(relay) = &relay {
            poller = poller.with_relay(relay.clone());
        }

        Self {
            resolver: SignerResolver::new(
                config.account_factory,
                config.account_salt,
                config.retry,
            ),
            builder: UserOpBuilder::new(chain.clone(), config.entry_point, config.retry),
            wallet: DirectWallet::new(chain.clone(), config.wallet_gas_limit, config.retry),
            poller,
            relay,
            diagnostics: DiagnosticSink::default(),
            backend,
            chain,
            config,
        }
    }

    /// Route non-fatal failures to `diagnostics`
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticSink) -> Self {
        self.poller = self.poller.with_diagnostics(diagnostics.clone());
        self.diagnostics = diagnostics;
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn chain(&self) -> &ChainClient {
        &self.chain
    }

    /// Dispatch `request` on behalf of `session`
    pub async fn dispatch(
        &self,
        session: &AccountSession,
        request: DispatchRequest,
    ) -> Result<DispatchOutcome> {
        if request.read_only {
            return self.read(&request).await;
        }

        let path = self.resolver.resolve(session, &self.chain).await?;
        log::info!(
            "dispatching {} on {} as {} ({})",
            request.call.method,
            request.call.target,
            path.caller(),
            path.name()
        );
        request.emit(DispatchStage::Resolved {
            path: path.name(),
            caller: path.caller(),
        });

        let receipt = match &path {
            SignerPath::Direct(sender) => {
                let hash = self
                    .wallet
                    .send_estimated(sender.as_ref(), &request.call)
                    .await?;
                self.confirm_transaction(hash, &request).await?
            }
            SignerPath::ConnectedWallet(wallet) => {
                let hash = self.wallet.send_fixed(wallet.as_ref(), &request.call).await?;
                self.confirm_transaction(hash, &request).await?
            }
            SignerPath::SmartAccount(account) => {
                let sponsored = !path.self_funded(self.config.sponsored);
                self.dispatch_user_operation(account, sponsored, &request)
                    .await?
            }
        };

        Ok(DispatchOutcome::Receipt(receipt))
    }

    async fn read(&self, request: &DispatchRequest) -> Result<DispatchOutcome> {
        let call = &request.call;
        let call_request = CallRequest {
            from: request.caller,
            to: call.target,
            data: call.call_data.clone(),
            value: call.value,
            gas: None,
        };

        let raw = with_retry(&self.config.retry, "eth_call", || {
            self.chain.call(&call_request)
        })
        .await?;
        let values = call.decode_output(&raw)?;
        Ok(DispatchOutcome::Call { raw, values })
    }

    async fn confirm_transaction(
        &self,
        hash: B256,
        request: &DispatchRequest,
    ) -> Result<NormalizedReceipt> {
        request.emit(DispatchStage::Submitted { hash });
        let pending = PendingOperation::new(hash, BackendKind::DirectWallet);
        let tx_hash = self.poller.wait(&pending, &self.chain).await?;
        request.emit(DispatchStage::Included {
            transaction_hash: tx_hash,
        });

        let raw = with_retry(&self.config.retry, "eth_getTransactionReceipt", || {
            backend::node_receipt(&self.chain, tx_hash)
        })
        .await?;
        Ok(request.normalize(&raw, &self.diagnostics))
    }

    async fn estimate(&self, op: &mut UserOperation, request: &DispatchRequest) -> Result<()> {
        let draft = op.with_dummy_signature();
        let gas = with_retry(&self.config.retry, "gas estimation", || {
            self.backend.estimate_gas(&draft)
        })
        .await?;
        apply_gas(op, &gas);
        request.emit(DispatchStage::GasEstimated);
        Ok(())
    }

    async fn dispatch_user_operation(
        &self,
        account: &SmartAccount,
        sponsored: bool,
        request: &DispatchRequest,
    ) -> Result<NormalizedReceipt> {
        let backend = self.backend.as_ref();
        let mut op = self.builder.build(account, &request.call, backend).await?;
        request.emit(DispatchStage::Built {
            sender: op.sender,
            nonce: op.nonce,
        });

        // An aggregator prices and estimates in the sponsorship round-trip;
        // everyone else estimates first so the paymaster signs final limits.
        let mut estimated = false;
        if !(sponsored && backend.sponsorship_estimates_gas()) {
            self.estimate(&mut op, request).await?;
            estimated = true;
        }

        if sponsored {
            let draft = op.with_dummy_signature();
            let sponsorship = with_retry(&self.config.retry, "sponsorship", || {
                backend.request_sponsorship(&draft)
            })
            .await?;
            match sponsorship {
                Some(sponsorship) => {
                    apply_sponsorship(&mut op, &sponsorship);
                    request.emit(DispatchStage::Sponsored);
                }
                None => {
                    log::info!("{} has no paymaster, operation is self-funded", backend.kind());
                    if !estimated {
                        self.estimate(&mut op, request).await?;
                    }
                }
            }
        }

        // Gas, fees and paymaster data are final: sign last.
        let signed = op.sign(account.owner(), self.config.entry_point, self.config.chain_id)?;
        let signed = with_retry(&self.config.retry, "cosign", || backend.cosign(signed.clone())).await?;
        request.emit(DispatchStage::Signed {
            hash: signed.hash(),
        });

        log::debug!(
            "operation {}: {}",
            signed.hash(),
            signed.to_wire(backend.wire_format())
        );
        let hash = backend.submit(&signed, &request.call).await?;
        log::info!("submitted operation {} via {}", hash, backend.kind());
        request.emit(DispatchStage::Submitted { hash });

        if let Some(relay) = &self.relay {
            if let Err(e) = relay.record(&signed, hash, &request.call).await {
                self.diagnostics
                    .report(DiagnosticKind::RelayRecord, format!("record {}: {}", hash, e));
            }
        }

        let pending = PendingOperation::new(hash, backend.kind());
        let tx_hash = self.poller.wait(&pending, backend).await?;
        request.emit(DispatchStage::Included {
            transaction_hash: tx_hash,
        });

        let raw = with_retry(&self.config.retry, "receipt", || backend.receipt(tx_hash)).await?;
        Ok(request.normalize(&raw, &self.diagnostics))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("chain_id", &self.config.chain_id)
            .field("backend", &self.backend.kind())
            .finish_non_exhaustive()
    }
}
