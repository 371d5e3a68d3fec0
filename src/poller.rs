//! Confirmation polling
//!
//! After submission the dispatcher holds a [`PendingOperation`] and polls its
//! backend at a fixed interval until the operation is included, fails, or the
//! optional deadline passes.

use crate::backend::{BackendKind, LookupStatus, StatusLookup};
use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::error::{Error, Result};
use crate::relay::ObservabilityRelay;
use alloy_primitives::B256;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Handle for an operation or transaction awaiting inclusion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub hash: B256,
    pub submitted_at: DateTime<Utc>,
    pub backend: BackendKind,
}

impl PendingOperation {
    pub fn new(hash: B256, backend: BackendKind) -> Self {
        Self {
            hash,
            submitted_at: Utc::now(),
            backend,
        }
    }

    /// Time since submission
    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.submitted_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Clone)]
pub struct Poller {
    interval: Duration,
    deadline: Option<Duration>,
    relay: Option<ObservabilityRelay>,
    diagnostics: DiagnosticSink,
}

impl Poller {
    /// `deadline` is measured from submission; `None` polls until a terminal
    /// state is reached
    pub fn new(interval: Duration, deadline: Option<Duration>) -> Self {
        Self {
            interval,
            deadline,
            relay: None,
            diagnostics: DiagnosticSink::default(),
        }
    }

    /// Also ask the observability relay for failures of UserOperations
    pub fn with_relay(mut self, relay: ObservabilityRelay) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticSink) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Poll until `pending` is included and return the including
    /// transaction hash
    pub async fn wait<S>(&self, pending: &PendingOperation, source: &S) -> Result<B256>
    where
        S: StatusLookup + ?Sized,
    {
        let hash = pending.hash;

        loop {
            match source.lookup(hash).await {
                Ok(LookupStatus::Included(tx_hash)) => {
                    log::info!(
                        "{} operation {} included in {} after {:?}",
                        pending.backend,
                        hash,
                        tx_hash,
                        pending.elapsed()
                    );
                    return Ok(tx_hash);
                }
                Ok(LookupStatus::Failed(reason)) => {
                    return Err(Error::rejected(Some(hash), reason));
                }
                Ok(LookupStatus::Pending) => {}
                Err(e) if e.is_retryable() => {
                    log::warn!("lookup of {} failed ({}), still polling", hash, e);
                }
                Err(e) => return Err(e),
            }

            if pending.backend.is_account_abstraction() {
                self.check_relay(hash).await?;
            }

            let wait = match self.deadline {
                Some(deadline) => {
                    let elapsed = pending.elapsed();
                    if elapsed >= deadline {
                        return Err(Error::ConfirmationTimeout { hash, elapsed });
                    }
                    self.interval.min(deadline - elapsed)
                }
                None => self.interval,
            };
            tokio::time::sleep(wait).await;
        }
    }

    async fn check_relay(&self, hash: B256) -> Result<()> {
        let Some(relay) = &self.relay else {
            return Ok(());
        };

        match relay.status(hash).await {
            Ok(Some(status)) if status.is_failed() => Err(Error::rejected(
                Some(hash),
                status
                    .reason
                    .unwrap_or_else(|| "reported failed by relay".to_string()),
            )),
            Ok(_) => Ok(()),
            Err(e) => {
                self.diagnostics.report(
                    DiagnosticKind::RelayStatus,
                    format!("status of {}: {}", hash, e),
                );
                Ok(())
            }
        }
    }
}
