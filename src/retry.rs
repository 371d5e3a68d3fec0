//! Bounded retry for individual RPC call sites
//!
//! Retries wrap single requests (nonce lookup, gas estimation, receipt fetch),
//! never a whole build-sign-submit pipeline, so a signed operation is never
//! submitted twice by this module.

use crate::error::{Error, Result};
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// How often a transient RPC failure is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub attempts: u32,
    #[serde(with = "crate::types::serde_helpers::millis")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.attempts.saturating_sub(1) as usize)
    }
}

/// Run `op`, retrying transient failures according to `policy`
pub(crate) async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    op.retry(policy.backoff())
        .when(Error::is_retryable)
        .notify(|err: &Error, dur: Duration| {
            log::warn!("{} failed ({}), retrying in {:?}", label, err, dur);
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_transient_errors_retried_up_to_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(), "lookup", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Transient("timeout".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_caller_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(), "lookup", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::InvalidCall("bad args".into()))
        })
        .await;

        assert!(matches!(result, Err(Error::InvalidCall(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(), "lookup", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::Transient("503".into()))
            } else {
                Ok(7u64)
            }
        })
        .await;

        tokio_test::assert_ok!(&result);
        assert_eq!(result.unwrap(), 7);
    }
}
