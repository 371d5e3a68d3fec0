use alloy_primitives::B256;
use std::time::Duration;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while encoding, submitting or confirming a call
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The call could not be encoded (unknown method, bad argument, ...)
    #[error("invalid call: {0}")]
    InvalidCall(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Timeouts, connection failures and 5xx responses
    #[error("transient backend error: {0}")]
    Transient(String),

    /// The paymaster refused to sponsor the operation
    #[error("sponsorship denied: {0}")]
    SponsorshipDenied(String),

    /// The backend reported a failure for a submitted (or about to be submitted) operation
    #[error("operation {} rejected: {reason}", display_hash(.hash))]
    OperationRejected { hash: Option<B256>, reason: String },

    /// The caller-supplied confirmation deadline elapsed
    #[error("confirmation of {hash} timed out after {elapsed:?}")]
    ConfirmationTimeout { hash: B256, elapsed: Duration },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of an [`Error`], used by callers to pick a recovery path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Caller,
    Transient,
    SponsorshipDenied,
    OperationRejected,
    ConfirmationTimeout,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidCall(_) | Error::InvalidParameter(_) => ErrorKind::Caller,
            Error::Transient(_) => ErrorKind::Transient,
            Error::Http(e) if e.is_timeout() || e.is_connect() => ErrorKind::Transient,
            Error::Api { status, .. } if *status >= 500 => ErrorKind::Transient,
            Error::SponsorshipDenied(_) => ErrorKind::SponsorshipDenied,
            Error::OperationRejected { .. } => ErrorKind::OperationRejected,
            Error::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
            _ => ErrorKind::Other,
        }
    }

    /// Whether an RPC call site may retry after this error
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub(crate) fn rejected(hash: Option<B256>, reason: impl Into<String>) -> Self {
        Error::OperationRejected {
            hash,
            reason: reason.into(),
        }
    }
}

fn display_hash(hash: &Option<B256>) -> String {
    hash.map(|h| h.to_string())
        .unwrap_or_else(|| "<unsubmitted>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_transient() {
        let err = Error::Api {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(err.is_retryable());

        let err = Error::Api {
            status: 400,
            message: "bad request".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_caller_errors_are_not_retryable() {
        let err = Error::InvalidCall("unknown method".into());
        assert_eq!(err.kind(), ErrorKind::Caller);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rejected_display_without_hash() {
        let err = Error::rejected(None, "AA21 didn't pay prefund");
        assert_eq!(
            err.to_string(),
            "operation <unsubmitted> rejected: AA21 didn't pay prefund"
        );
    }
}
