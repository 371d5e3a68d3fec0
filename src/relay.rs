//! Observability relay client
//!
//! Some bundlers drop operations without ever reporting a failure through
//! `eth_getUserOperationByHash`. The relay is told about every submission and
//! can later say that an operation failed.

use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::types::{OperationCall, SignedUserOperation, WireFormat};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
struct CallRecord<'a> {
    contract: String,
    method: &'a str,
    arguments: &'a [String],
}

#[derive(Debug, Serialize)]
struct SubmissionRecord<'a> {
    user_operation: Value,
    user_operation_hash: B256,
    user_operation_data: Vec<CallRecord<'a>>,
    network_id: u64,
}

/// Status the relay holds for an operation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelayStatus {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl RelayStatus {
    pub fn is_failed(&self) -> bool {
        self.status.eq_ignore_ascii_case("failed")
    }
}

#[derive(Clone)]
pub struct ObservabilityRelay {
    http: HttpClient,
    network_id: u64,
}

impl ObservabilityRelay {
    pub fn new(url: impl Into<String>, network_id: u64) -> Self {
        Self {
            http: HttpClient::new(url),
            network_id,
        }
    }

    /// Record a submitted operation under `hash`, the hash the backend
    /// accepted it as; [`status`](Self::status) is queried with the same hash
    pub async fn record(
        &self,
        op: &SignedUserOperation,
        hash: B256,
        call: &OperationCall,
    ) -> Result<()> {
        if hash != op.hash() {
            log::warn!(
                "backend returned {} for operation hashed locally as {}",
                hash,
                op.hash()
            );
        }
        let record = SubmissionRecord {
            user_operation: op.to_wire(WireFormat::Hex),
            user_operation_hash: hash,
            user_operation_data: vec![CallRecord {
                contract: call.target.to_checksum(None),
                method: &call.method,
                arguments: &call.arguments,
            }],
            network_id: self.network_id,
        };

        self.http.post_discard("/user_operations", &record).await?;
        log::debug!("recorded operation {} with relay", hash);
        Ok(())
    }

    /// Current status, `None` when the relay does not know the operation
    pub async fn status(&self, hash: B256) -> Result<Option<RelayStatus>> {
        match self
            .http
            .get::<RelayStatus>(&format!("/user_operations/{}", hash), None)
            .await
        {
            Ok(status) => Ok(Some(status)),
            Err(Error::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
