use super::Sponsorship;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::types::{UserOperation, WireFormat};
use alloy_primitives::Address;
use serde_json::{json, Value};

/// `pm_sponsorUserOperation` client shared by the hosted and bundler backends
#[derive(Clone)]
pub struct PaymasterClient {
    http: HttpClient,
    entry_point: Address,
    policy_id: Option<String>,
}

impl PaymasterClient {
    pub fn new(url: impl Into<String>, entry_point: Address, policy_id: Option<String>) -> Self {
        Self {
            http: HttpClient::new(url),
            entry_point,
            policy_id,
        }
    }

    /// Request sponsorship for `op`
    ///
    /// Any JSON-RPC error from the paymaster is a refusal and maps to
    /// [`Error::SponsorshipDenied`]; transport failures keep their own kind so
    /// the caller can retry them.
    pub async fn sponsor(&self, op: &UserOperation) -> Result<Sponsorship> {
        let mut params = vec![
            op.to_wire(WireFormat::Hex),
            Value::String(self.entry_point.to_checksum(None)),
        ];
        if let Some(policy_id) = &self.policy_id {
            params.push(json!({ "policyId": policy_id }));
        }

        let result = self
            .http
            .rpc("pm_sponsorUserOperation", Value::Array(params))
            .await
            .map_err(|e| match e {
                Error::Rpc { code, message } => {
                    Error::SponsorshipDenied(format!("{} (code {})", message, code))
                }
                other => other,
            })?;

        if result.is_null() {
            return Err(Error::SponsorshipDenied(
                "paymaster returned no sponsorship".into(),
            ));
        }
        let sponsorship = Sponsorship::from_value(&result)?;
        log::debug!(
            "paymaster sponsored {} ({} bytes of paymasterAndData)",
            op.sender,
            sponsorship.paymaster_and_data.len()
        );
        Ok(sponsorship)
    }
}
