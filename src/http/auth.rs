//! HMAC request signing for API-key protected backends

use crate::error::{Error, Result};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

pub const API_KEY_HEADER: &str = "X-API-KEY";
pub const SIGNATURE_HEADER: &str = "X-API-SIGNATURE";
pub const TIMESTAMP_HEADER: &str = "X-API-TIMESTAMP";
pub const PASSPHRASE_HEADER: &str = "X-API-PASSPHRASE";

/// API credentials for an aggregator-style backend
///
/// The secret is base64 encoded. Requests are authenticated with an HMAC-SHA256
/// signature over `timestamp ‖ method ‖ path ‖ body`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCreds {
    pub key: String,
    pub secret: String,
    pub passphrase: String,
}

impl ApiCreds {
    pub fn new(key: String, secret: String, passphrase: String) -> Self {
        Self {
            key,
            secret,
            passphrase,
        }
    }

    /// Read credentials from `AGGREGATOR_API_KEY`, `AGGREGATOR_API_SECRET` and
    /// `AGGREGATOR_PASSPHRASE`. Returns `None` if any of them is missing.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("AGGREGATOR_API_KEY").ok()?;
        let secret = std::env::var("AGGREGATOR_API_SECRET").ok()?;
        let passphrase = std::env::var("AGGREGATOR_PASSPHRASE").ok()?;

        Some(Self {
            key,
            secret,
            passphrase,
        })
    }

    /// Build the signed header set for one request
    pub fn headers(
        &self,
        method: &str,
        path: &str,
        body: Option<&str>,
    ) -> Result<HashMap<&'static str, String>> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Signing(e.to_string()))?
            .as_secs();
        self.headers_at(timestamp, method, path, body)
    }

    fn headers_at(
        &self,
        timestamp: u64,
        method: &str,
        path: &str,
        body: Option<&str>,
    ) -> Result<HashMap<&'static str, String>> {
        let timestamp_str = timestamp.to_string();
        let message = format!("{}{}{}{}", timestamp_str, method, path, body.unwrap_or(""));

        let secret_bytes =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &self.secret)
                .or_else(|_| {
                    base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE, &self.secret)
                })
                .map_err(|e| Error::Signing(format!("Failed to decode secret: {}", e)))?;

        let mut mac = HmacSha256::new_from_slice(&secret_bytes)
            .map_err(|e| Error::Signing(format!("HMAC error: {}", e)))?;
        mac.update(message.as_bytes());

        // URL-safe alphabet, padding kept
        let signature = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE,
            mac.finalize().into_bytes(),
        );

        let mut headers = HashMap::new();
        headers.insert(API_KEY_HEADER, self.key.clone());
        headers.insert(SIGNATURE_HEADER, signature);
        headers.insert(TIMESTAMP_HEADER, timestamp_str);
        headers.insert(PASSPHRASE_HEADER, self.passphrase.clone());
        Ok(headers)
    }
}
