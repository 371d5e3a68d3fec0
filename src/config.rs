//! Dispatcher configuration
//!
//! One [`DispatcherConfig`] describes one network: the node RPC, the ERC-4337
//! contracts and exactly one active account-abstraction backend.

use crate::error::{Error, Result};
use crate::http::ApiCreds;
use crate::retry::RetryPolicy;
use crate::types::serde_helpers::{millis, opt_secs};
use alloy_primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Canonical EntryPoint v0.6 deployment
pub const ENTRY_POINT_V06: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// eth-infinitism SimpleAccountFactory v0.6 deployment
pub const SIMPLE_ACCOUNT_FACTORY_V06: Address =
    address!("9406Cc6185a346906296840746125a0E44976454");

/// Gas limit used for connected-wallet transactions, which skip estimation
pub const DEFAULT_WALLET_GAS_LIMIT: u64 = 1_000_000;

/// Which account-abstraction backend is active
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BackendConfig {
    /// Separate bundler and paymaster services
    #[serde(rename_all = "camelCase")]
    Hosted {
        bundler_url: String,
        paymaster_url: String,
        #[serde(default)]
        policy_id: Option<String>,
    },
    /// Single endpoint doing fee lookup, estimation, sponsorship and submission
    #[serde(rename_all = "camelCase")]
    Aggregator {
        url: String,
        policy_id: String,
        #[serde(default)]
        creds: Option<ApiCreds>,
        /// When set, a backend-held key cosigns every operation
        #[serde(default)]
        cosigner_url: Option<String>,
    },
    /// Plain ERC-4337 bundler JSON-RPC
    #[serde(rename = "bundler", rename_all = "camelCase")]
    BundlerRpc {
        url: String,
        #[serde(default)]
        paymaster_url: Option<String>,
        #[serde(default)]
        policy_id: Option<String>,
    },
}

impl BackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::Hosted { .. } => "hosted",
            BackendConfig::Aggregator { .. } => "aggregator",
            BackendConfig::BundlerRpc { .. } => "bundler",
        }
    }
}

/// Static configuration for a [`Dispatcher`](crate::Dispatcher)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    #[serde(default = "default_entry_point")]
    pub entry_point: Address,
    #[serde(default = "default_factory")]
    pub account_factory: Address,
    #[serde(default)]
    pub account_salt: U256,
    pub backend: BackendConfig,
    /// Request paymaster sponsorship for account-abstraction operations
    #[serde(default = "default_true")]
    pub sponsored: bool,
    /// Optional observability relay base URL
    #[serde(default)]
    pub relay_url: Option<String>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_poll_interval", with = "millis")]
    pub poll_interval: Duration,
    /// `None` waits for confirmation indefinitely
    #[serde(default, with = "opt_secs")]
    pub confirmation_timeout: Option<Duration>,
    #[serde(default = "default_wallet_gas_limit")]
    pub wallet_gas_limit: u64,
}

fn default_entry_point() -> Address {
    ENTRY_POINT_V06
}

fn default_factory() -> Address {
    SIMPLE_ACCOUNT_FACTORY_V06
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_wallet_gas_limit() -> u64 {
    DEFAULT_WALLET_GAS_LIMIT
}

impl DispatcherConfig {
    pub fn new(chain_id: u64, rpc_url: impl Into<String>, backend: BackendConfig) -> Self {
        Self {
            chain_id,
            rpc_url: rpc_url.into(),
            entry_point: ENTRY_POINT_V06,
            account_factory: SIMPLE_ACCOUNT_FACTORY_V06,
            account_salt: U256::ZERO,
            backend,
            sponsored: true,
            relay_url: None,
            retry: RetryPolicy::default(),
            poll_interval: default_poll_interval(),
            confirmation_timeout: None,
            wallet_gas_limit: DEFAULT_WALLET_GAS_LIMIT,
        }
    }

    pub fn with_relay(mut self, url: impl Into<String>) -> Self {
        self.relay_url = Some(url.into());
        self
    }

    pub fn with_sponsorship(mut self, sponsored: bool) -> Self {
        self.sponsored = sponsored;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = Some(timeout);
        self
    }

    /// Build a configuration from environment variables.
    ///
    /// Required: `CHAIN_ID`, `RPC_URL`, `AA_BACKEND` (`hosted`, `aggregator` or
    /// `bundler`) and the URLs that backend needs. Everything else falls back to
    /// the defaults of [`DispatcherConfig::new`].
    pub fn from_env() -> Result<Self> {
        let chain_id = required("CHAIN_ID")?
            .parse::<u64>()
            .map_err(|e| Error::Config(format!("CHAIN_ID: {}", e)))?;
        let rpc_url = required("RPC_URL")?;

        let backend = match required("AA_BACKEND")?.as_str() {
            "hosted" => BackendConfig::Hosted {
                bundler_url: required("BUNDLER_URL")?,
                paymaster_url: required("PAYMASTER_URL")?,
                policy_id: optional("PAYMASTER_POLICY_ID"),
            },
            "aggregator" => BackendConfig::Aggregator {
                url: required("AGGREGATOR_URL")?,
                policy_id: required("PAYMASTER_POLICY_ID")?,
                creds: ApiCreds::from_env(),
                cosigner_url: optional("COSIGNER_URL"),
            },
            "bundler" => BackendConfig::BundlerRpc {
                url: required("BUNDLER_URL")?,
                paymaster_url: optional("PAYMASTER_URL"),
                policy_id: optional("PAYMASTER_POLICY_ID"),
            },
            other => {
                return Err(Error::Config(format!("unknown AA_BACKEND: {}", other)));
            }
        };

        let mut config = Self::new(chain_id, rpc_url, backend);

        if let Some(ep) = optional("ENTRY_POINT") {
            config.entry_point = parse_env("ENTRY_POINT", &ep)?;
        }
        if let Some(factory) = optional("ACCOUNT_FACTORY") {
            config.account_factory = parse_env("ACCOUNT_FACTORY", &factory)?;
        }
        if let Some(salt) = optional("ACCOUNT_SALT") {
            config.account_salt = parse_env("ACCOUNT_SALT", &salt)?;
        }
        if let Some(sponsored) = optional("SPONSORED") {
            config.sponsored = parse_env("SPONSORED", &sponsored)?;
        }
        if let Some(ms) = optional("POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(parse_env("POLL_INTERVAL_MS", &ms)?);
        }
        if let Some(secs) = optional("CONFIRMATION_TIMEOUT_SECS") {
            config.confirmation_timeout = Some(Duration::from_secs(parse_env(
                "CONFIRMATION_TIMEOUT_SECS",
                &secs,
            )?));
        }
        config.relay_url = optional("RELAY_URL");

        Ok(config)
    }
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| Error::Config(format!("{} is not set", key)))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| Error::Config(format!("{}: {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let json = r#"{
            "chainId": 84532,
            "rpcUrl": "http://localhost:8545",
            "backend": {
                "kind": "hosted",
                "bundlerUrl": "http://bundler",
                "paymasterUrl": "http://paymaster"
            }
        }"#;
        let config: DispatcherConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.chain_id, 84532);
        assert_eq!(config.entry_point, ENTRY_POINT_V06);
        assert!(config.sponsored);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert!(config.confirmation_timeout.is_none());
        assert_eq!(config.backend.name(), "hosted");
    }

    #[test]
    fn test_deserialize_aggregator_with_cosigner() {
        let json = r#"{
            "chainId": 1,
            "rpcUrl": "http://node",
            "sponsored": false,
            "confirmationTimeout": 90,
            "backend": {
                "kind": "aggregator",
                "url": "http://agg",
                "policyId": "policy",
                "cosignerUrl": "http://cosigner"
            }
        }"#;
        let config: DispatcherConfig = serde_json::from_str(json).unwrap();

        assert!(!config.sponsored);
        assert_eq!(config.confirmation_timeout, Some(Duration::from_secs(90)));
        match config.backend {
            BackendConfig::Aggregator { cosigner_url, .. } => {
                assert_eq!(cosigner_url.as_deref(), Some("http://cosigner"));
            }
            other => panic!("unexpected backend {:?}", other),
        }
    }

    #[test]
    fn test_backend_kind_matches_name() {
        let backend: BackendConfig = serde_json::from_str(
            r#"{ "kind": "bundler", "url": "http://bundler", "paymasterUrl": "http://pm" }"#,
        )
        .unwrap();
        assert_eq!(backend.name(), "bundler");
        assert!(matches!(
            &backend,
            BackendConfig::BundlerRpc { paymaster_url: Some(url), .. } if url == "http://pm"
        ));

        for backend in [
            backend,
            BackendConfig::Hosted {
                bundler_url: "http://b".into(),
                paymaster_url: "http://p".into(),
                policy_id: None,
            },
        ] {
            let json = serde_json::to_value(&backend).unwrap();
            assert_eq!(json["kind"], backend.name());
        }
    }
}
