//! Broker configuration.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::network::Network;

const DEFAULT_CHAIN_ID: u64 = 1;
const DEFAULT_CHAIN_NAME: &str = "mainnet";
const CONFIG_PATH_ENV: &str = "WALLET_BROKER_CONFIG";

/// High-level broker configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    /// Enable in-memory telemetry counters.
    pub telemetry: bool,
    /// Network used for origins that never selected one.
    pub default_network: Network,
    /// Chains this wallet currently supports. Chain-switch calls can only
    /// move among these.
    pub networks: Vec<Network>,
    pub approvals: ApprovalPolicyConfig,
    pub walletconnect: WalletConnectConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        let default_network = Network::new(DEFAULT_CHAIN_ID, DEFAULT_CHAIN_NAME);
        Self {
            telemetry: false,
            networks: vec![
                default_network.clone(),
                Network::new(11_155_111, "sepolia"),
            ],
            default_network,
            approvals: ApprovalPolicyConfig::default(),
            walletconnect: WalletConnectConfig::default(),
        }
    }
}

/// Policy applied to pending user approvals.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApprovalPolicyConfig {
    /// Optional limit, in seconds, after which an unanswered approval is
    /// discarded and the caller observes a user rejection. `None` keeps
    /// approvals pending until the UI settles them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ApprovalPolicyConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Client identity and capabilities advertised during session settlement.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalletConnectConfig {
    pub client_name: String,
    pub client_url: String,
    pub client_description: String,
    /// Methods granted to acknowledged sessions.
    pub methods: Vec<String>,
    /// Events granted to acknowledged sessions.
    pub events: Vec<String>,
}

impl Default for WalletConnectConfig {
    fn default() -> Self {
        Self {
            client_name: "wallet-broker".to_string(),
            client_url: "https://wallet.invalid".to_string(),
            client_description: "Self-custodial wallet".to_string(),
            methods: vec![
                "eth_sendTransaction".to_string(),
                "eth_signTransaction".to_string(),
                "eth_sign".to_string(),
                "personal_sign".to_string(),
                "eth_signTypedData".to_string(),
                "eth_signTypedData_v4".to_string(),
                "wallet_switchEthereumChain".to_string(),
            ],
            events: vec!["accountsChanged".to_string(), "chainChanged".to_string()],
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read broker config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse broker config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl BrokerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load from the path named by `WALLET_BROKER_CONFIG`, falling back to
    /// defaults when the variable is unset or the file is unusable.
    pub fn load() -> Self {
        let Some(path) = env::var_os(CONFIG_PATH_ENV).map(PathBuf::from) else {
            return Self::default();
        };
        Self::from_file(&path).unwrap_or_else(|error| {
            warn!(path = %path.display(), %error, "broker config unavailable, using defaults");
            Self::default()
        })
    }
}
