//! Configuration management for the blob transaction sender
//!
//! Loads configuration from TOML files with environment variable substitution.
//! Key material never lives in the file itself; `wallet.private_key_env` names
//! the environment variable that holds it.

use crate::tx::{
    FeePolicy, TransactionAssembler, BLOB_BASE_FEE_UPDATE_FRACTION_CANCUN,
    BLOB_BASE_FEE_UPDATE_FRACTION_PRAGUE,
};

use alloy_primitives::{Address, Bytes, U256};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "BLOB_SENDER_CONFIG";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub chain: ChainConfig,
    pub wallet: WalletConfig,
    pub transaction: TransactionConfig,
    #[serde(default)]
    pub fees: FeesConfig,
    #[serde(default)]
    pub kzg: KzgConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_urls: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionConfig {
    pub recipient: String,
    #[serde(default = "default_value_wei")]
    pub value_wei: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// UTF-8 payload copied verbatim into the blob
    pub payload: Option<String>,
    /// Hex payload, alternative to `payload`
    pub payload_hex: Option<String>,
    pub calldata_hex: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeesConfig {
    #[serde(default = "default_tip_multiplier")]
    pub tip_multiplier: u64,
    #[serde(default = "default_blob_fee_multiplier")]
    pub blob_fee_multiplier: u64,
    #[serde(default = "default_update_fraction")]
    pub blob_base_fee_update_fraction: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KzgConfig {
    /// Custom trusted setup; the embedded mainnet setup is used when unset
    pub trusted_setup_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub fee_estimate_only: bool,
    #[serde(default)]
    pub wait_for_inclusion: bool,
    #[serde(default = "default_inclusion_timeout_secs")]
    pub inclusion_timeout_secs: u64,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub textfile_path: Option<String>,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_value_wei() -> String {
    "0".to_string()
}

fn default_gas_limit() -> u64 {
    TransactionAssembler::DEFAULT_GAS_LIMIT
}

fn default_tip_multiplier() -> u64 {
    FeePolicy::DEFAULT_TIP_MULTIPLIER as u64
}

fn default_blob_fee_multiplier() -> u64 {
    FeePolicy::DEFAULT_BLOB_FEE_MULTIPLIER as u64
}

fn default_update_fraction() -> u64 {
    BLOB_BASE_FEE_UPDATE_FRACTION_CANCUN as u64
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_inclusion_timeout_secs() -> u64 {
    120
}

fn default_receipt_poll_interval_ms() -> u64 {
    2_000
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            tip_multiplier: default_tip_multiplier(),
            blob_fee_multiplier: default_blob_fee_multiplier(),
            blob_base_fee_update_fraction: default_update_fraction(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            fee_estimate_only: false,
            wait_for_inclusion: false,
            inclusion_timeout_secs: default_inclusion_timeout_secs(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
        }
    }
}

impl Settings {
    /// Load settings from the configured file path
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.rpc_urls.iter().all(|url| url.trim().is_empty()) {
            anyhow::bail!("At least one RPC URL must be configured");
        }

        if self.pipeline.max_attempts == 0 {
            anyhow::bail!("pipeline.max_attempts must be at least 1");
        }

        if self.fees.blob_base_fee_update_fraction == 0 {
            anyhow::bail!("fees.blob_base_fee_update_fraction must be non-zero");
        }

        if self.transaction.gas_limit == 0 {
            anyhow::bail!("transaction.gas_limit must be non-zero");
        }

        if self.fees.blob_fee_multiplier == 0 {
            anyhow::bail!("fees.blob_fee_multiplier must be at least 1");
        }

        self.recipient()?;
        self.value()?;
        self.calldata()?;
        if !self.pipeline.fee_estimate_only {
            self.payload()?;
        }

        let fraction = u128::from(self.fees.blob_base_fee_update_fraction);
        if fraction != BLOB_BASE_FEE_UPDATE_FRACTION_CANCUN
            && fraction != BLOB_BASE_FEE_UPDATE_FRACTION_PRAGUE
        {
            tracing::warn!(
                "fees.blob_base_fee_update_fraction {} matches neither Cancun nor Prague",
                fraction
            );
        }

        if self.fees.tip_multiplier == 0 {
            tracing::warn!("fees.tip_multiplier is 0 - transaction will carry no priority fee");
        }

        Ok(())
    }

    /// Recipient of the blob transaction
    pub fn recipient(&self) -> Result<Address> {
        Address::from_str(self.transaction.recipient.trim())
            .with_context(|| format!("Invalid recipient address: {}", self.transaction.recipient))
    }

    /// Value transferred with the transaction, in wei
    pub fn value(&self) -> Result<U256> {
        U256::from_str(self.transaction.value_wei.trim())
            .with_context(|| format!("Invalid value_wei: {}", self.transaction.value_wei))
    }

    /// Raw payload bytes to place in the blob
    pub fn payload(&self) -> Result<Vec<u8>> {
        match (&self.transaction.payload, &self.transaction.payload_hex) {
            (Some(_), Some(_)) => {
                anyhow::bail!("Set only one of transaction.payload and transaction.payload_hex")
            }
            (Some(text), None) => Ok(text.as_bytes().to_vec()),
            (None, Some(encoded)) => decode_hex(encoded)
                .with_context(|| "Invalid transaction.payload_hex"),
            (None, None) => anyhow::bail!("No payload configured"),
        }
    }

    /// Optional calldata carried in the transaction body
    pub fn calldata(&self) -> Result<Bytes> {
        match &self.transaction.calldata_hex {
            Some(encoded) => decode_hex(encoded)
                .map(Bytes::from)
                .with_context(|| "Invalid transaction.calldata_hex"),
            None => Ok(Bytes::new()),
        }
    }

    /// Fee policy derived from the `[fees]` section
    pub fn fee_policy(&self) -> FeePolicy {
        FeePolicy {
            tip_multiplier: u128::from(self.fees.tip_multiplier),
            blob_fee_multiplier: u128::from(self.fees.blob_fee_multiplier),
            blob_base_fee_update_fraction: u128::from(self.fees.blob_base_fee_update_fraction),
        }
    }

    /// Timeout applied to every node request
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.chain.request_timeout_secs)
    }
}

fn decode_hex(input: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let trimmed = input.trim();
    hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex =
            regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex is valid");
    }

    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
