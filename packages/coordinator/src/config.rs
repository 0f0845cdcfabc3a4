//! Coordinator configuration.
//!
//! Every value is read from lowercase, underscored environment variables
//! (`evm_rpc_url`, `limits_min_amount`, ...), optionally seeded from a
//! `.env` file. Key material is redacted from `Debug` output.

#![allow(dead_code)]

use alloy::primitives::U256;
use crosschain_rs::TimelockDurations;
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Main configuration for the coordinator.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub evm: EvmConfig,
    pub solana: SolanaConfig,
    pub timelocks: TimelockDurations,
    pub limits: LimitsConfig,
    /// When true, `initiate` does not spawn async processing; tests drive
    /// the state machine through the engine's `step` seam.
    #[serde(default)]
    pub test_mode: bool,
}

/// EVM chain configuration.
#[derive(Clone, Deserialize)]
pub struct EvmConfig {
    pub rpc_url: String,
    #[serde(default)]
    pub rpc_ws_url: Option<String>,
    pub private_key: String,
    pub token_address: String,
    pub htlc_factory_address: String,
}

/// Custom Debug that redacts private_key to prevent accidental log leakage.
impl fmt::Debug for EvmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmConfig")
            .field("rpc_url", &self.rpc_url)
            .field("rpc_ws_url", &self.rpc_ws_url)
            .field("private_key", &"<redacted>")
            .field("token_address", &self.token_address)
            .field("htlc_factory_address", &self.htlc_factory_address)
            .finish()
    }
}

/// Solana chain configuration.
#[derive(Clone, Deserialize)]
pub struct SolanaConfig {
    pub rpc_url: String,
    #[serde(default)]
    pub rpc_ws_url: Option<String>,
    pub keypair: String,
    pub program_id: String,
    pub token_mint: String,
}

/// Custom Debug that redacts the keypair to prevent accidental log leakage.
impl fmt::Debug for SolanaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaConfig")
            .field("rpc_url", &self.rpc_url)
            .field("rpc_ws_url", &self.rpc_ws_url)
            .field("keypair", &"<redacted>")
            .field("program_id", &self.program_id)
            .field("token_mint", &self.token_mint)
            .finish()
    }
}

/// Swap admission limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub min_amount: U256,
    pub max_amount: U256,
    pub max_concurrent_swaps: usize,
}

fn default_min_amount() -> U256 {
    U256::from(100_000u64)
}

fn default_max_amount() -> U256 {
    U256::from(10_000_000_000u64)
}

fn default_max_concurrent_swaps() -> usize {
    10
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_amount: default_min_amount(),
            max_amount: default_max_amount(),
            max_concurrent_swaps: default_max_concurrent_swaps(),
        }
    }
}

impl Config {
    /// Load configuration, reading `.env` first when present.
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env").or_else(|_| Self::load_from_env())
    }

    /// Load from a specific .env file path.
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables.
    fn load_from_env() -> Result<Self> {
        let evm = EvmConfig {
            rpc_url: require("evm_rpc_url")?,
            rpc_ws_url: env::var("evm_rpc_ws_url").ok(),
            private_key: require("evm_private_key")?,
            token_address: require("evm_token_address")?,
            htlc_factory_address: require("evm_htlc_factory_address")?,
        };

        let solana = SolanaConfig {
            rpc_url: require("solana_rpc_url")?,
            rpc_ws_url: env::var("solana_rpc_ws_url").ok(),
            keypair: require("solana_keypair")?,
            program_id: require("solana_program_id")?,
            token_mint: require("solana_token_mint")?,
        };

        let defaults = TimelockDurations::default();
        let timelocks = TimelockDurations {
            finality: optional_parse("timelocks_finality")?.unwrap_or(defaults.finality),
            resolver_exclusive: optional_parse("timelocks_resolver")?
                .unwrap_or(defaults.resolver_exclusive),
            public_withdrawal: optional_parse("timelocks_public")?
                .unwrap_or(defaults.public_withdrawal),
            cancellation: optional_parse("timelocks_cancellation")?
                .unwrap_or(defaults.cancellation),
        };

        let limits = LimitsConfig {
            min_amount: optional_u256("limits_min_amount")?.unwrap_or_else(default_min_amount),
            max_amount: optional_u256("limits_max_amount")?.unwrap_or_else(default_max_amount),
            max_concurrent_swaps: optional_parse("limits_max_concurrent_swaps")?
                .unwrap_or_else(default_max_concurrent_swaps),
        };

        let test_mode = optional_parse::<bool>("test_mode")?.unwrap_or(false);

        let config = Config {
            evm,
            solana,
            timelocks,
            limits,
            test_mode,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.evm.rpc_url.is_empty() {
            return Err(eyre!("evm_rpc_url cannot be empty"));
        }
        if self.evm.private_key.len() != 66 || !self.evm.private_key.starts_with("0x") {
            return Err(eyre!("evm_private_key must be 66 chars (0x + 64 hex chars)"));
        }
        if self.evm.token_address.len() != 42 || !self.evm.token_address.starts_with("0x") {
            return Err(eyre!(
                "evm_token_address must be a valid hex address (42 chars with 0x prefix)"
            ));
        }
        if self.evm.htlc_factory_address.len() != 42
            || !self.evm.htlc_factory_address.starts_with("0x")
        {
            return Err(eyre!(
                "evm_htlc_factory_address must be a valid hex address (42 chars with 0x prefix)"
            ));
        }
        if self.solana.rpc_url.is_empty() {
            return Err(eyre!("solana_rpc_url cannot be empty"));
        }
        if self.solana.keypair.is_empty() {
            return Err(eyre!("solana_keypair cannot be empty"));
        }
        if self.solana.program_id.is_empty() {
            return Err(eyre!("solana_program_id cannot be empty"));
        }
        if self.solana.token_mint.is_empty() {
            return Err(eyre!("solana_token_mint cannot be empty"));
        }

        self.timelocks
            .validate()
            .wrap_err("invalid timelock durations")?;

        if self.limits.min_amount >= self.limits.max_amount {
            return Err(eyre!("limits_min_amount must be below limits_max_amount"));
        }
        if self.limits.max_concurrent_swaps == 0 {
            return Err(eyre!("limits_max_concurrent_swaps must be positive"));
        }

        Ok(())
    }
}

fn require(key: &str) -> Result<String> {
    env::var(key).map_err(|_| eyre!("{} environment variable is required", key))
}

fn optional_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| eyre!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(None),
    }
}

fn optional_u256(key: &str) -> Result<Option<U256>> {
    match env::var(key) {
        Ok(raw) => U256::from_str(&raw)
            .map(Some)
            .map_err(|_| eyre!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn test_config() -> Config {
        Config {
            evm: EvmConfig {
                rpc_url: "http://localhost:8545".to_string(),
                rpc_ws_url: None,
                private_key:
                    "0x0000000000000000000000000000000000000000000000000000000000000001"
                        .to_string(),
                token_address: "0x0000000000000000000000000000000000000002".to_string(),
                htlc_factory_address: "0x0000000000000000000000000000000000000003".to_string(),
            },
            solana: SolanaConfig {
                rpc_url: "http://localhost:8899".to_string(),
                rpc_ws_url: None,
                keypair: "[1,2,3]".to_string(),
                program_id: "11111111111111111111111111111111".to_string(),
                token_mint: "11111111111111111111111111111111".to_string(),
            },
            timelocks: TimelockDurations::default(),
            limits: LimitsConfig::default(),
            test_mode: true,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_private_key_validation() {
        let mut config = test_config();
        config.evm.private_key = "0x123".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_factory_address_validation() {
        let mut config = test_config();
        config.evm.htlc_factory_address = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_limit_ordering_validation() {
        let mut config = test_config();
        config.limits.min_amount = U256::from(100u64);
        config.limits.max_amount = U256::from(100u64);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = test_config();
        config.limits.max_concurrent_swaps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timelock_rejected() {
        let mut config = test_config();
        config.timelocks.cancellation = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = test_config();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("0x0000000000000000000000000000000000000000000000000000000000000001"));
        assert!(!rendered.contains("[1,2,3]"));
        assert!(rendered.contains("<redacted>"));
    }
}
