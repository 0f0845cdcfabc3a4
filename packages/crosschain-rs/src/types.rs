//! Shared primitive types for the swap coordinator.

use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies which chain a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainTag {
    Evm,
    Solana,
}

impl ChainTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainTag::Evm => "evm",
            ChainTag::Solana => "solana",
        }
    }
}

impl fmt::Display for ChainTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChainTag {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "evm" | "ethereum" | "eth" => Ok(ChainTag::Evm),
            "solana" | "sol" => Ok(ChainTag::Solana),
            other => Err(eyre!("unknown chain: {}", other)),
        }
    }
}

/// Opaque swap identifier. Caller-supplied or a freshly generated UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwapId(pub String);

impl SwapId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SwapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SwapId {
    fn from(s: &str) -> Self {
        SwapId(s.to_string())
    }
}

impl From<String> for SwapId {
    fn from(s: String) -> Self {
        SwapId(s)
    }
}

/// Chain-agnostic transaction inclusion reference.
///
/// `block` is a block number on EVM and a slot on Solana.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRef {
    pub tx_id: String,
    pub block: u64,
}

/// Decode a hex string (with or without `0x` prefix) into exactly 32 bytes.
pub fn bytes32_from_hex(s: &str) -> Result<[u8; 32]> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)?;
    if bytes.len() != 32 {
        return Err(eyre!("expected 32 bytes, got {}", bytes.len()));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Encode 32 bytes as a `0x`-prefixed lowercase hex string.
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode an arbitrary even-length hex payload, `0x`-prefix tolerant.
pub fn bytes_from_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    Ok(hex::decode(s)?)
}

/// Encode arbitrary bytes as a `0x`-prefixed lowercase hex string.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_tag_parse() {
        assert_eq!("evm".parse::<ChainTag>().unwrap(), ChainTag::Evm);
        assert_eq!("EVM".parse::<ChainTag>().unwrap(), ChainTag::Evm);
        assert_eq!("solana".parse::<ChainTag>().unwrap(), ChainTag::Solana);
        assert_eq!("SOL".parse::<ChainTag>().unwrap(), ChainTag::Solana);
        assert!("terra".parse::<ChainTag>().is_err());
    }

    #[test]
    fn test_chain_tag_display() {
        assert_eq!(ChainTag::Evm.to_string(), "evm");
        assert_eq!(ChainTag::Solana.to_string(), "solana");
    }

    #[test]
    fn test_bytes32_roundtrip() {
        let bytes = [0xABu8; 32];
        let hex = bytes32_to_hex(&bytes);
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 66);
        assert_eq!(bytes32_from_hex(&hex).unwrap(), bytes);
    }

    #[test]
    fn test_bytes32_without_prefix() {
        let bytes = [0x42u8; 32];
        let bare = hex::encode(bytes);
        assert_eq!(bytes32_from_hex(&bare).unwrap(), bytes);
    }

    #[test]
    fn test_bytes32_wrong_length() {
        assert!(bytes32_from_hex("0xdead").is_err());
    }

    #[test]
    fn test_bytes_roundtrip_all_even_lengths() {
        // Mutual inverses for every even-length payload up to 32 bytes.
        for len in 0..=32usize {
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let hex = bytes_to_hex(&payload);
            assert_eq!(bytes_from_hex(&hex).unwrap(), payload);
            // Also accept the bare form.
            let bare = hex.strip_prefix("0x").unwrap();
            assert_eq!(bytes_from_hex(bare).unwrap(), payload);
        }
    }

    #[test]
    fn test_bytes_odd_length_rejected() {
        assert!(bytes_from_hex("0xabc").is_err());
    }
}
