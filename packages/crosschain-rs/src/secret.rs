//! Preimage and hashlock primitives.
//!
//! The hashlock is SHA-256 of the 32-byte preimage. Both chains verify
//! SHA-256 natively, which is why it is used instead of keccak256 here.

use eyre::{eyre, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::types::{bytes32_from_hex, bytes32_to_hex};

/// A 32-byte swap preimage, zeroized on drop.
///
/// `Debug` never prints the value. Hex conversion is only available through
/// the explicit [`Secret::to_hex`] / [`Secret::from_hex`] codecs so that a
/// secret cannot leak into logs by accident.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret([u8; 32]);

impl Secret {
    pub fn new(bytes: [u8; 32]) -> Self {
        Secret(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != 32 {
            return Err(eyre!("secret must be 32 bytes, got {}", slice.len()));
        }
        let mut inner = [0u8; 32];
        inner.copy_from_slice(slice);
        Ok(Secret(inner))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Secret(bytes32_from_hex(s)?))
    }

    pub fn to_hex(&self) -> String {
        bytes32_to_hex(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// SHA-256 digest of a preimage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hashlock(pub [u8; 32]);

impl Hashlock {
    /// Compute the hashlock for a secret.
    pub fn of(secret: &Secret) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Hashlock(out)
    }

    /// Hash an arbitrary byte slice; rejects anything but 32 bytes.
    pub fn hash(input: &[u8]) -> Result<Self> {
        if input.len() != 32 {
            return Err(eyre!("preimage must be 32 bytes, got {}", input.len()));
        }
        let digest = Sha256::digest(input);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Ok(Hashlock(out))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Hashlock(bytes32_from_hex(s)?))
    }

    pub fn to_hex(&self) -> String {
        bytes32_to_hex(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Hashlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Generate a fresh preimage from the platform CSPRNG.
pub fn generate() -> Secret {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    Secret(bytes)
}

/// Verify that `secret` is the preimage of `hashlock`.
///
/// The digest comparison is constant-time.
pub fn verify(secret: &Secret, hashlock: &Hashlock) -> bool {
    let computed = Hashlock::of(secret);
    computed.0.ct_eq(&hashlock.0).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_random() {
        let a = generate();
        let b = generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_hashlock_deterministic() {
        let secret = Secret::new([0xABu8; 32]);
        assert_eq!(Hashlock::of(&secret), Hashlock::of(&secret));
    }

    #[test]
    fn test_verify_valid() {
        let secret = generate();
        let hashlock = Hashlock::of(&secret);
        assert!(verify(&secret, &hashlock));
    }

    #[test]
    fn test_verify_invalid() {
        let secret = Secret::new([0xABu8; 32]);
        assert!(!verify(&secret, &Hashlock([0xCDu8; 32])));
    }

    #[test]
    fn test_verify_known_vector() {
        // SHA-256 of 32 zero bytes.
        let secret = Secret::new([0u8; 32]);
        let expected =
            Hashlock::from_hex("66687aadf862bd776c8fc18b8e9f8e20089714856ee233b3902a591d0d5f2925")
                .unwrap();
        assert!(verify(&secret, &expected));
    }

    #[test]
    fn test_verify_does_not_short_circuit() {
        // Dual probes: a hashlock differing in the first byte and one
        // differing in the last byte both fail. The comparison runs over the
        // full digest either way (subtle::ConstantTimeEq).
        let secret = Secret::new([0x11u8; 32]);
        let good = Hashlock::of(&secret);

        let mut early = good.0;
        early[0] ^= 0xFF;
        let mut late = good.0;
        late[31] ^= 0xFF;

        assert!(!verify(&secret, &Hashlock(early)));
        assert!(!verify(&secret, &Hashlock(late)));
        assert!(verify(&secret, &good));
    }

    #[test]
    fn test_hash_rejects_wrong_length() {
        assert!(Hashlock::hash(&[0u8; 16]).is_err());
        assert!(Hashlock::hash(&[0u8; 33]).is_err());
        assert!(Hashlock::hash(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_secret_debug_hides_value() {
        let secret = Secret::new([0xABu8; 32]);
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("ab"));
        assert!(!rendered.contains("AB"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn test_secret_hex_roundtrip() {
        let secret = generate();
        let hex = secret.to_hex();
        assert_eq!(Secret::from_hex(&hex).unwrap(), secret);
    }
}
