//! Error taxonomy for chain adapters.

use thiserror::Error;

/// Failures surfaced by a [`crate::adapter::ChainAdapter`].
///
/// Domain outcomes (`InvalidSecret`, `AlreadyWithdrawn`, ...) are terminal
/// for the attempted operation; `Timeout` and `Transport` are transient and
/// eligible for retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("cancellation deadline is not in the future")]
    InvalidTimelock,

    #[error("invalid sender address: {0}")]
    InvalidSender(String),

    #[error("invalid receiver address: {0}")]
    InvalidReceiver(String),

    #[error("preimage does not match the on-chain hashlock")]
    InvalidSecret,

    #[error("insufficient balance to fund the contract")]
    InsufficientBalance,

    #[error("contract already withdrawn")]
    AlreadyWithdrawn,

    #[error("contract already refunded")]
    AlreadyRefunded,

    #[error("withdrawal window is closed")]
    WindowClosed,

    #[error("cancellation deadline has not passed")]
    TimelockNotExpired,

    #[error("no contract found for handle {0}")]
    HtlcNotFound(String),

    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl AdapterError {
    /// Whether a retry of the same call can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Timeout(_) | AdapterError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AdapterError::Timeout(30).is_transient());
        assert!(AdapterError::Transport("connection refused".into()).is_transient());
        assert!(!AdapterError::InvalidSecret.is_transient());
        assert!(!AdapterError::AlreadyWithdrawn.is_transient());
        assert!(!AdapterError::TimelockNotExpired.is_transient());
    }
}
