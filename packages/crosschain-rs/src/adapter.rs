//! The uniform chain adapter contract.
//!
//! The engine drives both chains through this one trait and never branches
//! on chain identity except to pick which adapter instance to call.

use alloy::primitives::{B256, U256};
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use tokio::sync::broadcast;

use crate::error::AdapterError;
use crate::secret::{Hashlock, Secret};
use crate::timelock::TimelockSchedule;
use crate::types::{ChainTag, TxRef};

/// Parameters for creating an HTLC on either chain.
///
/// Addresses are chain-neutral strings; each adapter parses its own format
/// and rejects the rest with `InvalidSender`/`InvalidReceiver`.
#[derive(Debug, Clone)]
pub struct HtlcParams {
    pub sender: String,
    pub receiver: String,
    pub token: String,
    pub amount: U256,
    pub hashlock: Hashlock,
    pub timelocks: TimelockSchedule,
}

/// Opaque reference to a deployed HTLC instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    Evm(EvmHandle),
    Solana(SolanaHandle),
}

/// A contract entry in the EVM HTLC factory, keyed by its bytes32 id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EvmHandle {
    pub id: B256,
}

/// The escrow account (program-derived) holding a swap on Solana.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SolanaHandle {
    pub escrow: Pubkey,
}

impl Handle {
    pub fn chain(&self) -> ChainTag {
        match self {
            Handle::Evm(_) => ChainTag::Evm,
            Handle::Solana(_) => ChainTag::Solana,
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Evm(h) => write!(f, "evm:{}", h.id),
            Handle::Solana(h) => write!(f, "solana:{}", h.escrow),
        }
    }
}

/// Current on-chain state of one HTLC.
#[derive(Debug, Clone)]
pub struct HtlcState {
    pub exists: bool,
    pub withdrawn: bool,
    pub refunded: bool,
    pub hashlock: Hashlock,
    pub amount: U256,
    pub cancellation_deadline: u64,
}

/// Lifecycle events emitted by an adapter's watcher.
#[derive(Debug, Clone)]
pub enum HtlcEvent {
    Created {
        handle: Handle,
        tx: TxRef,
    },
    /// A withdrawal was observed; the preimage is recovered from the
    /// chain's event data.
    Withdrawn {
        handle: Handle,
        preimage: Secret,
        tx: TxRef,
    },
    Refunded {
        handle: Handle,
        tx: TxRef,
    },
}

impl HtlcEvent {
    pub fn handle(&self) -> &Handle {
        match self {
            HtlcEvent::Created { handle, .. }
            | HtlcEvent::Withdrawn { handle, .. }
            | HtlcEvent::Refunded { handle, .. } => handle,
        }
    }
}

/// Uniform operations over one chain's HTLC protocol.
///
/// Transport concerns (RPC retry with exponential backoff + jitter, the
/// enclosing 30-second call deadline) live inside implementations; callers
/// observe only the domain outcomes in [`AdapterError`].
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> ChainTag;

    /// The coordinator's own address on this chain, used as the receiver of
    /// source-side HTLCs and the funder of destination-side ones.
    fn own_address(&self) -> String;

    /// Deploy and fund an HTLC. Fails with `InvalidTimelock` when the
    /// cancellation deadline is not in the future.
    async fn create_htlc(&self, params: &HtlcParams) -> Result<(Handle, TxRef), AdapterError>;

    /// Claim the locked funds by revealing the preimage.
    async fn withdraw(&self, handle: &Handle, secret: &Secret) -> Result<TxRef, AdapterError>;

    /// Reclaim the locked funds after the cancellation deadline.
    async fn refund(&self, handle: &Handle) -> Result<TxRef, AdapterError>;

    /// Non-mutating probe: would `withdraw` succeed right now?
    async fn can_withdraw(&self, handle: &Handle, secret: &Secret) -> Result<bool, AdapterError>;

    /// Non-mutating probe: would `refund` succeed right now?
    async fn can_refund(&self, handle: &Handle) -> Result<bool, AdapterError>;

    /// Current on-chain snapshot of the contract.
    async fn info(&self, handle: &Handle) -> Result<HtlcState, AdapterError>;

    /// Subscribe to the adapter's event stream. Dropping the receiver
    /// unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<HtlcEvent>;

    /// The coordinator's own token balance on this chain.
    async fn balance(&self) -> Result<U256, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_chain_and_display() {
        let evm = Handle::Evm(EvmHandle { id: B256::ZERO });
        assert_eq!(evm.chain(), ChainTag::Evm);
        assert!(evm.to_string().starts_with("evm:"));

        let sol = Handle::Solana(SolanaHandle {
            escrow: Pubkey::new_unique(),
        });
        assert_eq!(sol.chain(), ChainTag::Solana);
        assert!(sol.to_string().starts_with("solana:"));
    }
}
