//! Domain model: swap records, states, statuses, and errors.

use alloy::primitives::U256;
use crosschain_rs::{AdapterError, ChainTag, Handle, Hashlock, Secret, SwapId, TimelockSchedule};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle state of a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapState {
    Pending,
    SourceLocked,
    DestinationLocked,
    Withdrawing,
    Completed,
    Refunding,
    Refunded,
    Failed,
}

impl SwapState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapState::Pending => "pending",
            SwapState::SourceLocked => "source_locked",
            SwapState::DestinationLocked => "destination_locked",
            SwapState::Withdrawing => "withdrawing",
            SwapState::Completed => "completed",
            SwapState::Refunding => "refunding",
            SwapState::Refunded => "refunded",
            SwapState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SwapState::Completed | SwapState::Refunded | SwapState::Failed
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Legal transitions of the lifecycle state machine. Terminal states
    /// have no successors.
    pub fn can_transition_to(&self, next: SwapState) -> bool {
        use SwapState::*;
        match (self, next) {
            (Pending, SourceLocked) => true,
            (SourceLocked, DestinationLocked) => true,
            (DestinationLocked, Withdrawing) => true,
            (Withdrawing, Completed) => true,
            // Deadline C reached without completion.
            (SourceLocked | DestinationLocked | Withdrawing, Refunding) => true,
            (Refunding, Refunded) => true,
            // Any active state can fail on an unrecoverable error.
            (s, Failed) if s.is_active() => true,
            _ => false,
        }
    }
}

impl fmt::Display for SwapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An incoming swap request.
#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub source: ChainTag,
    pub destination: ChainTag,
    pub amount: U256,
    /// Sender address on the source chain.
    pub sender: String,
    /// Receiver address on the destination chain.
    pub receiver: String,
    /// Caller-supplied preimage; takes precedence over generation.
    pub secret: Option<Secret>,
    /// Caller-supplied hashlock; must equal SHA-256 of the secret.
    pub hashlock: Option<Hashlock>,
}

impl SwapRequest {
    /// The request with preimage material stripped, as stored for retries.
    pub fn without_secret(&self) -> Self {
        Self {
            secret: None,
            hashlock: None,
            ..self.clone()
        }
    }
}

/// On-chain HTLC reference kept per side of a swap.
#[derive(Debug, Clone)]
pub struct HtlcSide {
    pub handle: Handle,
    pub tx_id: String,
    pub block: u64,
    withdrawn: bool,
    refunded: bool,
    pub created_at_ms: u64,
}

impl HtlcSide {
    pub fn new(handle: Handle, tx_id: String, block: u64, created_at_ms: u64) -> Self {
        Self {
            handle,
            tx_id,
            block,
            withdrawn: false,
            refunded: false,
            created_at_ms,
        }
    }

    pub fn withdrawn(&self) -> bool {
        self.withdrawn
    }

    pub fn refunded(&self) -> bool {
        self.refunded
    }

    /// Flags are mutually exclusive; marking a refunded side withdrawn is a
    /// consistency violation.
    pub fn mark_withdrawn(&mut self) -> Result<(), SwapError> {
        if self.refunded {
            return Err(SwapError::Monitoring(format!(
                "handle {} already refunded, cannot mark withdrawn",
                self.handle
            )));
        }
        self.withdrawn = true;
        Ok(())
    }

    pub fn mark_refunded(&mut self) -> Result<(), SwapError> {
        if self.withdrawn {
            return Err(SwapError::Monitoring(format!(
                "handle {} already withdrawn, cannot mark refunded",
                self.handle
            )));
        }
        self.refunded = true;
        Ok(())
    }
}

/// The registry's record of one swap.
#[derive(Debug, Clone)]
pub struct SwapRecord {
    pub id: SwapId,
    pub request: SwapRequest,
    pub hashlock: Hashlock,
    /// Held until the swap reaches a terminal state; never logged.
    pub secret: Option<Secret>,
    pub state: SwapState,
    pub source_htlc: Option<HtlcSide>,
    pub destination_htlc: Option<HtlcSide>,
    pub timelocks: TimelockSchedule,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub error: Option<String>,
    pub retry_count: u32,
    pub estimated_completion_ms: u64,
}

impl SwapRecord {
    pub fn new(
        id: SwapId,
        request: SwapRequest,
        hashlock: Hashlock,
        secret: Secret,
        timelocks: TimelockSchedule,
        now_ms: u64,
    ) -> Self {
        // The swap should complete shortly after the finality window opens
        // and the coordinator reveals.
        let estimated_completion_ms = timelocks.finality() * 1000 + 30_000;
        Self {
            id,
            request,
            hashlock,
            secret: Some(secret),
            state: SwapState::Pending,
            source_htlc: None,
            destination_htlc: None,
            timelocks,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            error: None,
            retry_count: 0,
            estimated_completion_ms,
        }
    }

    /// Advance `updated_at`, keeping it monotone even if the clock jumps.
    pub fn touch(&mut self, now_ms: u64) {
        self.updated_at_ms = self.updated_at_ms.max(now_ms);
    }

    /// Read-only snapshot safe to hand out (no preimage material).
    pub fn status(&self) -> SwapStatus {
        SwapStatus {
            id: self.id.clone(),
            source: self.request.source,
            destination: self.request.destination,
            amount: self.request.amount.to_string(),
            sender: self.request.sender.clone(),
            receiver: self.request.receiver.clone(),
            state: self.state,
            hashlock: self.hashlock.to_hex(),
            source_htlc: self.source_htlc.as_ref().map(HtlcSideStatus::from),
            destination_htlc: self.destination_htlc.as_ref().map(HtlcSideStatus::from),
            created_at_ms: self.created_at_ms,
            updated_at_ms: self.updated_at_ms,
            error: self.error.clone(),
            retry_count: self.retry_count,
            estimated_completion_ms: self.estimated_completion_ms,
        }
    }
}

/// Serializable view of one HTLC side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtlcSideStatus {
    pub handle: String,
    pub tx_id: String,
    pub block: u64,
    pub withdrawn: bool,
    pub refunded: bool,
    pub created_at_ms: u64,
}

impl From<&HtlcSide> for HtlcSideStatus {
    fn from(side: &HtlcSide) -> Self {
        Self {
            handle: side.handle.to_string(),
            tx_id: side.tx_id.clone(),
            block: side.block,
            withdrawn: side.withdrawn(),
            refunded: side.refunded(),
            created_at_ms: side.created_at_ms,
        }
    }
}

/// Serializable view of a swap, returned by every query operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapStatus {
    pub id: SwapId,
    pub source: ChainTag,
    pub destination: ChainTag,
    pub amount: String,
    pub sender: String,
    pub receiver: String,
    pub state: SwapState,
    pub hashlock: String,
    pub source_htlc: Option<HtlcSideStatus>,
    pub destination_htlc: Option<HtlcSideStatus>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    pub error: Option<String>,
    pub retry_count: u32,
    pub estimated_completion_ms: u64,
}

/// Aggregate swap statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapStats {
    pub total_swaps: usize,
    pub active_swaps: usize,
    pub completed_swaps: usize,
    pub refunded_swaps: usize,
    pub failed_swaps: usize,
    /// Sum of completed amounts, smallest token unit.
    pub total_volume: String,
    /// Average wall-clock duration of completed swaps, seconds.
    pub average_completion_secs: f64,
    /// completed / (completed + refunded + failed) * 100.
    pub success_rate: f64,
}

/// Domain errors surfaced by the coordinator.
#[derive(Debug, Clone, Error)]
pub enum SwapError {
    #[error("coordinator is not initialized")]
    NotInitialized,

    #[error("coordinator is already initialized")]
    AlreadyInitialized,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("amount {amount} is below the minimum {min}")]
    AmountTooLow { amount: U256, min: U256 },

    #[error("amount {amount} is above the maximum {max}")]
    AmountTooHigh { amount: U256, max: U256 },

    #[error("swap direction {0} is not supported")]
    ChainNotSupported(String),

    #[error("active swap limit of {limit} reached")]
    MaxSwapsReached { limit: usize },

    #[error("insufficient {chain} liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity {
        chain: ChainTag,
        requested: U256,
        available: U256,
    },

    #[error("swap {0} not found")]
    SwapNotFound(SwapId),

    #[error("swap {swap_id} in state {state} does not permit {operation}")]
    InvalidState {
        swap_id: SwapId,
        state: SwapState,
        operation: &'static str,
    },

    #[error("HTLC creation failed for swap {swap_id}: {source}")]
    HtlcCreationFailed {
        swap_id: SwapId,
        source: AdapterError,
    },

    #[error("withdrawal failed for swap {swap_id}: {source}")]
    WithdrawalFailed {
        swap_id: SwapId,
        source: AdapterError,
    },

    #[error("refund failed for swap {swap_id}: {source}")]
    RefundFailed {
        swap_id: SwapId,
        source: AdapterError,
    },

    #[error("monitoring error: {0}")]
    Monitoring(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;
    use crosschain_rs::EvmHandle;

    #[test]
    fn test_terminal_states() {
        assert!(SwapState::Completed.is_terminal());
        assert!(SwapState::Refunded.is_terminal());
        assert!(SwapState::Failed.is_terminal());
        assert!(SwapState::Pending.is_active());
        assert!(SwapState::Refunding.is_active());
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(SwapState::Pending.can_transition_to(SwapState::SourceLocked));
        assert!(SwapState::SourceLocked.can_transition_to(SwapState::DestinationLocked));
        assert!(SwapState::DestinationLocked.can_transition_to(SwapState::Withdrawing));
        assert!(SwapState::Withdrawing.can_transition_to(SwapState::Completed));
    }

    #[test]
    fn test_refund_transitions() {
        assert!(SwapState::SourceLocked.can_transition_to(SwapState::Refunding));
        assert!(SwapState::DestinationLocked.can_transition_to(SwapState::Refunding));
        assert!(SwapState::Withdrawing.can_transition_to(SwapState::Refunding));
        assert!(SwapState::Refunding.can_transition_to(SwapState::Refunded));
        assert!(!SwapState::Pending.can_transition_to(SwapState::Refunding));
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        assert!(!SwapState::Completed.can_transition_to(SwapState::Refunding));
        assert!(!SwapState::Completed.can_transition_to(SwapState::Failed));
        assert!(!SwapState::Refunded.can_transition_to(SwapState::Pending));
        assert!(!SwapState::Failed.can_transition_to(SwapState::SourceLocked));
        assert!(!SwapState::Pending.can_transition_to(SwapState::DestinationLocked));
        assert!(!SwapState::Pending.can_transition_to(SwapState::Completed));
    }

    #[test]
    fn test_any_active_can_fail() {
        for state in [
            SwapState::Pending,
            SwapState::SourceLocked,
            SwapState::DestinationLocked,
            SwapState::Withdrawing,
            SwapState::Refunding,
        ] {
            assert!(state.can_transition_to(SwapState::Failed), "{}", state);
        }
    }

    #[test]
    fn test_htlc_side_flags_mutually_exclusive() {
        let handle = Handle::Evm(EvmHandle { id: B256::ZERO });
        let mut side = HtlcSide::new(handle, "tx".into(), 1, 0);

        side.mark_withdrawn().unwrap();
        assert!(side.withdrawn());
        assert!(side.mark_refunded().is_err());
        assert!(!side.refunded());

        let mut side = HtlcSide::new(handle, "tx".into(), 1, 0);
        side.mark_refunded().unwrap();
        assert!(side.mark_withdrawn().is_err());
    }

    #[test]
    fn test_touch_is_monotone() {
        let secret = crosschain_rs::secret::generate();
        let hashlock = Hashlock::of(&secret);
        let request = SwapRequest {
            source: ChainTag::Evm,
            destination: ChainTag::Solana,
            amount: U256::from(1u64),
            sender: "a".into(),
            receiver: "b".into(),
            secret: None,
            hashlock: None,
        };
        let timelocks = TimelockSchedule::starting_at(1000, &Default::default());
        let mut record = SwapRecord::new(
            SwapId::from("s-1"),
            request,
            hashlock,
            secret,
            timelocks,
            5000,
        );

        record.touch(6000);
        assert_eq!(record.updated_at_ms, 6000);
        // A clock regression never rolls the timestamp back.
        record.touch(4000);
        assert_eq!(record.updated_at_ms, 6000);
        assert!(record.updated_at_ms >= record.created_at_ms);
    }

    #[test]
    fn test_status_omits_secret() {
        let secret = crosschain_rs::secret::generate();
        let hashlock = Hashlock::of(&secret);
        let request = SwapRequest {
            source: ChainTag::Evm,
            destination: ChainTag::Solana,
            amount: U256::from(42u64),
            sender: "a".into(),
            receiver: "b".into(),
            secret: None,
            hashlock: None,
        };
        let timelocks = TimelockSchedule::starting_at(1000, &Default::default());
        let record = SwapRecord::new(
            SwapId::from("s-2"),
            request,
            hashlock,
            secret.clone(),
            timelocks,
            0,
        );

        let json = serde_json::to_string(&record.status()).unwrap();
        let secret_hex = secret.to_hex();
        assert!(!json.contains(secret_hex.trim_start_matches("0x")));
        assert!(json.contains("pending"));
    }
}
