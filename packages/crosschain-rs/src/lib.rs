//! Crosschain-RS: shared chain library for the HTLC swap coordinator.
//!
//! This crate provides everything the coordinator needs to talk to both
//! chains through one contract:
//!
//! - **Types** - chain tags, swap ids, transaction references, hex codecs
//! - **Secret** - preimage generation, SHA-256 hashlocks, constant-time verify
//! - **Timelock** - the four-phase deadline schedule every HTLC carries
//! - **Adapter** - the uniform `create / withdraw / refund / observe` trait
//! - **EVM Module** - HTLC factory bindings, adapter, log watcher
//! - **Solana Module** - HTLC program wire formats, adapter, account poller
//! - **Testing Module** - deterministic mock adapter for lifecycle tests
//!
//! ## Feature Flags
//!
//! - `evm` - EVM chain support (default)
//! - `solana` - Solana chain support (default)
//! - `testing` - mock adapter for tests
//! - `full` - everything

// Core modules (always available)
pub mod adapter;
pub mod clock;
pub mod error;
pub mod redact;
pub mod retry;
pub mod secret;
pub mod timelock;
pub mod types;

// Chain-specific modules (feature-gated)
#[cfg(feature = "evm")]
pub mod evm;

#[cfg(feature = "solana")]
pub mod solana;

// Testing utilities (feature-gated)
#[cfg(feature = "testing")]
pub mod testing;

// Re-export commonly used items at the crate root
pub use adapter::{
    ChainAdapter, EvmHandle, Handle, HtlcEvent, HtlcParams, HtlcState, SolanaHandle,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AdapterError;
pub use redact::Redacted;
pub use secret::{Hashlock, Secret};
pub use timelock::{Phase, TimelockDurations, TimelockSchedule};
pub use types::{
    bytes32_from_hex, bytes32_to_hex, bytes_from_hex, bytes_to_hex, ChainTag, SwapId, TxRef,
};
