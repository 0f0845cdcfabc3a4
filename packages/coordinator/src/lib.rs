//! Swap coordinator library.
//!
//! The binary in `main.rs` is a thin CLI over these modules; integration
//! tests drive the engine directly through the mock chain adapters.

pub mod cli;
pub mod config;
pub mod engine;
pub mod events;
pub mod liquidity;
pub mod recovery;
pub mod registry;
pub mod types;

pub use config::Config;
pub use engine::SwapEngine;
pub use liquidity::LiquidityLedger;
pub use recovery::RecoveryDriver;
pub use registry::SwapRegistry;
pub use types::{SwapError, SwapRecord, SwapRequest, SwapState, SwapStats, SwapStatus};
