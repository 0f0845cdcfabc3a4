//! Solana chain support: HTLC program wire formats, the adapter, and the
//! account poller that surfaces revealed preimages.

pub mod client;
pub mod program;
pub mod watcher;

pub use client::{SolanaAdapterConfig, SolanaHtlcAdapter};
pub use watcher::SolanaWatcher;
