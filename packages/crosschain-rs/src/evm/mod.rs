//! EVM chain support: HTLC factory bindings, the adapter, and the log
//! watcher that surfaces revealed preimages.

pub mod client;
pub mod contracts;
pub mod watcher;

pub use client::{EvmAdapterConfig, EvmHtlcAdapter};
pub use watcher::EvmWatcher;
