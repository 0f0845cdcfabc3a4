//! Test doubles for the chain adapter contract.
//!
//! Only compiled with the `testing` feature. The mock keeps full HTLC
//! semantics (hashlock verification, timelock windows, terminal flags)
//! against an injectable clock so lifecycle tests run without a chain and
//! without sleeping.

pub mod mock;

pub use mock::MockChainAdapter;
