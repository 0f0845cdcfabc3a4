//! Per-chain liquidity ledger with atomic check-and-lock admission.
//!
//! The ledger owns every lock. The engine asks for locks and releases but
//! never mutates ledger internals. `available = max(0, balance - locked)`.

use alloy::primitives::U256;
use crosschain_rs::{ChainAdapter, ChainTag, Clock, SwapId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::types::SwapError;

/// One recorded lock.
#[derive(Debug, Clone)]
pub struct LiquidityLock {
    pub chain: ChainTag,
    pub amount: U256,
    pub locked_at_ms: u64,
}

#[derive(Debug, Default, Clone)]
struct ChainLiquidity {
    token: String,
    balance: U256,
    locked: U256,
    locks: HashMap<SwapId, Vec<LiquidityLock>>,
}

/// Serializable liquidity snapshot for one chain.
#[derive(Debug, Clone, Serialize)]
pub struct LiquidityStatus {
    pub chain: ChainTag,
    pub token: String,
    pub balance: String,
    pub locked: String,
    pub available: String,
    pub active_swaps: usize,
}

pub struct LiquidityLedger {
    clock: Arc<dyn Clock>,
    chains: Mutex<HashMap<ChainTag, ChainLiquidity>>,
}

impl LiquidityLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            chains: Mutex::new(HashMap::new()),
        }
    }

    /// Register a chain with its token identifier and starting balance.
    pub fn register_chain(&self, chain: ChainTag, token: impl Into<String>, balance: U256) {
        let mut chains = self.chains.lock().unwrap();
        let entry = chains.entry(chain).or_default();
        entry.token = token.into();
        entry.balance = balance;
    }

    pub fn has_available(&self, chain: ChainTag, amount: U256) -> bool {
        let chains = self.chains.lock().unwrap();
        match chains.get(&chain) {
            Some(c) => c.balance.saturating_sub(c.locked) >= amount,
            None => false,
        }
    }

    /// Atomic check-and-acquire: the availability check and the lock happen
    /// in one critical section so concurrent initiations cannot both pass.
    pub fn lock(&self, chain: ChainTag, amount: U256, swap_id: &SwapId) -> bool {
        let now_ms = self.clock.now_millis();
        let mut chains = self.chains.lock().unwrap();
        let entry = match chains.get_mut(&chain) {
            Some(entry) => entry,
            None => return false,
        };
        if entry.balance.saturating_sub(entry.locked) < amount {
            return false;
        }
        entry.locked += amount;
        entry.locks.entry(swap_id.clone()).or_default().push(LiquidityLock {
            chain,
            amount,
            locked_at_ms: now_ms,
        });
        debug!(swap_id = %swap_id, chain = %chain, amount = %amount, "Liquidity locked");
        true
    }

    /// Release every lock this swap holds on `chain`. Idempotent: a second
    /// release for the same pair is a no-op.
    pub fn release(&self, chain: ChainTag, swap_id: &SwapId) {
        let mut chains = self.chains.lock().unwrap();
        if let Some(entry) = chains.get_mut(&chain) {
            if let Some(locks) = entry.locks.remove(swap_id) {
                let total: U256 = locks.iter().map(|l| l.amount).fold(U256::ZERO, |a, b| a + b);
                entry.locked = entry.locked.saturating_sub(total);
                debug!(swap_id = %swap_id, chain = %chain, amount = %total, "Liquidity released");
            }
        }
    }

    /// Release this swap's locks on every chain.
    pub fn release_all(&self, swap_id: &SwapId) {
        let chains: Vec<ChainTag> = {
            let guard = self.chains.lock().unwrap();
            guard
                .iter()
                .filter(|(_, c)| c.locks.contains_key(swap_id))
                .map(|(tag, _)| *tag)
                .collect()
        };
        for chain in chains {
            self.release(chain, swap_id);
        }
    }

    pub fn status(&self, chain: ChainTag) -> Result<LiquidityStatus, SwapError> {
        let chains = self.chains.lock().unwrap();
        let entry = chains
            .get(&chain)
            .ok_or_else(|| SwapError::ChainNotSupported(chain.to_string()))?;
        Ok(LiquidityStatus {
            chain,
            token: entry.token.clone(),
            balance: entry.balance.to_string(),
            locked: entry.locked.to_string(),
            available: entry.balance.saturating_sub(entry.locked).to_string(),
            active_swaps: entry.locks.len(),
        })
    }

    /// Credit the chain's balance (the `fund` command).
    pub fn deposit(&self, chain: ChainTag, amount: U256) {
        let mut chains = self.chains.lock().unwrap();
        let entry = chains.entry(chain).or_default();
        entry.balance += amount;
        info!(chain = %chain, amount = %amount, balance = %entry.balance, "Liquidity deposited");
    }

    /// Refresh the chain's balance from its adapter.
    pub async fn refresh_balance(
        &self,
        chain: ChainTag,
        adapter: &dyn ChainAdapter,
    ) -> Result<U256, SwapError> {
        let balance = adapter
            .balance()
            .await
            .map_err(|e| SwapError::Monitoring(format!("balance query failed: {}", e)))?;
        let mut chains = self.chains.lock().unwrap();
        let entry = chains.entry(chain).or_default();
        entry.balance = balance;
        Ok(balance)
    }

    /// Sum of locked amounts on one chain, for invariant checks.
    pub fn locked_total(&self, chain: ChainTag) -> U256 {
        let chains = self.chains.lock().unwrap();
        chains.get(&chain).map(|c| c.locked).unwrap_or(U256::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosschain_rs::ManualClock;

    fn ledger() -> LiquidityLedger {
        let ledger = LiquidityLedger::new(ManualClock::new(1000));
        ledger.register_chain(ChainTag::Evm, "0xToken", U256::from(10_000_000u64));
        ledger.register_chain(ChainTag::Solana, "Mint111", U256::from(10_000_000u64));
        ledger
    }

    #[test]
    fn test_atomic_check_and_lock() {
        let ledger = ledger();
        let id = SwapId::from("s-1");

        assert!(ledger.has_available(ChainTag::Evm, U256::from(4_000_000u64)));
        assert!(ledger.lock(ChainTag::Evm, U256::from(4_000_000u64), &id));
        assert!(ledger.lock(ChainTag::Evm, U256::from(4_000_000u64), &SwapId::from("s-2")));
        // 8M of 10M locked; a third 4M lock must fail.
        assert!(!ledger.lock(ChainTag::Evm, U256::from(4_000_000u64), &SwapId::from("s-3")));
        assert!(!ledger.has_available(ChainTag::Evm, U256::from(4_000_000u64)));
    }

    #[test]
    fn test_release_is_idempotent() {
        let ledger = ledger();
        let id = SwapId::from("s-1");
        ledger.lock(ChainTag::Evm, U256::from(1_000_000u64), &id);
        assert_eq!(ledger.locked_total(ChainTag::Evm), U256::from(1_000_000u64));

        ledger.release(ChainTag::Evm, &id);
        assert_eq!(ledger.locked_total(ChainTag::Evm), U256::ZERO);

        // Second release must not underflow or double-credit.
        ledger.release(ChainTag::Evm, &id);
        assert_eq!(ledger.locked_total(ChainTag::Evm), U256::ZERO);
    }

    #[test]
    fn test_locked_never_exceeds_balance() {
        let ledger = ledger();
        for i in 0..20 {
            let id = SwapId(format!("s-{}", i));
            ledger.lock(ChainTag::Evm, U256::from(900_000u64), &id);
            assert!(ledger.locked_total(ChainTag::Evm) <= U256::from(10_000_000u64));
        }
    }

    #[test]
    fn test_status_reports_available() {
        let ledger = ledger();
        ledger.lock(ChainTag::Evm, U256::from(3_000_000u64), &SwapId::from("s-1"));

        let status = ledger.status(ChainTag::Evm).unwrap();
        assert_eq!(status.balance, "10000000");
        assert_eq!(status.locked, "3000000");
        assert_eq!(status.available, "7000000");
        assert_eq!(status.active_swaps, 1);
        assert_eq!(status.token, "0xToken");
    }

    #[test]
    fn test_unknown_chain() {
        let ledger = LiquidityLedger::new(ManualClock::new(1000));
        assert!(!ledger.has_available(ChainTag::Evm, U256::from(1u64)));
        assert!(!ledger.lock(ChainTag::Evm, U256::from(1u64), &SwapId::from("s-1")));
        assert!(ledger.status(ChainTag::Evm).is_err());
    }

    #[test]
    fn test_deposit_credits_balance() {
        let ledger = ledger();
        ledger.deposit(ChainTag::Solana, U256::from(5_000_000u64));
        let status = ledger.status(ChainTag::Solana).unwrap();
        assert_eq!(status.balance, "15000000");
    }

    #[test]
    fn test_release_all_spans_chains() {
        let ledger = ledger();
        let id = SwapId::from("s-1");
        ledger.lock(ChainTag::Evm, U256::from(1_000_000u64), &id);
        ledger.lock(ChainTag::Solana, U256::from(2_000_000u64), &id);

        ledger.release_all(&id);
        assert_eq!(ledger.locked_total(ChainTag::Evm), U256::ZERO);
        assert_eq!(ledger.locked_total(ChainTag::Solana), U256::ZERO);
    }
}
