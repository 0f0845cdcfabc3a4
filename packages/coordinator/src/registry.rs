//! Process-local swap registry.
//!
//! Owns every swap record for its whole life. Lock discipline: the record
//! map is guarded by a std `RwLock` held only for in-memory reads/writes
//! (never across I/O); lifecycle transitions additionally serialize through
//! a per-swap async mutex so no two transitions of one swap ever overlap.

use crosschain_rs::{Clock, Handle, SwapId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;

use crate::types::{SwapError, SwapRecord, SwapState, SwapStatus};

pub struct SwapRegistry {
    clock: Arc<dyn Clock>,
    swaps: RwLock<HashMap<SwapId, SwapRecord>>,
    guards: StdMutex<HashMap<SwapId, Arc<AsyncMutex<()>>>>,
    handles: RwLock<HashMap<Handle, SwapId>>,
}

impl SwapRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            swaps: RwLock::new(HashMap::new()),
            guards: StdMutex::new(HashMap::new()),
            handles: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, record: SwapRecord) -> Result<(), SwapError> {
        let mut swaps = self.swaps.write().unwrap();
        if swaps.contains_key(&record.id) {
            return Err(SwapError::InvalidConfig(format!(
                "swap id {} already exists",
                record.id
            )));
        }
        swaps.insert(record.id.clone(), record);
        Ok(())
    }

    /// Snapshot of one record.
    pub fn get(&self, id: &SwapId) -> Option<SwapRecord> {
        self.swaps.read().unwrap().get(id).cloned()
    }

    /// Remove a record outright. Only used to unwind an admission that
    /// lost the lock race after insertion; settled swaps stay as history.
    pub fn remove(&self, id: &SwapId) -> Option<SwapRecord> {
        self.guards.lock().unwrap().remove(id);
        self.swaps.write().unwrap().remove(id)
    }

    pub fn status(&self, id: &SwapId) -> Result<SwapStatus, SwapError> {
        self.get(id)
            .map(|r| r.status())
            .ok_or_else(|| SwapError::SwapNotFound(id.clone()))
    }

    /// Mutate one record under the write lock. `updated_at` advances
    /// monotonically on every successful mutation.
    pub fn update<T>(
        &self,
        id: &SwapId,
        f: impl FnOnce(&mut SwapRecord) -> Result<T, SwapError>,
    ) -> Result<T, SwapError> {
        let now_ms = self.clock.now_millis();
        let mut swaps = self.swaps.write().unwrap();
        let record = swaps
            .get_mut(id)
            .ok_or_else(|| SwapError::SwapNotFound(id.clone()))?;
        let out = f(record)?;
        record.touch(now_ms);
        Ok(out)
    }

    /// Validated state transition. Illegal transitions are rejected and the
    /// record is left untouched.
    pub fn transition(&self, id: &SwapId, to: SwapState) -> Result<SwapState, SwapError> {
        self.update(id, |record| {
            if !record.state.can_transition_to(to) {
                return Err(SwapError::InvalidState {
                    swap_id: record.id.clone(),
                    state: record.state,
                    operation: to.as_str(),
                });
            }
            record.state = to;
            if to.is_terminal() {
                // Terminal records are frozen; the preimage is no longer
                // needed and must not outlive the swap.
                record.secret = None;
            }
            Ok(to)
        })
    }

    /// Per-swap serialization guard. Hold the guard across a transition's
    /// full read-decide-write-I/O sequence.
    pub fn guard(&self, id: &SwapId) -> Arc<AsyncMutex<()>> {
        let mut guards = self.guards.lock().unwrap();
        guards
            .entry(id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub fn index_handle(&self, handle: Handle, id: SwapId) {
        self.handles.write().unwrap().insert(handle, id);
    }

    pub fn swap_for_handle(&self, handle: &Handle) -> Option<SwapId> {
        self.handles.read().unwrap().get(handle).cloned()
    }

    pub fn active(&self) -> Vec<SwapRecord> {
        self.swaps
            .read()
            .unwrap()
            .values()
            .filter(|r| r.state.is_active())
            .cloned()
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.swaps
            .read()
            .unwrap()
            .values()
            .filter(|r| r.state.is_active())
            .count()
    }

    pub fn all(&self) -> Vec<SwapRecord> {
        self.swaps.read().unwrap().values().cloned().collect()
    }

    /// Paged history, newest first.
    pub fn history(&self, limit: usize, offset: usize) -> Vec<SwapStatus> {
        let mut records: Vec<SwapRecord> = self.all();
        records.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        records
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| r.status())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SwapRequest;
    use alloy::primitives::U256;
    use crosschain_rs::{ChainTag, Hashlock, ManualClock, TimelockSchedule};

    fn record(id: &str, clock: &ManualClock) -> SwapRecord {
        let secret = crosschain_rs::secret::generate();
        let hashlock = Hashlock::of(&secret);
        SwapRecord::new(
            SwapId::from(id),
            SwapRequest {
                source: ChainTag::Evm,
                destination: ChainTag::Solana,
                amount: U256::from(1_000_000u64),
                sender: "a".into(),
                receiver: "b".into(),
                secret: None,
                hashlock: None,
            },
            hashlock,
            secret,
            TimelockSchedule::starting_at(clock.now_unix(), &Default::default()),
            clock.now_millis(),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let clock = ManualClock::new(1000);
        let registry = SwapRegistry::new(clock.clone());
        registry.insert(record("s-1", &clock)).unwrap();

        assert!(registry.get(&SwapId::from("s-1")).is_some());
        assert!(registry.get(&SwapId::from("s-2")).is_none());
        assert!(registry.insert(record("s-1", &clock)).is_err());
    }

    #[test]
    fn test_transition_legality() {
        let clock = ManualClock::new(1000);
        let registry = SwapRegistry::new(clock.clone());
        registry.insert(record("s-1", &clock)).unwrap();
        let id = SwapId::from("s-1");

        registry.transition(&id, SwapState::SourceLocked).unwrap();
        // Skipping destination lock is illegal.
        assert!(matches!(
            registry.transition(&id, SwapState::Completed),
            Err(SwapError::InvalidState { .. })
        ));
        registry
            .transition(&id, SwapState::DestinationLocked)
            .unwrap();
        registry.transition(&id, SwapState::Withdrawing).unwrap();
        registry.transition(&id, SwapState::Completed).unwrap();

        // Terminal records reject every further transition.
        assert!(registry.transition(&id, SwapState::Refunding).is_err());
        assert!(registry.transition(&id, SwapState::Failed).is_err());
    }

    #[test]
    fn test_terminal_transition_drops_secret() {
        let clock = ManualClock::new(1000);
        let registry = SwapRegistry::new(clock.clone());
        registry.insert(record("s-1", &clock)).unwrap();
        let id = SwapId::from("s-1");

        assert!(registry.get(&id).unwrap().secret.is_some());
        registry.transition(&id, SwapState::Failed).unwrap();
        assert!(registry.get(&id).unwrap().secret.is_none());
    }

    #[test]
    fn test_updated_at_monotone_across_updates() {
        let clock = ManualClock::new(1000);
        let registry = SwapRegistry::new(clock.clone());
        registry.insert(record("s-1", &clock)).unwrap();
        let id = SwapId::from("s-1");

        clock.advance_secs(5);
        registry.transition(&id, SwapState::SourceLocked).unwrap();
        let after_first = registry.get(&id).unwrap().updated_at_ms;

        clock.advance_secs(5);
        registry
            .transition(&id, SwapState::DestinationLocked)
            .unwrap();
        let after_second = registry.get(&id).unwrap().updated_at_ms;

        assert!(after_second > after_first);
        assert!(after_first > registry.get(&id).unwrap().created_at_ms);
    }

    #[test]
    fn test_handle_index() {
        let clock = ManualClock::new(1000);
        let registry = SwapRegistry::new(clock.clone());
        let rec = record("s-1", &clock);
        let handle = Handle::Evm(crosschain_rs::EvmHandle {
            id: alloy::primitives::B256::from(*rec.hashlock.as_bytes()),
        });
        registry.insert(rec).unwrap();
        registry.index_handle(handle, SwapId::from("s-1"));

        assert_eq!(
            registry.swap_for_handle(&handle),
            Some(SwapId::from("s-1"))
        );
    }

    #[test]
    fn test_history_newest_first() {
        let clock = ManualClock::new(1000);
        let registry = SwapRegistry::new(clock.clone());
        registry.insert(record("s-1", &clock)).unwrap();
        clock.advance_secs(10);
        registry.insert(record("s-2", &clock)).unwrap();
        clock.advance_secs(10);
        registry.insert(record("s-3", &clock)).unwrap();

        let page = registry.history(2, 0);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, SwapId::from("s-3"));
        assert_eq!(page[1].id, SwapId::from("s-2"));

        let rest = registry.history(2, 2);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, SwapId::from("s-1"));
    }

    #[test]
    fn test_active_filtering() {
        let clock = ManualClock::new(1000);
        let registry = SwapRegistry::new(clock.clone());
        registry.insert(record("s-1", &clock)).unwrap();
        registry.insert(record("s-2", &clock)).unwrap();
        registry
            .transition(&SwapId::from("s-2"), SwapState::Failed)
            .unwrap();

        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.active()[0].id, SwapId::from("s-1"));
    }
}
