//! In-memory chain adapter with real HTLC semantics.

use alloy::primitives::{B256, U256};
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::adapter::{
    ChainAdapter, EvmHandle, Handle, HtlcEvent, HtlcParams, HtlcState, SolanaHandle,
};
use crate::clock::Clock;
use crate::error::AdapterError;
use crate::secret::{Hashlock, Secret};
use crate::timelock::TimelockSchedule;
use crate::types::{ChainTag, TxRef};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct MockHtlc {
    receiver: String,
    amount: U256,
    hashlock: Hashlock,
    timelocks: TimelockSchedule,
    withdrawn: bool,
    refunded: bool,
    preimage: Option<[u8; 32]>,
}

#[derive(Default)]
struct MockState {
    htlcs: HashMap<Handle, MockHtlc>,
    fail_create: VecDeque<AdapterError>,
    fail_withdraw: VecDeque<AdapterError>,
    fail_refund: VecDeque<AdapterError>,
    balance: U256,
    tx_counter: u64,
}

/// Deterministic, clock-driven adapter double.
pub struct MockChainAdapter {
    chain: ChainTag,
    clock: Arc<dyn Clock>,
    state: Mutex<MockState>,
    events_tx: broadcast::Sender<HtlcEvent>,
}

impl MockChainAdapter {
    pub fn new(chain: ChainTag, clock: Arc<dyn Clock>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            chain,
            clock,
            state: Mutex::new(MockState {
                balance: U256::from(1_000_000_000_000u64),
                ..MockState::default()
            }),
            events_tx,
        }
    }

    /// Queue an error for the next `create_htlc` call.
    pub fn fail_next_create(&self, error: AdapterError) {
        self.state.lock().unwrap().fail_create.push_back(error);
    }

    /// Queue an error for the next `withdraw` call.
    pub fn fail_next_withdraw(&self, error: AdapterError) {
        self.state.lock().unwrap().fail_withdraw.push_back(error);
    }

    /// Queue an error for the next `refund` call.
    pub fn fail_next_refund(&self, error: AdapterError) {
        self.state.lock().unwrap().fail_refund.push_back(error);
    }

    pub fn set_balance(&self, balance: U256) {
        self.state.lock().unwrap().balance = balance;
    }

    /// Number of live (neither withdrawn nor refunded) HTLCs.
    pub fn open_htlc_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .htlcs
            .values()
            .filter(|h| !h.withdrawn && !h.refunded)
            .count()
    }

    /// Simulate a counterparty withdrawal: flips the on-chain state and
    /// broadcasts the `Withdrawn` event exactly as a watcher would.
    pub fn simulate_counterparty_withdraw(
        &self,
        handle: &Handle,
        secret: &Secret,
    ) -> Result<(), AdapterError> {
        let tx = {
            let mut state = self.state.lock().unwrap();
            let tx = next_tx(&mut state);
            let htlc = state
                .htlcs
                .get_mut(handle)
                .ok_or_else(|| AdapterError::HtlcNotFound(handle.to_string()))?;
            if !crate::secret::verify(secret, &htlc.hashlock) {
                return Err(AdapterError::InvalidSecret);
            }
            htlc.withdrawn = true;
            htlc.preimage = Some(*secret.as_bytes());
            tx
        };
        let _ = self.events_tx.send(HtlcEvent::Withdrawn {
            handle: *handle,
            preimage: secret.clone(),
            tx,
        });
        Ok(())
    }

    fn make_handle(&self, hashlock: &Hashlock) -> Handle {
        match self.chain {
            ChainTag::Evm => Handle::Evm(EvmHandle {
                id: B256::from(*hashlock.as_bytes()),
            }),
            ChainTag::Solana => Handle::Solana(SolanaHandle {
                escrow: Pubkey::new_from_array(*hashlock.as_bytes()),
            }),
        }
    }
}

fn next_tx(state: &mut MockState) -> TxRef {
    state.tx_counter += 1;
    TxRef {
        tx_id: format!("mock-tx-{}", state.tx_counter),
        block: state.tx_counter,
    }
}

#[async_trait]
impl ChainAdapter for MockChainAdapter {
    fn chain(&self) -> ChainTag {
        self.chain
    }

    fn own_address(&self) -> String {
        format!("coordinator-{}", self.chain)
    }

    async fn create_htlc(&self, params: &HtlcParams) -> Result<(Handle, TxRef), AdapterError> {
        let now = self.clock.now_unix();
        let handle = self.make_handle(&params.hashlock);

        let tx = {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = state.fail_create.pop_front() {
                return Err(err);
            }
            if params.timelocks.cancellation() <= now {
                return Err(AdapterError::InvalidTimelock);
            }
            if params.receiver.is_empty() {
                return Err(AdapterError::InvalidReceiver(params.receiver.clone()));
            }
            if params.sender.is_empty() {
                return Err(AdapterError::InvalidSender(params.sender.clone()));
            }
            if state.balance < params.amount {
                return Err(AdapterError::InsufficientBalance);
            }
            if state.htlcs.contains_key(&handle) {
                return Err(AdapterError::Protocol("hashlock already in use".into()));
            }

            state.balance -= params.amount;
            let tx = next_tx(&mut state);
            state.htlcs.insert(
                handle,
                MockHtlc {
                    receiver: params.receiver.clone(),
                    amount: params.amount,
                    hashlock: params.hashlock,
                    timelocks: params.timelocks,
                    withdrawn: false,
                    refunded: false,
                    preimage: None,
                },
            );
            tx
        };

        let _ = self.events_tx.send(HtlcEvent::Created {
            handle,
            tx: tx.clone(),
        });
        Ok((handle, tx))
    }

    async fn withdraw(&self, handle: &Handle, secret: &Secret) -> Result<TxRef, AdapterError> {
        let now = self.clock.now_unix();

        let tx = {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = state.fail_withdraw.pop_front() {
                return Err(err);
            }
            let tx = next_tx(&mut state);
            let htlc = state
                .htlcs
                .get_mut(handle)
                .ok_or_else(|| AdapterError::HtlcNotFound(handle.to_string()))?;

            if htlc.withdrawn {
                return Err(AdapterError::AlreadyWithdrawn);
            }
            if htlc.refunded {
                return Err(AdapterError::AlreadyRefunded);
            }
            if !htlc.timelocks.can_withdraw_at(now) {
                return Err(AdapterError::WindowClosed);
            }
            if !crate::secret::verify(secret, &htlc.hashlock) {
                return Err(AdapterError::InvalidSecret);
            }

            htlc.withdrawn = true;
            htlc.preimage = Some(*secret.as_bytes());
            tx
        };

        let _ = self.events_tx.send(HtlcEvent::Withdrawn {
            handle: *handle,
            preimage: secret.clone(),
            tx: tx.clone(),
        });
        Ok(tx)
    }

    async fn refund(&self, handle: &Handle) -> Result<TxRef, AdapterError> {
        let now = self.clock.now_unix();

        let tx = {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = state.fail_refund.pop_front() {
                return Err(err);
            }
            let tx = next_tx(&mut state);
            let htlc = state
                .htlcs
                .get_mut(handle)
                .ok_or_else(|| AdapterError::HtlcNotFound(handle.to_string()))?;

            if htlc.withdrawn {
                return Err(AdapterError::AlreadyWithdrawn);
            }
            if htlc.refunded {
                return Err(AdapterError::AlreadyRefunded);
            }
            if !htlc.timelocks.can_refund_at(now) {
                return Err(AdapterError::TimelockNotExpired);
            }

            htlc.refunded = true;
            tx
        };

        let _ = self.events_tx.send(HtlcEvent::Refunded {
            handle: *handle,
            tx: tx.clone(),
        });
        Ok(tx)
    }

    async fn can_withdraw(&self, handle: &Handle, secret: &Secret) -> Result<bool, AdapterError> {
        let now = self.clock.now_unix();
        let state = self.state.lock().unwrap();
        Ok(match state.htlcs.get(handle) {
            Some(h) => {
                !h.withdrawn
                    && !h.refunded
                    && h.timelocks.can_withdraw_at(now)
                    && crate::secret::verify(secret, &h.hashlock)
            }
            None => false,
        })
    }

    async fn can_refund(&self, handle: &Handle) -> Result<bool, AdapterError> {
        let now = self.clock.now_unix();
        let state = self.state.lock().unwrap();
        Ok(match state.htlcs.get(handle) {
            Some(h) => !h.withdrawn && !h.refunded && h.timelocks.can_refund_at(now),
            None => false,
        })
    }

    async fn info(&self, handle: &Handle) -> Result<HtlcState, AdapterError> {
        let state = self.state.lock().unwrap();
        Ok(match state.htlcs.get(handle) {
            Some(h) => HtlcState {
                exists: true,
                withdrawn: h.withdrawn,
                refunded: h.refunded,
                hashlock: h.hashlock,
                amount: h.amount,
                cancellation_deadline: h.timelocks.cancellation(),
            },
            None => HtlcState {
                exists: false,
                withdrawn: false,
                refunded: false,
                hashlock: Hashlock([0u8; 32]),
                amount: U256::ZERO,
                cancellation_deadline: 0,
            },
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<HtlcEvent> {
        self.events_tx.subscribe()
    }

    async fn balance(&self) -> Result<U256, AdapterError> {
        Ok(self.state.lock().unwrap().balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::timelock::TimelockDurations;

    fn params(clock: &ManualClock) -> (HtlcParams, Secret) {
        let secret = crate::secret::generate();
        let hashlock = Hashlock::of(&secret);
        let params = HtlcParams {
            sender: "alice".into(),
            receiver: "bob".into(),
            token: "tok".into(),
            amount: U256::from(1_000_000u64),
            hashlock,
            timelocks: TimelockSchedule::starting_at(
                clock.now_unix(),
                &TimelockDurations::default(),
            ),
        };
        (params, secret)
    }

    #[tokio::test]
    async fn test_create_then_withdraw() {
        let clock = ManualClock::new(1_000_000);
        let adapter = MockChainAdapter::new(ChainTag::Evm, clock.clone());
        let (p, secret) = params(&clock);

        let (handle, _) = adapter.create_htlc(&p).await.unwrap();

        // Still inside the finality window.
        assert!(!adapter.can_withdraw(&handle, &secret).await.unwrap());
        assert!(matches!(
            adapter.withdraw(&handle, &secret).await,
            Err(AdapterError::WindowClosed)
        ));

        clock.advance_secs(31);
        assert!(adapter.can_withdraw(&handle, &secret).await.unwrap());
        adapter.withdraw(&handle, &secret).await.unwrap();

        let info = adapter.info(&handle).await.unwrap();
        assert!(info.withdrawn);
        assert!(!info.refunded);
        assert!(matches!(
            adapter.withdraw(&handle, &secret).await,
            Err(AdapterError::AlreadyWithdrawn)
        ));
    }

    #[tokio::test]
    async fn test_refund_only_after_cancellation() {
        let clock = ManualClock::new(1_000_000);
        let adapter = MockChainAdapter::new(ChainTag::Solana, clock.clone());
        let (p, _) = params(&clock);

        let (handle, _) = adapter.create_htlc(&p).await.unwrap();
        assert!(matches!(
            adapter.refund(&handle).await,
            Err(AdapterError::TimelockNotExpired)
        ));

        clock.advance_secs(991); // past F + R + P + C
        assert!(adapter.can_refund(&handle).await.unwrap());
        adapter.refund(&handle).await.unwrap();

        let info = adapter.info(&handle).await.unwrap();
        assert!(info.refunded);
        assert!(!info.withdrawn);
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let clock = ManualClock::new(1_000_000);
        let adapter = MockChainAdapter::new(ChainTag::Evm, clock.clone());
        let (p, _) = params(&clock);
        let (handle, _) = adapter.create_htlc(&p).await.unwrap();

        clock.advance_secs(31);
        let wrong = Secret::new([0x99u8; 32]);
        assert!(matches!(
            adapter.withdraw(&handle, &wrong).await,
            Err(AdapterError::InvalidSecret)
        ));
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let clock = ManualClock::new(1_000_000);
        let adapter = MockChainAdapter::new(ChainTag::Evm, clock.clone());
        adapter.fail_next_create(AdapterError::Transport("rpc down".into()));

        let (p, _) = params(&clock);
        assert!(matches!(
            adapter.create_htlc(&p).await,
            Err(AdapterError::Transport(_))
        ));
        // The queued failure is consumed; the retry succeeds.
        adapter.create_htlc(&p).await.unwrap();
    }

    #[tokio::test]
    async fn test_events_broadcast() {
        let clock = ManualClock::new(1_000_000);
        let adapter = MockChainAdapter::new(ChainTag::Evm, clock.clone());
        let mut events = adapter.subscribe();

        let (p, secret) = params(&clock);
        let (handle, _) = adapter.create_htlc(&p).await.unwrap();
        clock.advance_secs(31);
        adapter.withdraw(&handle, &secret).await.unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            HtlcEvent::Created { .. }
        ));
        match events.recv().await.unwrap() {
            HtlcEvent::Withdrawn { preimage, .. } => {
                assert_eq!(preimage.as_bytes(), secret.as_bytes());
            }
            other => panic!("expected Withdrawn, got {:?}", other),
        }
    }
}
