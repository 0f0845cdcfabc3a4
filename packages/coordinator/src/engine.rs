//! The swap lifecycle engine.
//!
//! Owns the sequencing of every swap: admission, source and destination
//! HTLC creation, preimage reveal, the withdrawal cascade, cancellation,
//! and terminal bookkeeping. All transitions of one swap serialize through
//! the registry's per-swap guard; the liquidity lock is released exactly
//! once, on the transition into a terminal state.

use alloy::primitives::U256;
use crosschain_rs::retry::{with_retry, RetryConfig};
use crosschain_rs::{
    AdapterError, ChainAdapter, ChainTag, Clock, Handle, Hashlock, HtlcParams, Secret, SwapId,
    TimelockSchedule,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::liquidity::LiquidityLedger;
use crate::registry::SwapRegistry;
use crate::types::{
    HtlcSide, SwapError, SwapRecord, SwapRequest, SwapState, SwapStats, SwapStatus,
};

/// Give up on a stuck source withdrawal after this many attempts; the
/// recovery driver then falls back to a refund once the deadline allows.
pub const WITHDRAW_RETRY_CEILING: u32 = 5;

pub struct SwapEngine {
    config: Config,
    clock: Arc<dyn Clock>,
    registry: Arc<SwapRegistry>,
    liquidity: Arc<LiquidityLedger>,
    adapters: HashMap<ChainTag, Arc<dyn ChainAdapter>>,
    retry: RetryConfig,
}

impl SwapEngine {
    pub fn new(
        config: Config,
        clock: Arc<dyn Clock>,
        registry: Arc<SwapRegistry>,
        liquidity: Arc<LiquidityLedger>,
        adapters: HashMap<ChainTag, Arc<dyn ChainAdapter>>,
    ) -> Self {
        Self {
            config,
            clock,
            registry,
            liquidity,
            adapters,
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff: Duration::from_millis(250),
                max_backoff: Duration::from_secs(2),
                ..RetryConfig::default()
            },
        }
    }

    pub fn registry(&self) -> &Arc<SwapRegistry> {
        &self.registry
    }

    pub fn liquidity(&self) -> &Arc<LiquidityLedger> {
        &self.liquidity
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn adapter(&self, chain: ChainTag) -> Result<&Arc<dyn ChainAdapter>, SwapError> {
        self.adapters
            .get(&chain)
            .ok_or_else(|| SwapError::ChainNotSupported(chain.to_string()))
    }

    fn token_for(&self, chain: ChainTag) -> String {
        match chain {
            ChainTag::Evm => self.config.evm.token_address.clone(),
            ChainTag::Solana => self.config.solana.token_mint.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Admit and register a new swap, then (outside test mode) schedule its
    /// asynchronous processing.
    pub fn initiate(self: &Arc<Self>, request: SwapRequest) -> Result<SwapStatus, SwapError> {
        self.initiate_with_id(request, None)
    }

    pub fn initiate_with_id(
        self: &Arc<Self>,
        request: SwapRequest,
        id: Option<SwapId>,
    ) -> Result<SwapStatus, SwapError> {
        // Only the EVM -> Solana direction is accepted; validation is the
        // single place that knows this, everything below is symmetric.
        if request.source != ChainTag::Evm || request.destination != ChainTag::Solana {
            return Err(SwapError::ChainNotSupported(format!(
                "{} -> {}",
                request.source, request.destination
            )));
        }
        self.adapter(request.source)?;
        self.adapter(request.destination)?;

        if request.amount < self.config.limits.min_amount {
            return Err(SwapError::AmountTooLow {
                amount: request.amount,
                min: self.config.limits.min_amount,
            });
        }
        if request.amount > self.config.limits.max_amount {
            return Err(SwapError::AmountTooHigh {
                amount: request.amount,
                max: self.config.limits.max_amount,
            });
        }
        if self.registry.active_count() >= self.config.limits.max_concurrent_swaps {
            return Err(SwapError::MaxSwapsReached {
                limit: self.config.limits.max_concurrent_swaps,
            });
        }

        // Caller-supplied preimage material takes precedence, but the pair
        // must be consistent.
        let (secret, hashlock) = match (&request.secret, &request.hashlock) {
            (Some(secret), Some(hashlock)) => {
                if !crosschain_rs::secret::verify(secret, hashlock) {
                    return Err(SwapError::InvalidConfig(
                        "supplied hashlock is not SHA-256 of the supplied secret".into(),
                    ));
                }
                (secret.clone(), *hashlock)
            }
            (Some(secret), None) => {
                let hashlock = Hashlock::of(secret);
                (secret.clone(), hashlock)
            }
            (None, Some(_)) => {
                return Err(SwapError::InvalidConfig(
                    "hashlock supplied without its secret".into(),
                ));
            }
            (None, None) => {
                let secret = crosschain_rs::secret::generate();
                let hashlock = Hashlock::of(&secret);
                (secret, hashlock)
            }
        };

        if !self
            .liquidity
            .has_available(request.source, request.amount)
        {
            let available = self
                .liquidity
                .status(request.source)
                .map(|s| s.available.parse().unwrap_or(U256::ZERO))
                .unwrap_or(U256::ZERO);
            return Err(SwapError::InsufficientLiquidity {
                chain: request.source,
                requested: request.amount,
                available,
            });
        }

        let id = id.unwrap_or_else(|| SwapId(Uuid::new_v4().to_string()));
        let timelocks =
            TimelockSchedule::starting_at(self.clock.now_unix(), &self.config.timelocks);
        let record = SwapRecord::new(
            id.clone(),
            request.without_secret(),
            hashlock,
            secret,
            timelocks,
            self.clock.now_millis(),
        );
        let amount = record.request.amount;
        let source = record.request.source;
        self.registry.insert(record)?;

        // The ledger re-checks under its own lock, so a concurrent
        // initiation racing past `has_available` is caught here.
        if !self.liquidity.lock(source, amount, &id) {
            self.registry.remove(&id);
            let available = self
                .liquidity
                .status(source)
                .map(|s| s.available.parse().unwrap_or(U256::ZERO))
                .unwrap_or(U256::ZERO);
            return Err(SwapError::InsufficientLiquidity {
                chain: source,
                requested: amount,
                available,
            });
        }

        info!(swap_id = %id, amount = %amount, hashlock = %hashlock, "Swap initiated");

        if !self.config.test_mode {
            let engine = Arc::clone(self);
            let swap_id = id.clone();
            tokio::spawn(async move {
                engine.process(swap_id).await;
            });
        }

        self.registry.status(&id)
    }

    pub fn get_status(&self, id: &SwapId) -> Result<SwapStatus, SwapError> {
        self.registry.status(id)
    }

    pub fn list_active(&self) -> Vec<SwapStatus> {
        self.registry
            .active()
            .into_iter()
            .map(|r| r.status())
            .collect()
    }

    pub fn history(&self, limit: usize, offset: usize) -> Vec<SwapStatus> {
        self.registry.history(limit, offset)
    }

    /// Cooperative cancellation: the swap fails and its liquidity frees,
    /// while in-flight adapter calls are allowed to complete. A source HTLC
    /// already on chain is reclaimed by the recovery driver once its
    /// cancellation deadline passes.
    pub async fn cancel(&self, id: &SwapId) -> Result<SwapStatus, SwapError> {
        let guard = self.registry.guard(id);
        let _held = guard.lock().await;

        let record = self
            .registry
            .get(id)
            .ok_or_else(|| SwapError::SwapNotFound(id.clone()))?;
        if !record.state.is_active() {
            return Err(SwapError::InvalidState {
                swap_id: id.clone(),
                state: record.state,
                operation: "cancel",
            });
        }

        self.fail_swap(id, "cancelled by user".to_string());
        self.registry.status(id)
    }

    /// Re-run a failed swap's request as a brand new swap. The old record
    /// stays in history.
    pub fn retry(self: &Arc<Self>, id: &SwapId) -> Result<SwapStatus, SwapError> {
        let record = self
            .registry
            .get(id)
            .ok_or_else(|| SwapError::SwapNotFound(id.clone()))?;
        if record.state != SwapState::Failed {
            return Err(SwapError::InvalidState {
                swap_id: id.clone(),
                state: record.state,
                operation: "retry",
            });
        }

        let status = self.initiate(record.request.without_secret())?;
        let retries = record.retry_count + 1;
        self.registry.update(&status.id, |r| {
            r.retry_count = retries;
            Ok(())
        })?;
        info!(old_swap = %id, new_swap = %status.id, attempt = retries, "Swap retried");
        self.registry.status(&status.id)
    }

    pub fn stats(&self) -> SwapStats {
        let records = self.registry.all();
        let total_swaps = records.len();
        let active_swaps = records.iter().filter(|r| r.state.is_active()).count();
        let completed: Vec<&SwapRecord> = records
            .iter()
            .filter(|r| r.state == SwapState::Completed)
            .collect();
        let refunded_swaps = records
            .iter()
            .filter(|r| r.state == SwapState::Refunded)
            .count();
        let failed_swaps = records
            .iter()
            .filter(|r| r.state == SwapState::Failed)
            .count();

        let total_volume = completed
            .iter()
            .map(|r| r.request.amount)
            .fold(U256::ZERO, |a, b| a + b);
        let average_completion_secs = if completed.is_empty() {
            0.0
        } else {
            let total_ms: u64 = completed
                .iter()
                .map(|r| r.updated_at_ms.saturating_sub(r.created_at_ms))
                .sum();
            total_ms as f64 / completed.len() as f64 / 1000.0
        };
        let terminal = completed.len() + refunded_swaps + failed_swaps;
        let success_rate = if terminal == 0 {
            0.0
        } else {
            completed.len() as f64 / terminal as f64 * 100.0
        };

        SwapStats {
            total_swaps,
            active_swaps,
            completed_swaps: completed.len(),
            refunded_swaps,
            failed_swaps,
            total_volume: total_volume.to_string(),
            average_completion_secs,
            success_rate,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle processing
    // ------------------------------------------------------------------

    /// Drive one swap through the happy path. Each stage re-checks state
    /// under the per-swap guard, so concurrent events cannot double-run a
    /// transition.
    pub async fn process(self: Arc<Self>, id: SwapId) {
        if let Err(e) = self.create_source(&id).await {
            warn!(swap_id = %id, error = %e, "Source leg failed");
            return;
        }
        if let Err(e) = self.create_destination(&id).await {
            warn!(swap_id = %id, error = %e, "Destination leg failed");
            return;
        }

        // The coordinator plays both roles in this PoC, so it reveals the
        // preimage itself once the finality window opens. The event
        // integrator remains the seam for observed third-party reveals.
        let engine = Arc::clone(&self);
        let swap_id = id.clone();
        tokio::spawn(async move {
            let now = engine.clock.now_unix();
            if let Some(record) = engine.registry.get(&swap_id) {
                let wait = record.timelocks.finality().saturating_sub(now) + 1;
                tokio::time::sleep(Duration::from_secs(wait)).await;
                if let Err(e) = engine.self_reveal(&swap_id).await {
                    warn!(swap_id = %swap_id, error = %e, "Self-reveal failed");
                }
            }
        });
    }

    /// Stage 1: create the source HTLC with the coordinator as receiver.
    pub async fn create_source(&self, id: &SwapId) -> Result<(), SwapError> {
        let guard = self.registry.guard(id);
        let _held = guard.lock().await;

        let record = self
            .registry
            .get(id)
            .ok_or_else(|| SwapError::SwapNotFound(id.clone()))?;
        if record.state != SwapState::Pending {
            return Ok(());
        }

        let adapter = self.adapter(record.request.source)?;
        let params = HtlcParams {
            sender: record.request.sender.clone(),
            receiver: adapter.own_address(),
            token: self.token_for(record.request.source),
            amount: record.request.amount,
            hashlock: record.hashlock,
            timelocks: record.timelocks,
        };

        match with_retry(&self.retry, || adapter.create_htlc(&params)).await {
            Ok((handle, tx)) => {
                let now_ms = self.clock.now_millis();
                self.registry.update(id, |r| {
                    r.source_htlc = Some(HtlcSide::new(handle, tx.tx_id.clone(), tx.block, now_ms));
                    Ok(())
                })?;
                self.registry.transition(id, SwapState::SourceLocked)?;
                self.registry.index_handle(handle, id.clone());
                info!(swap_id = %id, handle = %handle, tx = %tx.tx_id, "Source HTLC created");
                Ok(())
            }
            Err(e) => {
                // Nothing is on chain yet; the swap can fail outright.
                self.fail_swap(id, format!("source HTLC creation failed: {}", e));
                Err(SwapError::HtlcCreationFailed {
                    swap_id: id.clone(),
                    source: e,
                })
            }
        }
    }

    /// Stage 2: mirror the HTLC on the destination chain, funded by the
    /// coordinator, receivable by the requested receiver.
    pub async fn create_destination(&self, id: &SwapId) -> Result<(), SwapError> {
        let guard = self.registry.guard(id);
        let _held = guard.lock().await;

        let record = self
            .registry
            .get(id)
            .ok_or_else(|| SwapError::SwapNotFound(id.clone()))?;
        if record.state != SwapState::SourceLocked {
            return Ok(());
        }

        let adapter = self.adapter(record.request.destination)?;
        let params = HtlcParams {
            sender: adapter.own_address(),
            receiver: record.request.receiver.clone(),
            token: self.token_for(record.request.destination),
            amount: record.request.amount,
            hashlock: record.hashlock,
            timelocks: record.timelocks,
        };

        match with_retry(&self.retry, || adapter.create_htlc(&params)).await {
            Ok((handle, tx)) => {
                let now_ms = self.clock.now_millis();
                self.registry.update(id, |r| {
                    r.destination_htlc =
                        Some(HtlcSide::new(handle, tx.tx_id.clone(), tx.block, now_ms));
                    Ok(())
                })?;
                self.registry.transition(id, SwapState::DestinationLocked)?;
                self.registry.index_handle(handle, id.clone());
                info!(swap_id = %id, handle = %handle, tx = %tx.tx_id, "Destination HTLC created");
                Ok(())
            }
            Err(e) => {
                // The source HTLC is live; it can only be reclaimed after
                // its cancellation deadline, which the recovery driver
                // handles. Liquidity stays locked until then.
                error!(swap_id = %id, error = %e, "Destination HTLC creation failed, swap will refund");
                self.registry.update(id, |r| {
                    r.error = Some(format!("destination HTLC creation failed: {}", e));
                    Ok(())
                })?;
                self.registry.transition(id, SwapState::Refunding)?;
                Err(SwapError::HtlcCreationFailed {
                    swap_id: id.clone(),
                    source: e,
                })
            }
        }
    }

    /// PoC self-reveal: withdraw the destination HTLC with our own
    /// preimage, which publishes it on chain, then run the reveal cascade.
    pub async fn self_reveal(&self, id: &SwapId) -> Result<(), SwapError> {
        let record = self
            .registry
            .get(id)
            .ok_or_else(|| SwapError::SwapNotFound(id.clone()))?;
        if record.state != SwapState::DestinationLocked {
            return Ok(());
        }
        let secret = record
            .secret
            .clone()
            .ok_or_else(|| SwapError::Monitoring(format!("swap {} has no preimage", id)))?;

        if let Some(dest) = &record.destination_htlc {
            let adapter = self.adapter(record.request.destination)?;
            match with_retry(&self.retry, || adapter.withdraw(&dest.handle, &secret)).await {
                Ok(tx) => {
                    self.registry.update(id, |r| {
                        if let Some(side) = r.destination_htlc.as_mut() {
                            side.mark_withdrawn()?;
                        }
                        Ok(())
                    })?;
                    info!(swap_id = %id, tx = %tx.tx_id, "Destination withdrawn, preimage revealed");
                }
                Err(AdapterError::AlreadyWithdrawn) => {
                    debug!(swap_id = %id, "Destination already withdrawn");
                }
                Err(e) => {
                    // The preimage is still known locally; completing the
                    // source side dominates, so the cascade continues.
                    warn!(swap_id = %id, error = %e, "Destination withdrawal failed");
                }
            }
        }

        self.on_preimage_revealed(id, secret).await
    }

    /// Entry point for both the self-reveal and the event integrator.
    /// Idempotent: late or duplicate reveals on a swap already past
    /// `destination_locked` are no-ops.
    pub async fn on_preimage_revealed(&self, id: &SwapId, preimage: Secret) -> Result<(), SwapError> {
        {
            let guard = self.registry.guard(id);
            let _held = guard.lock().await;

            let record = self
                .registry
                .get(id)
                .ok_or_else(|| SwapError::SwapNotFound(id.clone()))?;
            if record.state != SwapState::DestinationLocked {
                debug!(swap_id = %id, state = %record.state, "Reveal ignored in current state");
                return Ok(());
            }
            if !crosschain_rs::secret::verify(&preimage, &record.hashlock) {
                return Err(SwapError::Monitoring(format!(
                    "revealed preimage does not match hashlock for swap {}",
                    id
                )));
            }

            self.registry.update(id, |r| {
                // An observed reveal may be the first time this process
                // sees the preimage.
                if r.secret.is_none() {
                    r.secret = Some(preimage.clone());
                }
                Ok(())
            })?;
            self.registry.transition(id, SwapState::Withdrawing)?;
            info!(swap_id = %id, "Preimage revealed, withdrawing source");
        }

        self.withdraw_source(id).await
    }

    /// Final stage: claim the source HTLC with the preimage.
    pub async fn withdraw_source(&self, id: &SwapId) -> Result<(), SwapError> {
        let guard = self.registry.guard(id);
        let _held = guard.lock().await;

        let record = self
            .registry
            .get(id)
            .ok_or_else(|| SwapError::SwapNotFound(id.clone()))?;
        if record.state != SwapState::Withdrawing {
            return Ok(());
        }
        let secret = record
            .secret
            .clone()
            .ok_or_else(|| SwapError::Monitoring(format!("swap {} has no preimage", id)))?;
        let source = record
            .source_htlc
            .clone()
            .ok_or_else(|| SwapError::Monitoring(format!("swap {} has no source HTLC", id)))?;

        let adapter = self.adapter(record.request.source)?;
        match with_retry(&self.retry, || adapter.withdraw(&source.handle, &secret)).await {
            Ok(tx) => {
                self.registry.update(id, |r| {
                    if let Some(side) = r.source_htlc.as_mut() {
                        side.mark_withdrawn()?;
                    }
                    Ok(())
                })?;
                self.registry.transition(id, SwapState::Completed)?;
                self.liquidity.release_all(id);
                info!(swap_id = %id, tx = %tx.tx_id, "Swap completed");
                Ok(())
            }
            Err(AdapterError::AlreadyWithdrawn) => {
                // Someone (possibly a previous attempt) already claimed it.
                self.registry.update(id, |r| {
                    if let Some(side) = r.source_htlc.as_mut() {
                        side.mark_withdrawn()?;
                    }
                    Ok(())
                })?;
                self.registry.transition(id, SwapState::Completed)?;
                self.liquidity.release_all(id);
                Ok(())
            }
            Err(e) => {
                // Stay in `withdrawing`; the recovery driver keeps retrying
                // until the deadline forces a refund or the ceiling is hit.
                warn!(swap_id = %id, error = %e, "Source withdrawal failed, will retry");
                self.registry.update(id, |r| {
                    r.retry_count += 1;
                    r.error = Some(format!("source withdrawal failed: {}", e));
                    Ok(())
                })?;
                Err(SwapError::WithdrawalFailed {
                    swap_id: id.clone(),
                    source: e,
                })
            }
        }
    }

    /// Observed refund of one of the swap's HTLCs. Updates the side flag
    /// and settles the swap when every live handle is resolved.
    pub async fn on_refund_observed(&self, id: &SwapId, handle: Handle) -> Result<(), SwapError> {
        let guard = self.registry.guard(id);
        let _held = guard.lock().await;

        let record = self
            .registry
            .get(id)
            .ok_or_else(|| SwapError::SwapNotFound(id.clone()))?;

        self.registry.update(id, |r| {
            if let Some(side) = r.source_htlc.as_mut().filter(|s| s.handle == handle) {
                if !side.refunded() {
                    side.mark_refunded()?;
                }
            }
            if let Some(side) = r.destination_htlc.as_mut().filter(|s| s.handle == handle) {
                if !side.refunded() {
                    side.mark_refunded()?;
                }
            }
            Ok(())
        })?;

        if record.state == SwapState::Refunding {
            self.settle_refund_if_done(id)?;
        }
        Ok(())
    }

    /// Transition `refunding -> refunded` once every present handle is
    /// withdrawn or refunded, releasing liquidity exactly once.
    pub fn settle_refund_if_done(&self, id: &SwapId) -> Result<bool, SwapError> {
        let record = self
            .registry
            .get(id)
            .ok_or_else(|| SwapError::SwapNotFound(id.clone()))?;
        if record.state != SwapState::Refunding {
            return Ok(false);
        }

        let resolved = |side: &Option<HtlcSide>| {
            side.as_ref()
                .map(|s| s.withdrawn() || s.refunded())
                .unwrap_or(true)
        };
        if resolved(&record.source_htlc) && resolved(&record.destination_htlc) {
            self.registry.transition(id, SwapState::Refunded)?;
            self.liquidity.release_all(id);
            info!(swap_id = %id, "Swap refunded");
            return Ok(true);
        }
        Ok(false)
    }

    /// Terminal failure: record the reason and free the liquidity.
    pub fn fail_swap(&self, id: &SwapId, reason: String) {
        let result = self
            .registry
            .update(id, |r| {
                r.error = Some(reason.clone());
                Ok(())
            })
            .and_then(|_| self.registry.transition(id, SwapState::Failed));
        match result {
            Ok(_) => {
                self.liquidity.release_all(id);
                warn!(swap_id = %id, reason = %reason, "Swap failed");
            }
            Err(e) => {
                error!(swap_id = %id, error = %e, "Could not fail swap");
            }
        }
    }

    /// Test seam: advance exactly one lifecycle stage synchronously.
    /// Only meaningful with `test_mode`, where `initiate` does not spawn.
    pub async fn step(&self, id: &SwapId) -> Result<SwapStatus, SwapError> {
        let record = self
            .registry
            .get(id)
            .ok_or_else(|| SwapError::SwapNotFound(id.clone()))?;

        let outcome = match record.state {
            SwapState::Pending => self.create_source(id).await,
            SwapState::SourceLocked => self.create_destination(id).await,
            SwapState::DestinationLocked => self.self_reveal(id).await,
            SwapState::Withdrawing => self.withdraw_source(id).await,
            SwapState::Refunding => self.try_refund(id).await.map(|_| ()),
            state => {
                return Err(SwapError::InvalidState {
                    swap_id: id.clone(),
                    state,
                    operation: "step",
                })
            }
        };
        // The step's purpose is to advance the machine; the caller reads
        // the outcome from the returned snapshot.
        if let Err(e) = outcome {
            debug!(swap_id = %id, error = %e, "Step completed with error");
        }
        self.registry.status(id)
    }

    /// Attempt to reclaim this swap's HTLCs, respecting on-chain deadline
    /// checks via the `can_refund` probes. Returns true once settled.
    pub async fn try_refund(&self, id: &SwapId) -> Result<bool, SwapError> {
        let guard = self.registry.guard(id);
        let _held = guard.lock().await;

        let record = self
            .registry
            .get(id)
            .ok_or_else(|| SwapError::SwapNotFound(id.clone()))?;
        if record.state != SwapState::Refunding {
            return Ok(false);
        }

        for (side, chain) in [
            (record.source_htlc.clone(), record.request.source),
            (
                record.destination_htlc.clone(),
                record.request.destination,
            ),
        ] {
            let side = match side {
                Some(side) if !side.withdrawn() && !side.refunded() => side,
                _ => continue,
            };
            let adapter = self.adapter(chain)?;

            match adapter.can_refund(&side.handle).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(swap_id = %id, handle = %side.handle, error = %e, "Refund probe failed");
                    continue;
                }
            }

            match with_retry(&self.retry, || adapter.refund(&side.handle)).await {
                Ok(tx) => {
                    let handle = side.handle;
                    self.registry.update(id, |r| {
                        if let Some(s) = r.source_htlc.as_mut().filter(|s| s.handle == handle) {
                            s.mark_refunded()?;
                        }
                        if let Some(s) =
                            r.destination_htlc.as_mut().filter(|s| s.handle == handle)
                        {
                            s.mark_refunded()?;
                        }
                        Ok(())
                    })?;
                    info!(swap_id = %id, handle = %handle, tx = %tx.tx_id, "HTLC refunded");
                }
                Err(AdapterError::AlreadyRefunded) => {
                    let handle = side.handle;
                    self.registry.update(id, |r| {
                        if let Some(s) = r.source_htlc.as_mut().filter(|s| s.handle == handle) {
                            s.mark_refunded()?;
                        }
                        if let Some(s) =
                            r.destination_htlc.as_mut().filter(|s| s.handle == handle)
                        {
                            s.mark_refunded()?;
                        }
                        Ok(())
                    })?;
                }
                Err(e) => {
                    warn!(swap_id = %id, handle = %side.handle, error = %e, "Refund failed");
                    self.registry.update(id, |r| {
                        r.error = Some(format!("refund failed: {}", e));
                        Ok(())
                    })?;
                }
            }
        }

        self.settle_refund_if_done(id)
    }
}
