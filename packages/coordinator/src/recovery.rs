//! Recovery driver: periodic scan that rescues stranded swaps.
//!
//! Runs on a fixed tick, classifying every active swap by handle presence
//! and deadline position, then dispatching the corrective action. A swap in
//! a deadline-expired state is moved to `refunding`; a stranded swap is
//! re-driven through the stage it stalled in. Withdrawal always beats
//! refund when both are possible.

use crosschain_rs::{Clock, SwapId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::{SwapEngine, WITHDRAW_RETRY_CEILING};
use crate::types::{SwapRecord, SwapState};

const DEFAULT_TICK: Duration = Duration::from_secs(10);
const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(600);

/// What one scan pass did for one swap.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryAction {
    pub swap_id: SwapId,
    pub action: String,
}

pub struct RecoveryDriver {
    engine: Arc<SwapEngine>,
    clock: Arc<dyn Clock>,
    tick: Duration,
    stale_threshold: Duration,
}

impl RecoveryDriver {
    pub fn new(engine: Arc<SwapEngine>, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine,
            clock,
            tick: DEFAULT_TICK,
            stale_threshold: DEFAULT_STALE_THRESHOLD,
        }
    }

    pub fn with_timing(mut self, tick: Duration, stale_threshold: Duration) -> Self {
        self.tick = tick;
        self.stale_threshold = stale_threshold;
        self
    }

    /// Run scans until a shutdown signal arrives.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> eyre::Result<()> {
        info!(
            tick_secs = self.tick.as_secs(),
            stale_secs = self.stale_threshold.as_secs(),
            "Recovery driver started"
        );
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Recovery driver stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.tick) => {}
            }

            let actions = self.scan_once().await;
            if !actions.is_empty() {
                info!(actions = actions.len(), "Recovery pass dispatched actions");
            }
        }
    }

    /// One scan over the registry. Errors are logged per swap and never
    /// abort the pass.
    pub async fn scan_once(&self) -> Vec<RecoveryAction> {
        let mut actions = Vec::new();

        for record in self.engine.registry().active() {
            match self.recover_swap(&record).await {
                Ok(Some(action)) => actions.push(RecoveryAction {
                    swap_id: record.id.clone(),
                    action,
                }),
                Ok(None) => {}
                Err(e) => {
                    warn!(swap_id = %record.id, error = %e, "Recovery action failed");
                }
            }
        }

        // Cancelled swaps are terminal but may still hold a live source
        // HTLC; reclaim the funds without reopening the record.
        for record in self.engine.registry().all() {
            if record.state == SwapState::Failed {
                if let Ok(Some(action)) = self.reclaim_failed(&record).await {
                    actions.push(RecoveryAction {
                        swap_id: record.id.clone(),
                        action,
                    });
                }
            }
        }

        actions
    }

    async fn recover_swap(&self, record: &SwapRecord) -> Result<Option<String>, eyre::Error> {
        let now = self.clock.now_unix();
        let now_ms = self.clock.now_millis();
        let stranded =
            now_ms.saturating_sub(record.updated_at_ms) > self.stale_threshold.as_millis() as u64;
        let deadline_passed = now >= record.timelocks.cancellation();
        let id = &record.id;

        match record.state {
            SwapState::Refunding => {
                let settled = self.engine.try_refund(id).await?;
                Ok(Some(if settled {
                    "refund settled".into()
                } else {
                    "refund attempted".into()
                }))
            }

            SwapState::SourceLocked | SwapState::DestinationLocked | SwapState::Withdrawing
                if deadline_passed =>
            {
                // Preimage known: completing the swap dominates refunding,
                // even at the deadline.
                if record.secret.is_some()
                    && record.state != SwapState::Withdrawing
                    && record.destination_htlc.is_some()
                {
                    debug!(swap_id = %id, "Deadline passed with preimage known, withdrawing");
                    self.engine.self_reveal(id).await?;
                    return Ok(Some("withdrawal cascade (deadline)".into()));
                }
                if record.state == SwapState::Withdrawing {
                    if record.retry_count < WITHDRAW_RETRY_CEILING {
                        match self.engine.withdraw_source(id).await {
                            Ok(()) => return Ok(Some("source withdrawn".into())),
                            Err(e) => {
                                debug!(swap_id = %id, error = %e, "Retry withdrawal failed");
                            }
                        }
                        return Ok(Some("withdrawal retried".into()));
                    }
                    // Retry ceiling hit; fall through to the refund path.
                }
                self.engine
                    .registry()
                    .transition(id, SwapState::Refunding)?;
                let settled = self.engine.try_refund(id).await?;
                Ok(Some(if settled {
                    "deadline refund settled".into()
                } else {
                    "deadline refund started".into()
                }))
            }

            SwapState::SourceLocked if stranded && record.destination_htlc.is_none() => {
                debug!(swap_id = %id, "Stranded without destination HTLC, re-entering creation");
                self.engine.create_destination(id).await?;
                Ok(Some("destination creation retried".into()))
            }

            SwapState::DestinationLocked if stranded && record.secret.is_some() => {
                debug!(swap_id = %id, "Stranded with preimage available, running cascade");
                self.engine.self_reveal(id).await?;
                Ok(Some("withdrawal cascade".into()))
            }

            SwapState::Withdrawing if stranded => {
                if record.retry_count >= WITHDRAW_RETRY_CEILING {
                    return Ok(None); // wait for the deadline branch
                }
                match self.engine.withdraw_source(id).await {
                    Ok(()) => Ok(Some("source withdrawn".into())),
                    Err(e) => {
                        debug!(swap_id = %id, error = %e, "Retry withdrawal failed");
                        Ok(Some("withdrawal retried".into()))
                    }
                }
            }

            _ => Ok(None),
        }
    }

    /// Refund the source HTLC of a cancelled (failed) swap once its
    /// deadline allows. The record itself stays frozen.
    async fn reclaim_failed(&self, record: &SwapRecord) -> Result<Option<String>, eyre::Error> {
        let side = match &record.source_htlc {
            Some(side) if !side.withdrawn() && !side.refunded() => side.clone(),
            _ => return Ok(None),
        };
        let adapter = self.engine.adapter(record.request.source)?;

        if !adapter.can_refund(&side.handle).await.unwrap_or(false) {
            return Ok(None);
        }

        let tx = adapter.refund(&side.handle).await?;
        self.engine.registry().update(&record.id, |r| {
            if let Some(s) = r.source_htlc.as_mut() {
                s.mark_refunded()?;
            }
            Ok(())
        })?;
        info!(swap_id = %record.id, tx = %tx.tx_id, "Reclaimed source HTLC of cancelled swap");
        Ok(Some("cancelled source reclaimed".into()))
    }
}
