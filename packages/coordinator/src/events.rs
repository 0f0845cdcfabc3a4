//! Event integrator: bridges adapter event streams into the engine.
//!
//! Subscribes to every adapter at startup. Withdrawal events carry the
//! revealed preimage and are routed to `on_preimage_revealed` through the
//! handle index built at HTLC creation time. Duplicate deliveries are
//! harmless: the engine's reveal path is idempotent.

use crosschain_rs::{ChainAdapter, HtlcEvent};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::engine::SwapEngine;

pub struct EventIntegrator {
    engine: Arc<SwapEngine>,
    streams: Vec<broadcast::Receiver<HtlcEvent>>,
}

impl EventIntegrator {
    /// Subscribe to every adapter's stream.
    pub fn new(engine: Arc<SwapEngine>, adapters: &[Arc<dyn ChainAdapter>]) -> Self {
        let streams = adapters.iter().map(|a| a.subscribe()).collect();
        Self { engine, streams }
    }

    /// Consume events until every stream closes or shutdown is signalled.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> eyre::Result<()> {
        info!(streams = self.streams.len(), "Event integrator started");

        let mut tasks = JoinSet::new();
        for mut stream in self.streams {
            let engine = Arc::clone(&self.engine);
            tasks.spawn(async move {
                loop {
                    match stream.recv().await {
                        Ok(event) => handle_event(&engine, event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Event stream lagged, events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            });
        }

        tokio::select! {
            _ = shutdown.recv() => {
                info!("Event integrator stopping");
                tasks.abort_all();
            }
            _ = tasks.join_next() => {
                warn!("An event stream closed");
            }
        }
        Ok(())
    }
}

/// Route one adapter event into the engine.
pub async fn handle_event(engine: &Arc<SwapEngine>, event: HtlcEvent) {
    match event {
        HtlcEvent::Withdrawn {
            handle, preimage, ..
        } => {
            let Some(swap_id) = engine.registry().swap_for_handle(&handle) else {
                debug!(handle = %handle, "Withdrawal for unknown handle");
                return;
            };
            debug!(swap_id = %swap_id, handle = %handle, "Preimage observed on chain");
            // Record which side was claimed before running the cascade.
            let _ = engine.registry().update(&swap_id, |r| {
                for side in [r.source_htlc.as_mut(), r.destination_htlc.as_mut()]
                    .into_iter()
                    .flatten()
                    .filter(|s| s.handle == handle && !s.withdrawn())
                {
                    side.mark_withdrawn()?;
                }
                Ok(())
            });
            if let Err(e) = engine.on_preimage_revealed(&swap_id, preimage).await {
                warn!(swap_id = %swap_id, error = %e, "Reveal handling failed");
            }
        }
        HtlcEvent::Refunded { handle, .. } => {
            let Some(swap_id) = engine.registry().swap_for_handle(&handle) else {
                return;
            };
            if let Err(e) = engine.on_refund_observed(&swap_id, handle).await {
                warn!(swap_id = %swap_id, error = %e, "Refund handling failed");
            }
        }
        HtlcEvent::Created { handle, .. } => {
            // Creation is driven by the engine itself; nothing to do.
            debug!(handle = %handle, "HTLC creation observed");
        }
    }
}
