//! EVM log watcher for HTLC lifecycle events.
//!
//! Polls the factory's logs and broadcasts decoded [`HtlcEvent`]s. The
//! withdrawal event carries the revealed preimage in its data word.

use alloy::primitives::{keccak256, Address, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use eyre::{Result, WrapErr};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use crate::adapter::{EvmHandle, Handle, HtlcEvent};
use crate::secret::Secret;
use crate::types::TxRef;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polls factory logs and forwards decoded events to subscribers.
pub struct EvmWatcher {
    rpc_url: String,
    factory: Address,
    events_tx: broadcast::Sender<HtlcEvent>,
    poll_interval: Duration,
}

impl EvmWatcher {
    pub fn new(rpc_url: String, factory: Address, events_tx: broadcast::Sender<HtlcEvent>) -> Self {
        Self {
            rpc_url,
            factory,
            events_tx,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Run the poll loop until a shutdown signal arrives.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let url = self.rpc_url.parse().wrap_err("invalid EVM RPC URL")?;
        let provider = ProviderBuilder::new().on_http(url);

        let mut last_block = provider
            .get_block_number()
            .await
            .wrap_err("failed to query initial block number")?;

        info!(factory = %self.factory, from_block = last_block, "EVM watcher started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("EVM watcher stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let current = match provider.get_block_number().await {
                Ok(n) => n,
                Err(e) => {
                    error!(error = %e, "Failed to poll block number");
                    continue;
                }
            };
            if current <= last_block {
                continue;
            }

            let filter = Filter::new()
                .address(self.factory)
                .from_block(last_block + 1)
                .to_block(current);

            match provider.get_logs(&filter).await {
                Ok(logs) => {
                    for log in logs {
                        if let Some(event) = decode_htlc_log(&log) {
                            debug!(handle = %event.handle(), "EVM HTLC event observed");
                            let _ = self.events_tx.send(event);
                        }
                    }
                    last_block = current;
                }
                Err(e) => {
                    error!(error = %e, "Failed to fetch factory logs");
                }
            }
        }
    }
}

/// keccak256("HTLCCreated(bytes32,address,address,uint256,bytes32)")
fn created_signature() -> B256 {
    keccak256(b"HTLCCreated(bytes32,address,address,uint256,bytes32)")
}

/// keccak256("HTLCWithdrawn(bytes32,bytes32)")
fn withdrawn_signature() -> B256 {
    keccak256(b"HTLCWithdrawn(bytes32,bytes32)")
}

/// keccak256("HTLCRefunded(bytes32)")
fn refunded_signature() -> B256 {
    keccak256(b"HTLCRefunded(bytes32)")
}

/// Decode one factory log into an [`HtlcEvent`].
///
/// Topic layout: `topics[0]` is the event signature, `topics[1]` the HTLC
/// id. For withdrawals the 32-byte preimage is the first data word.
fn decode_htlc_log(log: &Log) -> Option<HtlcEvent> {
    let topics = log.topics();
    if topics.len() < 2 {
        return None;
    }

    let handle = Handle::Evm(EvmHandle { id: topics[1] });
    let tx = TxRef {
        tx_id: log
            .transaction_hash
            .map(|h| format!("0x{:x}", h))
            .unwrap_or_default(),
        block: log.block_number.unwrap_or_default(),
    };

    let signature = topics[0];
    if signature == created_signature() {
        Some(HtlcEvent::Created { handle, tx })
    } else if signature == withdrawn_signature() {
        let data = log.data().data.as_ref();
        if data.len() < 32 {
            return None;
        }
        let mut preimage = [0u8; 32];
        preimage.copy_from_slice(&data[..32]);
        Some(HtlcEvent::Withdrawn {
            handle,
            preimage: Secret::new(preimage),
            tx,
        })
    } else if signature == refunded_signature() {
        Some(HtlcEvent::Refunded { handle, tx })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signatures_are_distinct() {
        assert_ne!(created_signature(), withdrawn_signature());
        assert_ne!(withdrawn_signature(), refunded_signature());
        assert_ne!(created_signature(), refunded_signature());
    }
}
