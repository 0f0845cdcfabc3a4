//! Solana escrow account poller.
//!
//! Polls every escrow account owned by the HTLC program and broadcasts
//! state changes as [`HtlcEvent`]s. A withdrawn escrow stores the revealed
//! preimage in its account data, which is how the preimage crosses back to
//! the coordinator.

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use crate::adapter::{Handle, HtlcEvent, SolanaHandle};
use crate::secret::Secret;
use crate::solana::program::HtlcAccount;
use crate::types::TxRef;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Tracked flags for one escrow between polls.
#[derive(Debug, Clone, Copy, Default)]
struct EscrowFlags {
    withdrawn: bool,
    refunded: bool,
}

/// Polls program accounts and forwards state changes to subscribers.
pub struct SolanaWatcher {
    rpc: Arc<RpcClient>,
    program_id: Pubkey,
    events_tx: broadcast::Sender<HtlcEvent>,
    poll_interval: Duration,
}

impl SolanaWatcher {
    pub fn new(
        rpc: Arc<RpcClient>,
        program_id: Pubkey,
        events_tx: broadcast::Sender<HtlcEvent>,
    ) -> Self {
        Self {
            rpc,
            program_id,
            events_tx,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Run the poll loop until a shutdown signal arrives.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> eyre::Result<()> {
        info!(program_id = %self.program_id, "Solana watcher started");
        let mut known: HashMap<Pubkey, EscrowFlags> = HashMap::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Solana watcher stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let accounts = match self.rpc.get_program_accounts(&self.program_id).await {
                Ok(accounts) => accounts,
                Err(e) => {
                    error!(error = %e, "Failed to fetch program accounts");
                    continue;
                }
            };
            let slot = self.rpc.get_slot().await.unwrap_or_default();

            for (escrow, account) in accounts {
                let state = match HtlcAccount::try_from_account_data(&account.data) {
                    Ok(state) => state,
                    Err(_) => continue, // not an escrow account
                };

                let handle = Handle::Solana(SolanaHandle { escrow });
                let previous = known.get(&escrow).copied();
                let tx = TxRef {
                    tx_id: String::new(),
                    block: slot,
                };

                match previous {
                    None => {
                        debug!(escrow = %escrow, "New escrow observed");
                        let _ = self.events_tx.send(HtlcEvent::Created {
                            handle,
                            tx: tx.clone(),
                        });
                    }
                    Some(flags) => {
                        if state.withdrawn && !flags.withdrawn {
                            let _ = self.events_tx.send(HtlcEvent::Withdrawn {
                                handle,
                                preimage: Secret::new(state.preimage),
                                tx: tx.clone(),
                            });
                        }
                        if state.refunded && !flags.refunded {
                            let _ = self.events_tx.send(HtlcEvent::Refunded {
                                handle,
                                tx: tx.clone(),
                            });
                        }
                    }
                }

                known.insert(
                    escrow,
                    EscrowFlags {
                        withdrawn: state.withdrawn,
                        refunded: state.refunded,
                    },
                );
            }
        }
    }
}
