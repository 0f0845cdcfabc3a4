//! Command-line surface of the coordinator.

use alloy::primitives::U256;
use clap::{Parser, Subcommand};
use crosschain_rs::evm::EvmHtlcAdapter;
use crosschain_rs::solana::SolanaHtlcAdapter;
use crosschain_rs::{ChainAdapter, ChainTag, SwapId, SystemClock};
use eyre::{eyre, Result, WrapErr};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::Config;
use crate::engine::SwapEngine;
use crate::events::EventIntegrator;
use crate::liquidity::LiquidityLedger;
use crate::recovery::RecoveryDriver;
use crate::registry::SwapRegistry;
use crate::types::{SwapRequest, SwapState};

#[derive(Debug, Parser)]
#[command(
    name = "swap-coordinator",
    about = "EVM to Solana atomic-swap coordinator",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load configuration, connect to both chains, and report readiness.
    Init,
    /// Credit the coordinator's tracked liquidity.
    Fund {
        #[arg(long)]
        amount: String,
        /// Chain to credit (evm or solana).
        #[arg(long, default_value = "evm")]
        chain: String,
    },
    /// Initiate a swap and follow it to a terminal state.
    Swap {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: String,
        /// Sender address on the source chain.
        #[arg(long)]
        sender: String,
        /// Receiver address on the destination chain.
        #[arg(long)]
        receiver: String,
    },
    /// Run the coordinator: event watchers, integrator, recovery driver.
    Monitor,
    /// Run a single recovery scan and report the actions taken.
    Recover,
    /// Show one swap's status.
    Status {
        #[arg(long)]
        id: String,
    },
}

/// Everything one process needs to coordinate swaps.
pub struct Coordinator {
    pub engine: Arc<SwapEngine>,
    pub evm: Arc<EvmHtlcAdapter>,
    pub solana: Arc<SolanaHtlcAdapter>,
}

impl Coordinator {
    /// Assemble adapters, registry, ledger, and engine from configuration.
    pub fn build(config: Config) -> Result<Self> {
        let clock = Arc::new(SystemClock);

        let evm = Arc::new(EvmHtlcAdapter::new(&crosschain_rs::evm::EvmAdapterConfig {
            rpc_url: config.evm.rpc_url.clone(),
            factory_address: config.evm.htlc_factory_address.clone(),
            token_address: config.evm.token_address.clone(),
            private_key: config.evm.private_key.clone(),
        })?);
        let solana = Arc::new(SolanaHtlcAdapter::new(
            &crosschain_rs::solana::SolanaAdapterConfig {
                rpc_url: config.solana.rpc_url.clone(),
                program_id: config.solana.program_id.clone(),
                token_mint: config.solana.token_mint.clone(),
                keypair: config.solana.keypair.clone(),
            },
        )?);

        let registry = Arc::new(SwapRegistry::new(clock.clone()));
        let liquidity = Arc::new(LiquidityLedger::new(clock.clone()));
        liquidity.register_chain(ChainTag::Evm, config.evm.token_address.clone(), U256::ZERO);
        liquidity.register_chain(
            ChainTag::Solana,
            config.solana.token_mint.clone(),
            U256::ZERO,
        );

        let mut adapters: HashMap<ChainTag, Arc<dyn ChainAdapter>> = HashMap::new();
        adapters.insert(ChainTag::Evm, evm.clone());
        adapters.insert(ChainTag::Solana, solana.clone());

        let engine = Arc::new(SwapEngine::new(
            config,
            clock,
            registry,
            liquidity,
            adapters,
        ));

        Ok(Self {
            engine,
            evm,
            solana,
        })
    }

    /// Pull fresh on-chain balances into the ledger.
    pub async fn refresh_balances(&self) -> Result<()> {
        let evm_balance = self
            .engine
            .liquidity()
            .refresh_balance(ChainTag::Evm, self.evm.as_ref())
            .await?;
        let sol_balance = self
            .engine
            .liquidity()
            .refresh_balance(ChainTag::Solana, self.solana.as_ref())
            .await?;
        info!(evm = %evm_balance, solana = %sol_balance, "Balances refreshed");
        Ok(())
    }
}

pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init => init().await,
        Command::Fund { amount, chain } => fund(&amount, &chain).await,
        Command::Swap {
            from,
            to,
            amount,
            sender,
            receiver,
        } => swap(&from, &to, &amount, &sender, &receiver).await,
        Command::Monitor => monitor().await,
        Command::Recover => recover().await,
        Command::Status { id } => status(&id).await,
    }
}

async fn init() -> Result<()> {
    let config = Config::load()?;
    let coordinator = Coordinator::build(config)?;
    coordinator.refresh_balances().await?;

    let evm = coordinator.engine.liquidity().status(ChainTag::Evm)?;
    let solana = coordinator.engine.liquidity().status(ChainTag::Solana)?;
    println!("{}", serde_json::to_string_pretty(&(evm, solana))?);
    info!("Coordinator initialized");
    Ok(())
}

async fn fund(amount: &str, chain: &str) -> Result<()> {
    let config = Config::load()?;
    let coordinator = Coordinator::build(config)?;
    let chain = ChainTag::from_str(chain)?;
    let amount = U256::from_str(amount).map_err(|_| eyre!("invalid amount: {}", amount))?;

    coordinator.engine.liquidity().deposit(chain, amount);
    let status = coordinator.engine.liquidity().status(chain)?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn swap(from: &str, to: &str, amount: &str, sender: &str, receiver: &str) -> Result<()> {
    let config = Config::load()?;
    let coordinator = Coordinator::build(config)?;
    coordinator.refresh_balances().await?;

    let request = SwapRequest {
        source: ChainTag::from_str(from)?,
        destination: ChainTag::from_str(to)?,
        amount: U256::from_str(amount).map_err(|_| eyre!("invalid amount: {}", amount))?,
        sender: sender.to_string(),
        receiver: receiver.to_string(),
        secret: None,
        hashlock: None,
    };

    let initial = coordinator.engine.initiate(request)?;
    info!(swap_id = %initial.id, "Swap accepted");
    println!("{}", serde_json::to_string_pretty(&initial)?);

    // Follow the swap until it settles; the engine's own tasks drive it.
    let deadline = Duration::from_secs(
        coordinator.engine.config().timelocks.finality
            + coordinator.engine.config().timelocks.resolver_exclusive
            + coordinator.engine.config().timelocks.public_withdrawal
            + coordinator.engine.config().timelocks.cancellation
            + 60,
    );
    let settled = tokio::time::timeout(deadline, async {
        let mut last = initial.state;
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let current = match coordinator.engine.get_status(&initial.id) {
                Ok(status) => status,
                Err(e) => {
                    error!(error = %e, "Status poll failed");
                    continue;
                }
            };
            if current.state != last {
                info!(swap_id = %current.id, state = %current.state, "Swap progressed");
                last = current.state;
            }
            if current.state.is_terminal() {
                return current;
            }
        }
    })
    .await
    .map_err(|_| eyre!("swap did not settle before the cancellation deadline"))?;

    println!("{}", serde_json::to_string_pretty(&settled)?);
    if settled.state == SwapState::Completed {
        Ok(())
    } else {
        Err(eyre!(
            "swap ended in state {} ({})",
            settled.state,
            settled.error.unwrap_or_default()
        ))
    }
}

async fn monitor() -> Result<()> {
    let config = Config::load()?;
    let coordinator = Coordinator::build(config)?;
    coordinator.refresh_balances().await?;

    let clock = Arc::new(SystemClock);

    // One shutdown channel per long-lived task, fanned out from the signal
    // handler.
    let (shutdown_evm_tx, shutdown_evm_rx) = mpsc::channel::<()>(1);
    let (shutdown_sol_tx, shutdown_sol_rx) = mpsc::channel::<()>(1);
    let (shutdown_int_tx, shutdown_int_rx) = mpsc::channel::<()>(1);
    let (shutdown_rec_tx, shutdown_rec_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_evm_tx.send(()).await;
        let _ = shutdown_sol_tx.send(()).await;
        let _ = shutdown_int_tx.send(()).await;
        let _ = shutdown_rec_tx.send(()).await;
    });

    let evm_watcher = coordinator.evm.watcher();
    let sol_watcher = coordinator.solana.watcher();
    let integrator = EventIntegrator::new(
        coordinator.engine.clone(),
        &[
            coordinator.evm.clone() as Arc<dyn ChainAdapter>,
            coordinator.solana.clone() as Arc<dyn ChainAdapter>,
        ],
    );
    let recovery = RecoveryDriver::new(coordinator.engine.clone(), clock);

    info!("Coordinator monitoring both chains");

    tokio::select! {
        result = evm_watcher.run(shutdown_evm_rx) => {
            if let Err(e) = result {
                error!(error = %e, "EVM watcher error");
            }
        }
        result = sol_watcher.run(shutdown_sol_rx) => {
            if let Err(e) = result {
                error!(error = %e, "Solana watcher error");
            }
        }
        result = integrator.run(shutdown_int_rx) => {
            if let Err(e) = result {
                error!(error = %e, "Event integrator error");
            }
        }
        result = recovery.run(shutdown_rec_rx) => {
            if let Err(e) = result {
                error!(error = %e, "Recovery driver error");
            }
        }
    }

    info!("Coordinator stopped");
    Ok(())
}

async fn recover() -> Result<()> {
    let config = Config::load()?;
    let coordinator = Coordinator::build(config)?;
    coordinator.refresh_balances().await?;

    let recovery = RecoveryDriver::new(coordinator.engine.clone(), Arc::new(SystemClock));
    let actions = recovery.scan_once().await;
    println!("{}", serde_json::to_string_pretty(&actions)?);
    Ok(())
}

async fn status(id: &str) -> Result<()> {
    let config = Config::load()?;
    let coordinator = Coordinator::build(config)?;

    let status = coordinator
        .engine
        .get_status(&SwapId::from(id))
        .wrap_err_with(|| format!("no swap with id {}", id))?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Wait for shutdown signals (SIGINT/SIGTERM).
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
