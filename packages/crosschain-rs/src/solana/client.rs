//! Solana chain adapter backed by the HTLC escrow program.

use alloy::primitives::U256;
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::adapter::{ChainAdapter, Handle, HtlcEvent, HtlcParams, HtlcState, SolanaHandle};
use crate::error::AdapterError;
use crate::retry::{with_retry, RetryConfig};
use crate::secret::{Hashlock, Secret};
use crate::solana::program::{
    self, associated_token_account, escrow_address, CreateArgs, HtlcAccount,
};
use crate::types::{ChainTag, TxRef};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const CALL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct SolanaAdapterConfig {
    pub rpc_url: String,
    pub program_id: String,
    pub token_mint: String,
    /// Keypair as a base58 string or a JSON byte-array literal.
    pub keypair: String,
}

/// [`ChainAdapter`] implementation for Solana.
pub struct SolanaHtlcAdapter {
    rpc: Arc<RpcClient>,
    program_id: Pubkey,
    token_mint: Pubkey,
    payer: Arc<Keypair>,
    retry: RetryConfig,
    events_tx: broadcast::Sender<HtlcEvent>,
}

impl SolanaHtlcAdapter {
    pub fn new(config: &SolanaAdapterConfig) -> eyre::Result<Self> {
        let program_id = Pubkey::from_str(&config.program_id)
            .map_err(|_| eyre::eyre!("invalid program id: {}", config.program_id))?;
        let token_mint = Pubkey::from_str(&config.token_mint)
            .map_err(|_| eyre::eyre!("invalid token mint: {}", config.token_mint))?;
        let payer = Arc::new(load_keypair(&config.keypair)?);

        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            program_id = %program_id,
            token_mint = %token_mint,
            payer = %payer.pubkey(),
            "Solana HTLC adapter initialized"
        );

        Ok(Self {
            rpc: Arc::new(RpcClient::new(config.rpc_url.clone())),
            program_id,
            token_mint,
            payer,
            retry: RetryConfig::default(),
            events_tx,
        })
    }

    /// The coordinator's own address on this chain.
    pub fn payer_address(&self) -> Pubkey {
        self.payer.pubkey()
    }

    /// Build a watcher feeding this adapter's event stream.
    pub fn watcher(&self) -> crate::solana::watcher::SolanaWatcher {
        crate::solana::watcher::SolanaWatcher::new(
            Arc::clone(&self.rpc),
            self.program_id,
            self.events_tx.clone(),
        )
    }

    fn escrow_of(handle: &Handle) -> Result<Pubkey, AdapterError> {
        match handle {
            Handle::Solana(h) => Ok(h.escrow),
            other => Err(AdapterError::Protocol(format!(
                "Solana adapter handed a {} handle",
                other.chain()
            ))),
        }
    }

    async fn with_deadline<T, Fut>(fut: Fut) -> Result<T, AdapterError>
    where
        Fut: std::future::Future<Output = Result<T, AdapterError>>,
    {
        tokio::time::timeout(Duration::from_secs(CALL_TIMEOUT_SECS), fut)
            .await
            .map_err(|_| AdapterError::Timeout(CALL_TIMEOUT_SECS))?
    }

    async fn send_instruction(
        &self,
        instruction: solana_sdk::instruction::Instruction,
    ) -> Result<TxRef, AdapterError> {
        let blockhash = self
            .rpc
            .get_latest_blockhash()
            .await
            .map_err(map_rpc_error)?;

        let tx = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&self.payer.pubkey()),
            &[self.payer.as_ref()],
            blockhash,
        );

        let signature = self
            .rpc
            .send_and_confirm_transaction(&tx)
            .await
            .map_err(map_rpc_error)?;
        let slot = self.rpc.get_slot().await.map_err(map_rpc_error)?;

        Ok(TxRef {
            tx_id: signature.to_string(),
            block: slot,
        })
    }

    async fn fetch_escrow(&self, escrow: &Pubkey) -> Result<Option<HtlcAccount>, AdapterError> {
        match self.rpc.get_account(escrow).await {
            Ok(account) => {
                let state = HtlcAccount::try_from_account_data(&account.data)
                    .map_err(|e| AdapterError::Protocol(e.to_string()))?;
                Ok(Some(state))
            }
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("AccountNotFound") || msg.contains("could not find account") {
                    Ok(None)
                } else {
                    Err(map_rpc_error(e))
                }
            }
        }
    }
}

#[async_trait]
impl ChainAdapter for SolanaHtlcAdapter {
    fn chain(&self) -> ChainTag {
        ChainTag::Solana
    }

    fn own_address(&self) -> String {
        self.payer.pubkey().to_string()
    }

    async fn create_htlc(&self, params: &HtlcParams) -> Result<(Handle, TxRef), AdapterError> {
        Pubkey::from_str(&params.sender)
            .map_err(|_| AdapterError::InvalidSender(params.sender.clone()))?;
        let receiver = Pubkey::from_str(&params.receiver)
            .map_err(|_| AdapterError::InvalidReceiver(params.receiver.clone()))?;

        // SPL token amounts are u64; anything wider cannot be locked here.
        let amount: u64 = params
            .amount
            .try_into()
            .map_err(|_| AdapterError::Protocol("amount exceeds u64 range".into()))?;

        let args = CreateArgs {
            receiver: receiver.to_bytes(),
            amount,
            hashlock: *params.hashlock.as_bytes(),
            finality_deadline: params.timelocks.finality(),
            resolver_deadline: params.timelocks.resolver(),
            public_deadline: params.timelocks.public(),
            cancellation_deadline: params.timelocks.cancellation(),
        };

        let escrow = escrow_address(&self.program_id, &args.hashlock);
        debug!(escrow = %escrow, amount, "Submitting HTLC create");

        let instruction =
            program::create_instruction(&self.program_id, &self.payer.pubkey(), &self.token_mint, &args)
                .map_err(|e| AdapterError::Protocol(e.to_string()))?;

        let tx = with_retry(&self.retry, || {
            let ix = instruction.clone();
            Self::with_deadline(async move { self.send_instruction(ix).await })
        })
        .await?;

        let handle = Handle::Solana(SolanaHandle { escrow });
        let _ = self.events_tx.send(HtlcEvent::Created {
            handle,
            tx: tx.clone(),
        });
        Ok((handle, tx))
    }

    async fn withdraw(&self, handle: &Handle, secret: &Secret) -> Result<TxRef, AdapterError> {
        let escrow = Self::escrow_of(handle)?;

        let instruction = program::withdraw_instruction(
            &self.program_id,
            &self.payer.pubkey(),
            &self.token_mint,
            &escrow,
            secret.as_bytes(),
        )
        .map_err(|e| AdapterError::Protocol(e.to_string()))?;

        with_retry(&self.retry, || {
            let ix = instruction.clone();
            Self::with_deadline(async move { self.send_instruction(ix).await })
        })
        .await
    }

    async fn refund(&self, handle: &Handle) -> Result<TxRef, AdapterError> {
        let escrow = Self::escrow_of(handle)?;

        let instruction = program::refund_instruction(
            &self.program_id,
            &self.payer.pubkey(),
            &self.token_mint,
            &escrow,
        )
        .map_err(|e| AdapterError::Protocol(e.to_string()))?;

        with_retry(&self.retry, || {
            let ix = instruction.clone();
            Self::with_deadline(async move { self.send_instruction(ix).await })
        })
        .await
    }

    async fn can_withdraw(&self, handle: &Handle, secret: &Secret) -> Result<bool, AdapterError> {
        let escrow = Self::escrow_of(handle)?;
        let state = Self::with_deadline(self.fetch_escrow(&escrow)).await?;
        Ok(match state {
            Some(s) if !s.withdrawn && !s.refunded => {
                crate::secret::verify(secret, &Hashlock(s.hashlock))
            }
            _ => false,
        })
    }

    async fn can_refund(&self, handle: &Handle) -> Result<bool, AdapterError> {
        let escrow = Self::escrow_of(handle)?;
        let state = Self::with_deadline(self.fetch_escrow(&escrow)).await?;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(match state {
            Some(s) => !s.withdrawn && !s.refunded && now >= s.cancellation_deadline,
            None => false,
        })
    }

    async fn info(&self, handle: &Handle) -> Result<HtlcState, AdapterError> {
        let escrow = Self::escrow_of(handle)?;
        let state = Self::with_deadline(self.fetch_escrow(&escrow)).await?;
        Ok(match state {
            Some(s) => HtlcState {
                exists: true,
                withdrawn: s.withdrawn,
                refunded: s.refunded,
                hashlock: Hashlock(s.hashlock),
                amount: U256::from(s.amount),
                cancellation_deadline: s.cancellation_deadline,
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
        let ata = associated_token_account(&self.payer.pubkey(), &self.token_mint)
            .map_err(|e| AdapterError::Protocol(e.to_string()))?;

        Self::with_deadline(async {
            let balance = self
                .rpc
                .get_token_account_balance(&ata)
                .await
                .map_err(map_rpc_error)?;
            balance
                .amount
                .parse::<U256>()
                .map_err(|_| AdapterError::Protocol("unparseable token balance".into()))
        })
        .await
    }
}

/// Parse the configured keypair: a JSON byte-array literal (solana-keygen
/// format) or a base58-encoded 64-byte secret.
pub fn load_keypair(raw: &str) -> eyre::Result<Keypair> {
    let trimmed = raw.trim();
    let bytes: Vec<u8> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| eyre::eyre!("invalid keypair JSON: {}", e))?
    } else {
        bs58::decode(trimmed)
            .into_vec()
            .map_err(|e| eyre::eyre!("invalid base58 keypair: {}", e))?
    };
    Keypair::from_bytes(&bytes).map_err(|e| eyre::eyre!("invalid keypair bytes: {}", e))
}

fn map_rpc_error(e: solana_client::client_error::ClientError) -> AdapterError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();

    if lower.contains("invalid secret") || lower.contains("hashlock") {
        AdapterError::InvalidSecret
    } else if lower.contains("already withdrawn") {
        AdapterError::AlreadyWithdrawn
    } else if lower.contains("already refunded") {
        AdapterError::AlreadyRefunded
    } else if lower.contains("window closed") {
        AdapterError::WindowClosed
    } else if lower.contains("timelock not expired") {
        AdapterError::TimelockNotExpired
    } else if lower.contains("insufficient") {
        AdapterError::InsufficientBalance
    } else if lower.contains("accountnotfound") {
        AdapterError::HtlcNotFound(msg)
    } else {
        AdapterError::Transport(msg)
    }
}
