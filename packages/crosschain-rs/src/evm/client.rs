//! EVM chain adapter backed by the HTLC factory contract.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::adapter::{ChainAdapter, EvmHandle, Handle, HtlcEvent, HtlcParams, HtlcState};
use crate::error::AdapterError;
use crate::evm::contracts::{HtlcFactory, ERC20};
use crate::retry::{with_retry, RetryConfig};
use crate::secret::{Hashlock, Secret};
use crate::types::{ChainTag, TxRef};

/// Capacity of the event fan-out channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Enclosing deadline for one adapter call, in seconds.
const CALL_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct EvmAdapterConfig {
    pub rpc_url: String,
    pub factory_address: String,
    pub token_address: String,
    /// 0x-prefixed 32-byte hex private key.
    pub private_key: String,
}

/// [`ChainAdapter`] implementation for the EVM chain.
pub struct EvmHtlcAdapter {
    rpc_url: String,
    factory: Address,
    token: Address,
    signer: PrivateKeySigner,
    retry: RetryConfig,
    events_tx: broadcast::Sender<HtlcEvent>,
}

impl EvmHtlcAdapter {
    pub fn new(config: &EvmAdapterConfig) -> eyre::Result<Self> {
        let factory = Address::from_str(&config.factory_address)
            .map_err(|_| eyre::eyre!("invalid factory address: {}", config.factory_address))?;
        let token = Address::from_str(&config.token_address)
            .map_err(|_| eyre::eyre!("invalid token address: {}", config.token_address))?;
        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .map_err(|_| eyre::eyre!("invalid EVM private key"))?;

        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            factory = %factory,
            token = %token,
            signer = %signer.address(),
            "EVM HTLC adapter initialized"
        );

        Ok(Self {
            rpc_url: config.rpc_url.clone(),
            factory,
            token,
            signer,
            retry: RetryConfig::default(),
            events_tx,
        })
    }

    /// The coordinator's own address on this chain.
    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    /// Build a watcher feeding this adapter's event stream.
    pub fn watcher(&self) -> crate::evm::watcher::EvmWatcher {
        crate::evm::watcher::EvmWatcher::new(
            self.rpc_url.clone(),
            self.factory,
            self.events_tx.clone(),
        )
    }

    fn provider(
        &self,
    ) -> Result<impl alloy::providers::Provider<alloy::transports::http::Http<alloy::transports::http::Client>>, AdapterError>
    {
        let url = self
            .rpc_url
            .parse()
            .map_err(|_| AdapterError::Transport(format!("invalid RPC URL: {}", self.rpc_url)))?;
        let wallet = EthereumWallet::from(self.signer.clone());
        Ok(ProviderBuilder::new().wallet(wallet).on_http(url))
    }

    fn evm_id(handle: &Handle) -> Result<B256, AdapterError> {
        match handle {
            Handle::Evm(h) => Ok(h.id),
            other => Err(AdapterError::Protocol(format!(
                "EVM adapter handed a {} handle",
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

    async fn fetch_htlc(&self, id: B256) -> Result<HtlcState, AdapterError> {
        let provider = self.provider()?;
        let factory = HtlcFactory::new(self.factory, &provider);
        let details = factory
            .getHTLC(id)
            .call()
            .await
            .map_err(map_contract_error)?;

        Ok(HtlcState {
            exists: details.exists,
            withdrawn: details.withdrawn,
            refunded: details.refunded,
            hashlock: Hashlock(details.hashlock.0),
            amount: details.amount,
            cancellation_deadline: details
                .cancellationDeadline
                .try_into()
                .unwrap_or(u64::MAX),
        })
    }
}

#[async_trait]
impl ChainAdapter for EvmHtlcAdapter {
    fn chain(&self) -> ChainTag {
        ChainTag::Evm
    }

    fn own_address(&self) -> String {
        format!("{:?}", self.signer.address())
    }

    async fn create_htlc(&self, params: &HtlcParams) -> Result<(Handle, TxRef), AdapterError> {
        // Addresses are validated before any transaction leaves the process.
        Address::from_str(&params.sender)
            .map_err(|_| AdapterError::InvalidSender(params.sender.clone()))?;
        let receiver = Address::from_str(&params.receiver)
            .map_err(|_| AdapterError::InvalidReceiver(params.receiver.clone()))?;
        let token = Address::from_str(&params.token)
            .map_err(|_| AdapterError::Protocol(format!("invalid token: {}", params.token)))?;

        let id = B256::from(*params.hashlock.as_bytes());
        let timelocks = params.timelocks;
        let amount = params.amount;
        let hashlock = B256::from(*params.hashlock.as_bytes());

        let tx = with_retry(&self.retry, || {
            Self::with_deadline(async {
                let provider = self.provider()?;
                let factory = HtlcFactory::new(self.factory, &provider);

                debug!(
                    id = %id,
                    receiver = %receiver,
                    amount = %amount,
                    cancellation = timelocks.cancellation(),
                    "Submitting createHTLC"
                );

                let pending = factory
                    .createHTLC(
                        receiver,
                        token,
                        amount,
                        hashlock,
                        U256::from(timelocks.finality()),
                        U256::from(timelocks.resolver()),
                        U256::from(timelocks.public()),
                        U256::from(timelocks.cancellation()),
                    )
                    .send()
                    .await
                    .map_err(map_contract_error)?;

                let tx_hash = *pending.tx_hash();
                let receipt = pending
                    .get_receipt()
                    .await
                    .map_err(|e| AdapterError::Transport(e.to_string()))?;
                if !receipt.status() {
                    return Err(AdapterError::Protocol("createHTLC reverted".into()));
                }

                Ok(TxRef {
                    tx_id: format!("0x{:x}", tx_hash),
                    block: receipt.block_number.unwrap_or_default(),
                })
            })
        })
        .await?;

        let handle = Handle::Evm(EvmHandle { id });
        let _ = self.events_tx.send(HtlcEvent::Created {
            handle,
            tx: tx.clone(),
        });
        Ok((handle, tx))
    }

    async fn withdraw(&self, handle: &Handle, secret: &Secret) -> Result<TxRef, AdapterError> {
        let id = Self::evm_id(handle)?;
        let preimage = B256::from(*secret.as_bytes());

        with_retry(&self.retry, || {
            Self::with_deadline(async {
                let provider = self.provider()?;
                let factory = HtlcFactory::new(self.factory, &provider);

                let pending = factory
                    .withdraw(id, preimage)
                    .send()
                    .await
                    .map_err(map_contract_error)?;

                let tx_hash = *pending.tx_hash();
                let receipt = pending
                    .get_receipt()
                    .await
                    .map_err(|e| AdapterError::Transport(e.to_string()))?;
                if !receipt.status() {
                    return Err(AdapterError::Protocol("withdraw reverted".into()));
                }

                Ok(TxRef {
                    tx_id: format!("0x{:x}", tx_hash),
                    block: receipt.block_number.unwrap_or_default(),
                })
            })
        })
        .await
    }

    async fn refund(&self, handle: &Handle) -> Result<TxRef, AdapterError> {
        let id = Self::evm_id(handle)?;

        with_retry(&self.retry, || {
            Self::with_deadline(async {
                let provider = self.provider()?;
                let factory = HtlcFactory::new(self.factory, &provider);

                let pending = factory
                    .refund(id)
                    .send()
                    .await
                    .map_err(map_contract_error)?;

                let tx_hash = *pending.tx_hash();
                let receipt = pending
                    .get_receipt()
                    .await
                    .map_err(|e| AdapterError::Transport(e.to_string()))?;
                if !receipt.status() {
                    return Err(AdapterError::Protocol("refund reverted".into()));
                }

                Ok(TxRef {
                    tx_id: format!("0x{:x}", tx_hash),
                    block: receipt.block_number.unwrap_or_default(),
                })
            })
        })
        .await
    }

    async fn can_withdraw(&self, handle: &Handle, secret: &Secret) -> Result<bool, AdapterError> {
        let id = Self::evm_id(handle)?;
        let state = Self::with_deadline(self.fetch_htlc(id)).await?;
        if !state.exists || state.withdrawn || state.refunded {
            return Ok(false);
        }
        Ok(crate::secret::verify(secret, &state.hashlock))
    }

    async fn can_refund(&self, handle: &Handle) -> Result<bool, AdapterError> {
        let id = Self::evm_id(handle)?;
        let state = Self::with_deadline(self.fetch_htlc(id)).await?;
        if !state.exists || state.withdrawn || state.refunded {
            return Ok(false);
        }
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(now >= state.cancellation_deadline)
    }

    async fn info(&self, handle: &Handle) -> Result<HtlcState, AdapterError> {
        let id = Self::evm_id(handle)?;
        Self::with_deadline(self.fetch_htlc(id)).await
    }

    fn subscribe(&self) -> broadcast::Receiver<HtlcEvent> {
        self.events_tx.subscribe()
    }

    async fn balance(&self) -> Result<U256, AdapterError> {
        let owner = self.signer.address();
        Self::with_deadline(async {
            let provider = self.provider()?;
            let token = ERC20::new(self.token, &provider);
            let balance = token
                .balanceOf(owner)
                .call()
                .await
                .map_err(map_contract_error)?;
            Ok(balance._0)
        })
        .await
    }
}

/// Map an alloy contract error onto the adapter taxonomy by inspecting the
/// revert/transport message.
fn map_contract_error(e: alloy::contract::Error) -> AdapterError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();

    if lower.contains("invalid secret") || lower.contains("hashlock mismatch") {
        AdapterError::InvalidSecret
    } else if lower.contains("already withdrawn") {
        AdapterError::AlreadyWithdrawn
    } else if lower.contains("already refunded") {
        AdapterError::AlreadyRefunded
    } else if lower.contains("window closed") || lower.contains("too late") {
        AdapterError::WindowClosed
    } else if lower.contains("timelock not expired") || lower.contains("too early") {
        AdapterError::TimelockNotExpired
    } else if lower.contains("invalid timelock") || lower.contains("deadline in past") {
        AdapterError::InvalidTimelock
    } else if lower.contains("insufficient") {
        AdapterError::InsufficientBalance
    } else if lower.contains("not found") || lower.contains("unknown htlc") {
        AdapterError::HtlcNotFound(msg)
    } else if lower.contains("timeout")
        || lower.contains("connection")
        || lower.contains("network")
        || lower.contains("rate limit")
        || lower.contains("503")
        || lower.contains("502")
    {
        AdapterError::Transport(msg)
    } else if lower.contains("revert") {
        AdapterError::Protocol(msg)
    } else {
        AdapterError::Transport(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EvmAdapterConfig {
        EvmAdapterConfig {
            rpc_url: "http://localhost:8545".to_string(),
            factory_address: "0x0000000000000000000000000000000000000001".to_string(),
            token_address: "0x0000000000000000000000000000000000000002".to_string(),
            private_key: "0x0000000000000000000000000000000000000000000000000000000000000001"
                .to_string(),
        }
    }

    #[test]
    fn test_adapter_construction() {
        let adapter = EvmHtlcAdapter::new(&test_config()).unwrap();
        assert_eq!(adapter.chain(), ChainTag::Evm);
    }

    #[test]
    fn test_invalid_factory_address_rejected() {
        let mut config = test_config();
        config.factory_address = "not-an-address".to_string();
        assert!(EvmHtlcAdapter::new(&config).is_err());
    }

    #[test]
    fn test_rejects_solana_handle() {
        let handle = Handle::Solana(crate::adapter::SolanaHandle {
            escrow: solana_sdk::pubkey::Pubkey::new_unique(),
        });
        assert!(EvmHtlcAdapter::evm_id(&handle).is_err());
    }
}
