//! Chain client with multi-RPC support and automatic failover

use super::{ChainReader, ChainSubmitter, InclusionReceipt, LatestBlock};
use crate::config::ChainConfig;
use crate::error::{BlobTxError, BlobTxResult};
use crate::tx::SignedBlobTransaction;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use ethers::providers::{Http, Provider, ProviderError, RpcError};
use ethers::types::{H256, U256, U64};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Header fields of `eth_getBlockByNumber` needed for pricing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlockHeader {
    number: Option<U64>,
    base_fee_per_gas: Option<U256>,
    excess_blob_gas: Option<U256>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    block_number: Option<U64>,
    status: Option<U64>,
}

/// Multi-provider JSON-RPC client with automatic failover
pub struct RpcChainClient {
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl RpcChainClient {
    /// Create a new chain client
    pub fn new(config: &ChainConfig) -> BlobTxResult<Self> {
        let mut http_providers = Vec::new();

        for url in config.rpc_urls.iter().filter(|url| !url.trim().is_empty()) {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider: {}", url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(BlobTxError::Config("No valid RPC providers".to_string()));
        }

        Ok(Self {
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Failover to provider {}", next);
    }

    /// Read-only request, trying each provider once
    async fn request<P, R>(&self, method: &str, params: P) -> BlobTxResult<R>
    where
        P: Debug + Serialize + Clone + Send + Sync,
        R: Debug + Serialize + DeserializeOwned + Send,
    {
        let mut last_error = String::new();

        for _ in 0..self.http_providers.len() {
            match self.http().request::<P, R>(method, params.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!("{} failed: {}", method, e);
                    last_error = e.to_string();
                    self.failover();
                }
            }
        }

        Err(BlobTxError::ChainStateUnavailable(format!(
            "{}: all providers failed: {}",
            method, last_error
        )))
    }
}

fn to_u64(value: U256, field: &str) -> BlobTxResult<u64> {
    if value.bits() > 64 {
        return Err(BlobTxError::ChainStateUnavailable(format!(
            "{} out of range: {}",
            field, value
        )));
    }
    Ok(value.as_u64())
}

fn to_u128(value: U256, field: &str) -> BlobTxResult<u128> {
    if value.bits() > 128 {
        return Err(BlobTxError::ChainStateUnavailable(format!(
            "{} out of range: {}",
            field, value
        )));
    }
    Ok(value.as_u128())
}

#[async_trait]
impl ChainReader for RpcChainClient {
    async fn chain_id(&self) -> BlobTxResult<u64> {
        let chain_id: U256 = self.request("eth_chainId", ()).await?;
        to_u64(chain_id, "chain id")
    }

    async fn nonce(&self, address: Address) -> BlobTxResult<u64> {
        let nonce: U256 = self
            .request("eth_getTransactionCount", (address, "latest"))
            .await?;
        to_u64(nonce, "nonce")
    }

    async fn latest_block(&self) -> BlobTxResult<LatestBlock> {
        let header: Option<RpcBlockHeader> = self
            .request("eth_getBlockByNumber", ("latest", false))
            .await?;
        let header = header.ok_or_else(|| {
            BlobTxError::ChainStateUnavailable("Node returned no latest block".to_string())
        })?;

        Ok(LatestBlock {
            number: header.number.map(|n| n.as_u64()),
            base_fee_per_gas: header
                .base_fee_per_gas
                .map(|fee| to_u128(fee, "base fee"))
                .transpose()?,
            excess_blob_gas: header
                .excess_blob_gas
                .map(|gas| to_u64(gas, "excess blob gas"))
                .transpose()?,
        })
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> BlobTxResult<Option<InclusionReceipt>> {
        let receipt: Option<RpcReceipt> = self
            .request("eth_getTransactionReceipt", [tx_hash])
            .await?;

        Ok(receipt.and_then(|receipt| {
            receipt.block_number.map(|block| InclusionReceipt {
                block_number: block.as_u64(),
                success: receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false),
            })
        }))
    }
}

#[async_trait]
impl ChainSubmitter for RpcChainClient {
    async fn submit(&self, tx: &SignedBlobTransaction) -> BlobTxResult<B256> {
        let raw = format!("0x{}", hex::encode(tx.network_encoding()));

        // No failover here: a transport error leaves the submission outcome unknown
        let node_hash: H256 = self
            .http()
            .request("eth_sendRawTransaction", [raw])
            .await
            .map_err(submission_error)?;

        Ok(B256::from(node_hash.0))
    }
}

/// Only a JSON-RPC error response proves the node refused the transaction
fn submission_error(error: ProviderError) -> BlobTxError {
    match error.as_error_response() {
        Some(response) => BlobTxError::RejectedByNode(format!(
            "{} (code {})",
            response.message, response.code
        )),
        None => BlobTxError::SubmissionUnknown(error.to_string()),
    }
}
