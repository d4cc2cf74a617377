//! Chain module - node access for the submission pipeline
//!
//! This module provides:
//! - The `ChainReader` / `ChainSubmitter` capabilities the pipeline consumes
//! - `ChainSnapshot`, the per-attempt view of chain state used for pricing
//! - An ethers HTTP implementation with multi-RPC failover

pub mod provider;

pub use provider::RpcChainClient;

use crate::error::BlobTxResult;
use crate::tx::SignedBlobTransaction;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use serde::Serialize;

/// Pricing-relevant fields of the latest block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatestBlock {
    pub number: Option<u64>,
    /// Absent before London
    pub base_fee_per_gas: Option<u128>,
    /// Absent before Cancun
    pub excess_blob_gas: Option<u64>,
}

/// Point-in-time chain state for one submission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainSnapshot {
    pub chain_id: u64,
    pub nonce: u64,
    pub base_fee_per_gas: Option<u128>,
    pub excess_blob_gas: Option<u64>,
}

impl ChainSnapshot {
    pub fn new(chain_id: u64, nonce: u64, block: LatestBlock) -> Self {
        Self {
            chain_id,
            nonce,
            base_fee_per_gas: block.base_fee_per_gas,
            excess_blob_gas: block.excess_blob_gas,
        }
    }
}

/// Inclusion status of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InclusionReceipt {
    pub block_number: u64,
    pub success: bool,
}

/// Read access to chain state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn chain_id(&self) -> BlobTxResult<u64>;

    /// Next nonce of `address` at the latest block
    async fn nonce(&self, address: Address) -> BlobTxResult<u64>;

    async fn latest_block(&self) -> BlobTxResult<LatestBlock>;

    /// `None` while the transaction is not yet included
    async fn transaction_receipt(&self, tx_hash: B256) -> BlobTxResult<Option<InclusionReceipt>>;
}

/// Broadcast access to the node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainSubmitter: Send + Sync {
    /// Submit the network encoding; returns the hash reported by the node
    async fn submit(&self, tx: &SignedBlobTransaction) -> BlobTxResult<B256>;
}
