//! Transaction signing
//!
//! Blob transactions are signed over `keccak256(0x03 || rlp(fields))`; the
//! chain id inside the preimage binds the signature to one network (the
//! Cancun signing scheme).

use super::types::UnsignedBlobTransaction;
use crate::error::{BlobTxError, BlobTxResult};

use alloy_consensus::SignableTransaction;
use alloy_primitives::{Address, Signature, U256};
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer as _};
use ethers::types::H256;
use tracing::info;

/// Chain-id bound signing scheme for typed blob transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningDomain {
    pub chain_id: u64,
}

impl SigningDomain {
    /// Signing domain of the Cancun transaction signer
    pub fn cancun(chain_id: u64) -> Self {
        Self { chain_id }
    }
}

/// Produces signatures for unsigned blob transactions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Signer: Send + Sync {
    /// Address the produced signatures recover to
    fn address(&self) -> Address;

    async fn sign(
        &self,
        tx: &UnsignedBlobTransaction,
        domain: SigningDomain,
    ) -> BlobTxResult<Signature>;
}

/// Signer holding a secp256k1 key in memory
pub struct LocalSigner {
    wallet: LocalWallet,
}

impl LocalSigner {
    /// Load the private key from an environment variable
    pub fn from_env(var_name: &str) -> BlobTxResult<Self> {
        let key = std::env::var(var_name).map_err(|_| {
            BlobTxError::Config(format!(
                "No wallet configured. Set {} to a hex private key",
                var_name
            ))
        })?;
        Self::from_private_key(&key)
    }

    /// Parse a hex private key, with or without `0x`
    pub fn from_private_key(key: &str) -> BlobTxResult<Self> {
        let wallet = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| BlobTxError::Config(format!("Invalid private key: {}", e)))?;

        info!("Loaded signer for {:?}", wallet.address());
        Ok(Self { wallet })
    }
}

#[async_trait]
impl Signer for LocalSigner {
    fn address(&self) -> Address {
        Address::from(self.wallet.address().0)
    }

    async fn sign(
        &self,
        tx: &UnsignedBlobTransaction,
        domain: SigningDomain,
    ) -> BlobTxResult<Signature> {
        if domain.chain_id != tx.tx.chain_id {
            return Err(BlobTxError::SigningError(format!(
                "signing domain chain {} does not match transaction chain {}",
                domain.chain_id, tx.tx.chain_id
            )));
        }

        let hash = tx.signature_hash();
        let signature = self
            .wallet
            .sign_hash(H256::from(hash.0))
            .map_err(|e| BlobTxError::SigningError(e.to_string()))?;

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        signature.r.to_big_endian(&mut r);
        signature.s.to_big_endian(&mut s);

        // v is 27/28 here; the typed encoding reduces it to a parity bit
        Signature::from_rs_and_parity(U256::from_be_bytes(r), U256::from_be_bytes(s), signature.v)
            .map_err(|e| BlobTxError::SigningError(e.to_string()))
    }
}
