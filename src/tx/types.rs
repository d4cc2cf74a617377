//! EIP-4844 transaction types
//!
//! Built on alloy-consensus: the signing preimage is `0x03 || rlp(fields)`,
//! the hash covers the body with `y_parity, r, s`, and the network form
//! `0x03 || rlp([body, blobs, commitments, proofs])` is what
//! `eth_sendRawTransaction` receives.

use super::fees::FeeParameters;
use crate::blob::{Blob, BlobCommitmentProof};
use crate::error::{BlobTxError, BlobTxResult};

use alloy_consensus::{
    BlobTransactionSidecar, SignableTransaction, Signed, TxEip4844, TxEip4844WithSidecar,
};
use alloy_primitives::{Address, Signature, B256};
use alloy_rlp::BufMut;

/// Blob transaction before signing, sidecar attached
pub type UnsignedBlobTransaction = TxEip4844WithSidecar;

/// Sidecar carrying exactly one blob
pub fn single_blob_sidecar(blob: &Blob, attestation: BlobCommitmentProof) -> BlobTransactionSidecar {
    BlobTransactionSidecar {
        blobs: vec![alloy_consensus::Blob::from_slice(blob.as_bytes())],
        commitments: vec![attestation.commitment.0.into()],
        proofs: vec![attestation.proof.0.into()],
    }
}

impl From<&TxEip4844> for FeeParameters {
    fn from(tx: &TxEip4844) -> Self {
        Self {
            tip_per_gas: tx.max_priority_fee_per_gas,
            max_fee_per_gas: tx.max_fee_per_gas,
            blob_fee_cap: tx.max_fee_per_blob_gas,
        }
    }
}

/// Blob transaction with its signature, ready for broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct SignedBlobTransaction {
    inner: Signed<TxEip4844WithSidecar>,
}

impl SignedBlobTransaction {
    /// Attach a signature, computing the transaction hash
    pub fn new(tx: UnsignedBlobTransaction, signature: Signature) -> Self {
        Self {
            inner: tx.into_signed(signature),
        }
    }

    /// Transaction fields without the sidecar
    pub fn tx(&self) -> &TxEip4844 {
        self.inner.tx().tx()
    }

    pub fn sidecar(&self) -> &BlobTransactionSidecar {
        self.inner.tx().sidecar()
    }

    pub fn fees(&self) -> FeeParameters {
        FeeParameters::from(self.tx())
    }

    /// Canonical transaction hash
    pub fn hash(&self) -> B256 {
        *self.inner.hash()
    }

    /// Address the signature recovers to over the signing hash
    pub fn recover_signer(&self) -> BlobTxResult<Address> {
        self.inner
            .recover_signer()
            .map_err(|e| BlobTxError::SigningError(format!("signature does not recover: {}", e)))
    }

    /// Typed encoding with the sidecar, as submitted to the mempool
    pub fn network_encoding(&self) -> Vec<u8> {
        let tx = self.inner.tx();
        let mut out = Vec::new();
        out.put_u8(tx.tx_type() as u8);
        tx.encode_with_signature_fields(self.inner.signature(), &mut out);
        out
    }
}
