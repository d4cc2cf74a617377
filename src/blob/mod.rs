//! Blob payload construction
//!
//! Raw payload bytes are copied verbatim into a single zero-padded blob and
//! attested through a [`BlobCommitter`].

pub mod kzg;

pub use kzg::KzgCommitter;

use crate::error::{BlobTxError, BlobTxResult, BoxedCause};

use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Field elements in a blob
pub const FIELD_ELEMENTS_PER_BLOB: usize = 4096;

/// Bytes per field element
pub const BYTES_PER_FIELD_ELEMENT: usize = 32;

/// Capacity of a blob in bytes
pub const BYTES_PER_BLOB: usize = FIELD_ELEMENTS_PER_BLOB * BYTES_PER_FIELD_ELEMENT;

/// Size of a KZG commitment
pub const BYTES_PER_COMMITMENT: usize = 48;

/// Size of a KZG proof
pub const BYTES_PER_PROOF: usize = 48;

/// Fixed-capacity blob holding a zero-padded payload
#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    /// Always exactly `BYTES_PER_BLOB` long
    data: Vec<u8>,
    data_len: usize,
}

impl Blob {
    /// Copy `payload` into a fresh blob, zero-padding the remainder
    pub fn from_payload(payload: &[u8]) -> BlobTxResult<Self> {
        if payload.len() > BYTES_PER_BLOB {
            return Err(BlobTxError::PayloadTooLarge {
                len: payload.len(),
                capacity: BYTES_PER_BLOB,
            });
        }

        let mut data = vec![0u8; BYTES_PER_BLOB];
        data[..payload.len()].copy_from_slice(payload);

        Ok(Self {
            data,
            data_len: payload.len(),
        })
    }

    /// Full blob contents including padding
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Length of the payload before padding
    pub fn data_len(&self) -> usize {
        self.data_len
    }

}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("data_len", &self.data_len)
            .finish()
    }
}

/// KZG commitment to a blob
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KzgCommitment(pub [u8; BYTES_PER_COMMITMENT]);

/// KZG proof binding a blob to its commitment
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KzgProof(pub [u8; BYTES_PER_PROOF]);

impl KzgCommitment {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for KzgCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KzgCommitment(0x{})", hex::encode(self.0))
    }
}

impl fmt::Debug for KzgProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KzgProof(0x{})", hex::encode(self.0))
    }
}

/// Commitment and proof for one blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobCommitmentProof {
    pub commitment: KzgCommitment,
    pub proof: KzgProof,
}

/// Computes KZG commitments and proofs for blobs
#[cfg_attr(test, mockall::automock)]
pub trait BlobCommitter: Send + Sync {
    fn commit(&self, blob: &Blob) -> Result<KzgCommitment, BoxedCause>;

    fn prove(&self, blob: &Blob, commitment: &KzgCommitment) -> Result<KzgProof, BoxedCause>;
}

/// Builds a blob and its attestation from raw payload bytes
#[derive(Clone)]
pub struct BlobPayloadBuilder {
    committer: Arc<dyn BlobCommitter>,
}

impl BlobPayloadBuilder {
    pub fn new(committer: Arc<dyn BlobCommitter>) -> Self {
        Self { committer }
    }

    /// Compute the commitment and proof for an already padded blob
    pub fn attest(&self, blob: &Blob) -> BlobTxResult<BlobCommitmentProof> {
        let commitment = self
            .committer
            .commit(blob)
            .map_err(BlobTxError::CommitmentFailed)?;
        let proof = self
            .committer
            .prove(blob, &commitment)
            .map_err(BlobTxError::ProofFailed)?;

        debug!(
            "Blob with {} payload bytes committed: {:?}",
            blob.data_len(),
            commitment
        );

        Ok(BlobCommitmentProof { commitment, proof })
    }
}
