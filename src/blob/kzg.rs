//! c-kzg backed blob committer

use super::{Blob, BlobCommitter, KzgCommitment, KzgProof};
use crate::error::{BlobTxError, BlobTxResult, BoxedCause};

use alloy_consensus::EnvKzgSettings;
use c_kzg::{Bytes48, KzgSettings};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Computes commitments and proofs with the Ethereum trusted setup
pub struct KzgCommitter {
    settings: EnvKzgSettings,
}

impl KzgCommitter {
    /// Mainnet trusted setup embedded in alloy-eips
    pub fn mainnet() -> Self {
        Self {
            settings: EnvKzgSettings::Default,
        }
    }

    /// Load the trusted setup from a file in the consensus-specs text format
    pub fn load(trusted_setup_path: &Path) -> BlobTxResult<Self> {
        let settings = KzgSettings::load_trusted_setup_file(trusted_setup_path).map_err(|e| {
            BlobTxError::Config(format!(
                "Failed to load KZG trusted setup {:?}: {}",
                trusted_setup_path, e
            ))
        })?;

        info!("Loaded KZG trusted setup from {:?}", trusted_setup_path);
        Ok(Self {
            settings: EnvKzgSettings::Custom(Arc::new(settings)),
        })
    }

    fn to_kzg_blob(blob: &Blob) -> Result<c_kzg::Blob, BoxedCause> {
        Ok(c_kzg::Blob::from_bytes(blob.as_bytes())?)
    }
}

impl BlobCommitter for KzgCommitter {
    fn commit(&self, blob: &Blob) -> Result<KzgCommitment, BoxedCause> {
        let kzg_blob = Self::to_kzg_blob(blob)?;
        let commitment =
            c_kzg::KzgCommitment::blob_to_kzg_commitment(&kzg_blob, self.settings.get())?;
        Ok(KzgCommitment(*commitment.to_bytes()))
    }

    fn prove(&self, blob: &Blob, commitment: &KzgCommitment) -> Result<KzgProof, BoxedCause> {
        let kzg_blob = Self::to_kzg_blob(blob)?;
        let commitment_bytes = Bytes48::from_bytes(commitment.as_slice())?;
        let proof = c_kzg::KzgProof::compute_blob_kzg_proof(
            &kzg_blob,
            &commitment_bytes,
            self.settings.get(),
        )?;
        Ok(KzgProof(*proof.to_bytes()))
    }
}
