//! Assembly of unsigned blob transactions from priced chain state and a sidecar

use super::fees::{
    fake_exponential, FeeParameters, BLOB_BASE_FEE_UPDATE_FRACTION_CANCUN, MIN_BLOB_GASPRICE,
};
use super::types::{single_blob_sidecar, UnsignedBlobTransaction};
use crate::blob::{Blob, BlobCommitmentProof};
use crate::chain::ChainSnapshot;
use crate::error::{BlobTxError, BlobTxResult};

use alloy_consensus::{BlobTransactionSidecar, TxEip4844, TxEip4844WithSidecar};
use alloy_eips::eip4844::kzg_to_versioned_hash;
use alloy_primitives::{Address, Bytes, B256, U256};
use tracing::debug;

/// Recipient-side parameters of the transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallParams {
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

/// Check that blobs, commitments, proofs and hashes line up one to one
pub fn validate_sidecar(sidecar: &BlobTransactionSidecar, hashes: &[B256]) -> BlobTxResult<()> {
    let blobs = sidecar.blobs.len();
    let counts_match = blobs > 0
        && sidecar.commitments.len() == blobs
        && sidecar.proofs.len() == blobs
        && hashes.len() == blobs;

    if !counts_match {
        return Err(BlobTxError::MalformedSidecar {
            blobs,
            commitments: sidecar.commitments.len(),
            proofs: sidecar.proofs.len(),
            hashes: hashes.len(),
        });
    }

    Ok(())
}

/// Builds unsigned blob transactions with a fixed gas limit
#[derive(Debug, Clone)]
pub struct TransactionAssembler {
    gas_limit: u64,
    blob_base_fee_update_fraction: u128,
}

impl TransactionAssembler {
    pub const DEFAULT_GAS_LIMIT: u64 = 250_000;

    pub fn new(gas_limit: u64) -> Self {
        Self {
            gas_limit,
            blob_base_fee_update_fraction: BLOB_BASE_FEE_UPDATE_FRACTION_CANCUN,
        }
    }

    /// Fraction used to derive the blob base fee the cap is checked against
    pub fn with_update_fraction(mut self, fraction: u128) -> Self {
        self.blob_base_fee_update_fraction = fraction;
        self
    }

    /// Assemble a single-blob transaction
    pub fn assemble(
        &self,
        snapshot: &ChainSnapshot,
        fees: FeeParameters,
        call: &CallParams,
        blob: &Blob,
        attestation: BlobCommitmentProof,
    ) -> BlobTxResult<UnsignedBlobTransaction> {
        self.assemble_sidecar(snapshot, fees, call, single_blob_sidecar(blob, attestation))
    }

    /// Assemble a transaction around an arbitrary sidecar
    pub fn assemble_sidecar(
        &self,
        snapshot: &ChainSnapshot,
        fees: FeeParameters,
        call: &CallParams,
        sidecar: BlobTransactionSidecar,
    ) -> BlobTxResult<UnsignedBlobTransaction> {
        self.check_fees(snapshot, &fees)?;

        let blob_versioned_hashes: Vec<B256> = sidecar
            .commitments
            .iter()
            .map(|commitment| kzg_to_versioned_hash(commitment.as_slice()))
            .collect();
        validate_sidecar(&sidecar, &blob_versioned_hashes)?;

        debug!(
            "Assembled blob transaction: chain {}, nonce {}, {} blob(s), gas limit {}",
            snapshot.chain_id,
            snapshot.nonce,
            sidecar.blobs.len(),
            self.gas_limit
        );

        let tx = TxEip4844 {
            chain_id: snapshot.chain_id,
            nonce: snapshot.nonce,
            gas_limit: u128::from(self.gas_limit),
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.tip_per_gas,
            to: call.to,
            value: call.value,
            access_list: Default::default(),
            blob_versioned_hashes,
            max_fee_per_blob_gas: fees.blob_fee_cap,
            input: call.input.clone(),
        };

        Ok(TxEip4844WithSidecar::from_tx_and_sidecar(tx, sidecar))
    }

    fn check_fees(&self, snapshot: &ChainSnapshot, fees: &FeeParameters) -> BlobTxResult<()> {
        let base_fee = snapshot.base_fee_per_gas.unwrap_or_default();
        let floor = fees.tip_per_gas.checked_add(base_fee);

        if floor.map_or(true, |floor| fees.max_fee_per_gas < floor) {
            return Err(BlobTxError::InvalidFees(format!(
                "max fee {} below base fee {} + tip {}",
                fees.max_fee_per_gas, base_fee, fees.tip_per_gas
            )));
        }

        let blob_base_fee = fake_exponential(
            MIN_BLOB_GASPRICE,
            u128::from(snapshot.excess_blob_gas.unwrap_or_default()),
            self.blob_base_fee_update_fraction,
        );
        if fees.blob_fee_cap < blob_base_fee {
            return Err(BlobTxError::InvalidFees(format!(
                "blob fee cap {} below blob base fee {}",
                fees.blob_fee_cap, blob_base_fee
            )));
        }

        Ok(())
    }
}

impl Default for TransactionAssembler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_GAS_LIMIT)
    }
}
