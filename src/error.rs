//! Error types for the blob transaction sender

use thiserror::Error;

/// Boxed cause attached to collaborator failures (KZG backend, transport)
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for building and submitting a blob transaction
#[derive(Error, Debug)]
pub enum BlobTxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chain state unavailable: {0}")]
    ChainStateUnavailable(String),

    #[error("Payload of {len} bytes exceeds blob capacity of {capacity} bytes")]
    PayloadTooLarge { len: usize, capacity: usize },

    #[error("Blob commitment failed: {0}")]
    CommitmentFailed(#[source] BoxedCause),

    #[error("Blob proof failed: {0}")]
    ProofFailed(#[source] BoxedCause),

    #[error(
        "Malformed sidecar: {blobs} blobs, {commitments} commitments, {proofs} proofs, {hashes} hashes"
    )]
    MalformedSidecar {
        blobs: usize,
        commitments: usize,
        proofs: usize,
        hashes: usize,
    },

    #[error("Fee computation overflowed: {0}")]
    FeeOverflow(String),

    #[error("Invalid fee parameters: {0}")]
    InvalidFees(String),

    #[error("Signing error: {0}")]
    SigningError(String),

    #[error("Transaction rejected by node: {0}")]
    RejectedByNode(String),

    /// The request may or may not have reached the node
    #[error("Submission outcome unknown: {0}")]
    SubmissionUnknown(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BlobTxError {
    /// Check if error is retryable with a fresh chain snapshot
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BlobTxError::ChainStateUnavailable(_) | BlobTxError::Timeout { .. }
        )
    }

    /// Short stable label, used for metrics and the JSON report
    pub fn kind(&self) -> &'static str {
        match self {
            BlobTxError::Config(_) => "config",
            BlobTxError::ChainStateUnavailable(_) => "chain_state_unavailable",
            BlobTxError::PayloadTooLarge { .. } => "payload_too_large",
            BlobTxError::CommitmentFailed(_) => "commitment_failed",
            BlobTxError::ProofFailed(_) => "proof_failed",
            BlobTxError::MalformedSidecar { .. } => "malformed_sidecar",
            BlobTxError::FeeOverflow(_) => "fee_overflow",
            BlobTxError::InvalidFees(_) => "invalid_fees",
            BlobTxError::SigningError(_) => "signing_error",
            BlobTxError::RejectedByNode(_) => "rejected_by_node",
            BlobTxError::SubmissionUnknown(_) => "submission_unknown",
            BlobTxError::Timeout { .. } => "timeout",
            BlobTxError::Cancelled => "cancelled",
            BlobTxError::Internal(_) => "internal",
        }
    }
}

/// Result type for blob transaction operations
pub type BlobTxResult<T> = Result<T, BlobTxError>;
