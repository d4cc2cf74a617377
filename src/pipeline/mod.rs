//! Submission pipeline - end-to-end orchestration of one blob transaction
//!
//! Flow: `Init → StateFetched → PayloadBuilt → Assembled → Signed → Submitted
//! → Done`, where any step may end the run in a failure report.
//!
//! The chain state fetch overlaps with blob commitment (on the blocking
//! pool). Every node call is bounded by the request timeout and the caller's
//! cancellation token. Only the state fetch is retried, and every retry reads
//! a fresh snapshot; submission is never retried.

use crate::blob::{Blob, BlobCommitmentProof, BlobPayloadBuilder};
use crate::chain::{ChainReader, ChainSnapshot, ChainSubmitter, InclusionReceipt};
use crate::config::Settings;
use crate::error::{BlobTxError, BlobTxResult};
use crate::metrics;
use crate::tx::{
    CallParams, FeeEstimator, FeeParameters, SignedBlobTransaction, Signer, SigningDomain,
    TransactionAssembler, UnsignedBlobTransaction,
};

use alloy_primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Pipeline progress, recorded with failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    StateFetched,
    PayloadBuilt,
    Assembled,
    Signed,
    Submitted,
    Done,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Init => "init",
            PipelineState::StateFetched => "state_fetched",
            PipelineState::PayloadBuilt => "payload_built",
            PipelineState::Assembled => "assembled",
            PipelineState::Signed => "signed",
            PipelineState::Submitted => "submitted",
            PipelineState::Done => "done",
        }
    }
}

/// Terminal outcome of a pipeline run
#[derive(Debug)]
pub enum SubmissionReport {
    /// Fee check only; nothing was built or sent
    NotAttempted { fees: FeeParameters },

    /// The node never saw the transaction; safe to rerun from scratch
    FailedBeforeSubmission {
        state: PipelineState,
        error: BlobTxError,
    },

    /// The submit step failed; the node may still hold the transaction, so
    /// rerunning risks a conflicting submission
    SubmissionFailed {
        tx_hash: B256,
        transaction: Box<SignedBlobTransaction>,
        error: BlobTxError,
    },

    /// Accepted by the node, inclusion unknown
    Submitted {
        tx_hash: B256,
        transaction: Box<SignedBlobTransaction>,
    },

    /// Included in a block
    Confirmed {
        tx_hash: B256,
        block_number: u64,
        success: bool,
    },
}

impl SubmissionReport {
    pub fn label(&self) -> &'static str {
        match self {
            SubmissionReport::NotAttempted { .. } => "not_attempted",
            SubmissionReport::FailedBeforeSubmission { .. } => "failed_before_submission",
            SubmissionReport::SubmissionFailed { .. } => "submission_failed",
            SubmissionReport::Submitted { .. } => "submitted",
            SubmissionReport::Confirmed { .. } => "confirmed",
        }
    }

    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            SubmissionReport::SubmissionFailed { tx_hash, .. }
            | SubmissionReport::Submitted { tx_hash, .. }
            | SubmissionReport::Confirmed { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }

    /// Whether the transaction may have reached the node
    pub fn reached_node(&self) -> bool {
        self.tx_hash().is_some()
    }

    /// Whether rerunning the pipeline cannot double-submit
    pub fn safe_to_retry(&self) -> bool {
        !self.reached_node()
    }

    /// Failed or reverted runs
    pub fn is_failure(&self) -> bool {
        match self {
            SubmissionReport::FailedBeforeSubmission { .. }
            | SubmissionReport::SubmissionFailed { .. } => true,
            SubmissionReport::Confirmed { success, .. } => !success,
            _ => false,
        }
    }

    /// State and cause of a failed run
    pub fn failure(&self) -> Option<(PipelineState, &BlobTxError)> {
        match self {
            SubmissionReport::FailedBeforeSubmission { state, error } => Some((*state, error)),
            SubmissionReport::SubmissionFailed { error, .. } => {
                Some((PipelineState::Signed, error))
            }
            _ => None,
        }
    }

    /// Signed transaction kept for manual resubmission
    pub fn transaction(&self) -> Option<&SignedBlobTransaction> {
        match self {
            SubmissionReport::SubmissionFailed { transaction, .. }
            | SubmissionReport::Submitted { transaction, .. } => Some(transaction),
            _ => None,
        }
    }

    /// Serializable view for the process output
    pub fn summary(&self) -> ReportSummary {
        let failure = self.failure();
        ReportSummary {
            outcome: self.label(),
            safe_to_retry: self.safe_to_retry(),
            tx_hash: self.tx_hash(),
            failed_state: failure.map(|(state, _)| state),
            error_kind: failure.map(|(_, error)| error.kind()),
            error: failure.map(|(_, error)| error.to_string()),
            fees: match self {
                SubmissionReport::NotAttempted { fees } => Some(*fees),
                _ => self.transaction().map(SignedBlobTransaction::fees),
            },
            block_number: match self {
                SubmissionReport::Confirmed { block_number, .. } => Some(*block_number),
                _ => None,
            },
            raw_transaction: self
                .transaction()
                .map(|tx| format!("0x{}", hex::encode(tx.network_encoding()))),
            generated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub outcome: &'static str,
    pub safe_to_retry: bool,
    pub tx_hash: Option<B256>,
    pub failed_state: Option<PipelineState>,
    pub error_kind: Option<&'static str>,
    pub error: Option<String>,
    pub fees: Option<FeeParameters>,
    pub block_number: Option<u64>,
    /// Network encoding, for manual resubmission
    pub raw_transaction: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Run-level settings, passed in at construction
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub call: CallParams,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub fee_estimate_only: bool,
    pub wait_for_inclusion: bool,
    pub inclusion_timeout: Duration,
    pub receipt_poll_interval: Duration,
}

impl PipelineSettings {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            call: CallParams {
                to: settings.recipient()?,
                value: settings.value()?,
                input: settings.calldata()?,
            },
            request_timeout: settings.request_timeout(),
            max_attempts: settings.pipeline.max_attempts,
            retry_delay: Duration::from_millis(settings.pipeline.retry_delay_ms),
            fee_estimate_only: settings.pipeline.fee_estimate_only,
            wait_for_inclusion: settings.pipeline.wait_for_inclusion,
            inclusion_timeout: Duration::from_secs(settings.pipeline.inclusion_timeout_secs),
            receipt_poll_interval: Duration::from_millis(settings.pipeline.receipt_poll_interval_ms),
        })
    }
}

fn advance(from: PipelineState, to: PipelineState) -> PipelineState {
    debug!("Pipeline state {} -> {}", from.as_str(), to.as_str());
    to
}

fn failed(state: PipelineState, error: BlobTxError) -> SubmissionReport {
    error!("Blob transaction failed at {}: {}", state.as_str(), error);
    SubmissionReport::FailedBeforeSubmission { state, error }
}

/// Orchestrates pricing, payload construction, assembly, signing and submission
pub struct SubmissionPipeline {
    reader: Arc<dyn ChainReader>,
    submitter: Arc<dyn ChainSubmitter>,
    signer: Arc<dyn Signer>,
    payload_builder: BlobPayloadBuilder,
    fee_estimator: FeeEstimator,
    assembler: TransactionAssembler,
    settings: PipelineSettings,
}

impl SubmissionPipeline {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        submitter: Arc<dyn ChainSubmitter>,
        signer: Arc<dyn Signer>,
        payload_builder: BlobPayloadBuilder,
        fee_estimator: FeeEstimator,
        assembler: TransactionAssembler,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            reader,
            submitter,
            signer,
            payload_builder,
            fee_estimator,
            assembler,
            settings,
        }
    }

    /// Build and submit one blob transaction carrying `payload`
    pub async fn run(&self, payload: &[u8], cancel: &CancellationToken) -> SubmissionReport {
        let run_id = Uuid::new_v4();
        let started = Instant::now();

        let report = self
            .execute(payload, cancel)
            .instrument(info_span!("blob_submission", %run_id))
            .await;

        metrics::record_report(&report, started.elapsed().as_secs_f64());
        report
    }

    async fn execute(&self, payload: &[u8], cancel: &CancellationToken) -> SubmissionReport {
        let sender = self.signer.address();
        info!(
            "Building blob transaction from {} with {} payload bytes",
            sender,
            payload.len()
        );

        if self.settings.fee_estimate_only {
            return self.estimate_only(sender, cancel).await;
        }

        let mut state = PipelineState::Init;

        // Size check happens before any network interaction
        let blob = match Blob::from_payload(payload) {
            Ok(blob) => blob,
            Err(e) => return failed(state, e),
        };

        let builder = self.payload_builder.clone();
        let commitment_task = tokio::task::spawn_blocking(move || {
            builder.attest(&blob).map(|attestation| (blob, attestation))
        });

        let snapshot = match self.fetch_snapshot(sender, cancel).await {
            Ok(snapshot) => snapshot,
            Err(e) => return failed(state, e),
        };
        state = advance(state, PipelineState::StateFetched);

        let (blob, attestation) = match commitment_task.await {
            Ok(Ok(built)) => built,
            Ok(Err(e)) => return failed(state, e),
            Err(e) => {
                return failed(
                    state,
                    BlobTxError::Internal(format!("blob commitment task failed: {}", e)),
                )
            }
        };
        state = advance(state, PipelineState::PayloadBuilt);

        let unsigned = match self.price_and_assemble(&snapshot, &blob, attestation) {
            Ok(unsigned) => unsigned,
            Err(e) => return failed(state, e),
        };
        state = advance(state, PipelineState::Assembled);

        if cancel.is_cancelled() {
            return failed(state, BlobTxError::Cancelled);
        }

        let signed = match self.sign(unsigned, sender).await {
            Ok(signed) => signed,
            Err(e) => return failed(state, e),
        };
        state = advance(state, PipelineState::Signed);

        if cancel.is_cancelled() {
            return failed(state, BlobTxError::Cancelled);
        }

        let tx_hash = signed.hash();
        info!(
            "Submitting blob transaction {} with {} blob(s)",
            tx_hash,
            signed.sidecar().blobs.len()
        );

        let submission = self
            .guard(cancel, "send transaction", self.submitter.submit(&signed))
            .await;
        match submission {
            Ok(node_hash) if node_hash != tx_hash => {
                warn!("Node reported hash {} for transaction {}", node_hash, tx_hash);
            }
            Ok(_) => {}
            Err(error) => {
                error!("Failed to send transaction {}: {}", tx_hash, error);
                return SubmissionReport::SubmissionFailed {
                    tx_hash,
                    transaction: Box::new(signed),
                    error,
                };
            }
        }
        state = advance(state, PipelineState::Submitted);
        info!("Transaction sent: {}", tx_hash);

        if !self.settings.wait_for_inclusion {
            advance(state, PipelineState::Done);
            return SubmissionReport::Submitted {
                tx_hash,
                transaction: Box::new(signed),
            };
        }

        let report = match self.wait_for_inclusion(tx_hash, cancel).await {
            Ok(Some(receipt)) => {
                info!(
                    "Transaction {} included in block {} (success: {})",
                    tx_hash, receipt.block_number, receipt.success
                );
                SubmissionReport::Confirmed {
                    tx_hash,
                    block_number: receipt.block_number,
                    success: receipt.success,
                }
            }
            Ok(None) => {
                warn!(
                    "Transaction {} not included within {:?}",
                    tx_hash, self.settings.inclusion_timeout
                );
                SubmissionReport::Submitted {
                    tx_hash,
                    transaction: Box::new(signed),
                }
            }
            Err(e) => {
                warn!("Inclusion status of {} unknown: {}", tx_hash, e);
                SubmissionReport::Submitted {
                    tx_hash,
                    transaction: Box::new(signed),
                }
            }
        };
        advance(state, PipelineState::Done);
        report
    }

    async fn estimate_only(&self, sender: Address, cancel: &CancellationToken) -> SubmissionReport {
        let priced = match self.fetch_snapshot(sender, cancel).await {
            Ok(snapshot) => self
                .fee_estimator
                .estimate(&snapshot)
                .map(|fees| (snapshot, fees)),
            Err(e) => Err(e),
        };

        match priced {
            Ok((snapshot, fees)) => {
                metrics::record_fees(snapshot.chain_id, &fees);
                info!(
                    "Fee check only: tip {}, max fee {}, blob fee cap {}; transaction not sent",
                    fees.tip_per_gas, fees.max_fee_per_gas, fees.blob_fee_cap
                );
                SubmissionReport::NotAttempted { fees }
            }
            Err(e) => failed(PipelineState::Init, e),
        }
    }

    fn price_and_assemble(
        &self,
        snapshot: &ChainSnapshot,
        blob: &Blob,
        attestation: BlobCommitmentProof,
    ) -> BlobTxResult<UnsignedBlobTransaction> {
        let fees = self.fee_estimator.estimate(snapshot)?;
        metrics::record_fees(snapshot.chain_id, &fees);

        self.assembler
            .assemble(snapshot, fees, &self.settings.call, blob, attestation)
    }

    async fn sign(
        &self,
        unsigned: UnsignedBlobTransaction,
        sender: Address,
    ) -> BlobTxResult<SignedBlobTransaction> {
        let domain = SigningDomain::cancun(unsigned.tx.chain_id);
        let signature = self.signer.sign(&unsigned, domain).await?;
        let signed = SignedBlobTransaction::new(unsigned, signature);

        let recovered = signed.recover_signer()?;
        if recovered != sender {
            return Err(BlobTxError::SigningError(format!(
                "signature recovers to {}, expected {}",
                recovered, sender
            )));
        }

        Ok(signed)
    }

    /// Fetch a snapshot, retrying retryable failures with a fresh read
    async fn fetch_snapshot(
        &self,
        sender: Address,
        cancel: &CancellationToken,
    ) -> BlobTxResult<ChainSnapshot> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.read_snapshot(sender, cancel).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if e.is_retryable() && attempts < max_attempts => {
                    warn!(
                        "Chain state fetch failed (attempt {}/{}): {}",
                        attempts, max_attempts, e
                    );
                    metrics::record_snapshot_retry();

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(BlobTxError::Cancelled),
                        _ = tokio::time::sleep(self.settings.retry_delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn read_snapshot(
        &self,
        sender: Address,
        cancel: &CancellationToken,
    ) -> BlobTxResult<ChainSnapshot> {
        let (chain_id, nonce, block) = tokio::try_join!(
            self.guard(cancel, "chain id", self.reader.chain_id()),
            self.guard(cancel, "nonce", self.reader.nonce(sender)),
            self.guard(cancel, "latest block", self.reader.latest_block()),
        )?;

        debug!(
            "Chain {}: nonce {}, block {:?}, base fee {:?}, excess blob gas {:?}",
            chain_id, nonce, block.number, block.base_fee_per_gas, block.excess_blob_gas
        );

        Ok(ChainSnapshot::new(chain_id, nonce, block))
    }

    async fn wait_for_inclusion(
        &self,
        tx_hash: B256,
        cancel: &CancellationToken,
    ) -> BlobTxResult<Option<InclusionReceipt>> {
        let deadline = Instant::now() + self.settings.inclusion_timeout;

        loop {
            let receipt = self
                .guard(
                    cancel,
                    "transaction receipt",
                    self.reader.transaction_receipt(tx_hash),
                )
                .await?;
            if receipt.is_some() {
                return Ok(receipt);
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(BlobTxError::Cancelled),
                _ = tokio::time::sleep(self.settings.receipt_poll_interval) => {}
            }
        }
    }

    /// Bound a node call by the request timeout and the cancellation token
    async fn guard<T>(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        call: impl Future<Output = BlobTxResult<T>>,
    ) -> BlobTxResult<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BlobTxError::Cancelled),
            result = tokio::time::timeout(self.settings.request_timeout, call) => {
                result.unwrap_or_else(|_| {
                    Err(BlobTxError::Timeout {
                        operation: operation.to_string(),
                    })
                })
            }
        }
    }
}

#[cfg(test)]
mod tests;
