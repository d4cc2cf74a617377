use super::*;
use crate::blob::tests::HashCommitter;
use crate::blob::BYTES_PER_BLOB;
use crate::chain::{LatestBlock, MockChainReader, MockChainSubmitter};
use crate::tx::{LocalSigner, MockSigner};

use alloy_primitives::{Bytes, Signature, U256};
use std::sync::atomic::{AtomicUsize, Ordering};

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

fn recipient() -> Address {
    Address::from([0x70; 20])
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        call: CallParams {
            to: recipient(),
            value: U256::ZERO,
            input: Bytes::new(),
        },
        request_timeout: Duration::from_secs(5),
        max_attempts: 3,
        retry_delay: Duration::from_millis(1),
        fee_estimate_only: false,
        wait_for_inclusion: false,
        inclusion_timeout: Duration::from_secs(5),
        receipt_poll_interval: Duration::from_millis(1),
    }
}

fn healthy_reader() -> MockChainReader {
    let mut reader = MockChainReader::new();
    reader.expect_chain_id().returning(|| Ok(1));
    reader.expect_nonce().returning(|_| Ok(5));
    reader.expect_latest_block().returning(|| {
        Ok(LatestBlock {
            number: Some(100),
            base_fee_per_gas: Some(10),
            excess_blob_gas: Some(0),
        })
    });
    reader
}

fn echo_submitter() -> MockChainSubmitter {
    let mut submitter = MockChainSubmitter::new();
    submitter
        .expect_submit()
        .times(1)
        .returning(|tx| Ok(tx.hash()));
    submitter
}

fn local_signer() -> Arc<dyn Signer> {
    Arc::new(LocalSigner::from_private_key(DEV_KEY).unwrap())
}

fn pipeline_with(
    reader: MockChainReader,
    submitter: impl ChainSubmitter + 'static,
    signer: Arc<dyn Signer>,
    settings: PipelineSettings,
) -> SubmissionPipeline {
    SubmissionPipeline::new(
        Arc::new(reader),
        Arc::new(submitter),
        signer,
        BlobPayloadBuilder::new(Arc::new(HashCommitter)),
        FeeEstimator::default(),
        TransactionAssembler::default(),
        settings,
    )
}

/// Cancels the run once it holds the transaction, then never answers
struct CancellingSubmitter {
    cancel: CancellationToken,
}

#[async_trait::async_trait]
impl ChainSubmitter for CancellingSubmitter {
    async fn submit(&self, _tx: &SignedBlobTransaction) -> BlobTxResult<B256> {
        self.cancel.cancel();
        std::future::pending().await
    }
}

/// Signs with the dev key but claims a different address
struct MisreportingSigner {
    inner: LocalSigner,
}

#[async_trait::async_trait]
impl Signer for MisreportingSigner {
    fn address(&self) -> Address {
        Address::from([0xee; 20])
    }

    async fn sign(
        &self,
        tx: &UnsignedBlobTransaction,
        domain: SigningDomain,
    ) -> BlobTxResult<Signature> {
        self.inner.sign(tx, domain).await
    }
}

#[tokio::test]
async fn test_submits_single_blob_transaction() {
    let signer = local_signer();
    let sender = signer.address();
    let pipeline = pipeline_with(healthy_reader(), echo_submitter(), signer, settings());

    let report = pipeline.run(b"hello", &CancellationToken::new()).await;

    let SubmissionReport::Submitted {
        tx_hash,
        transaction,
    } = &report
    else {
        panic!("unexpected report: {:?}", report);
    };

    let tx = transaction.tx();
    assert_eq!(tx.chain_id, 1);
    assert_eq!(tx.nonce, 5);
    assert_eq!(tx.to, recipient());
    assert_eq!(tx.gas_limit, 250_000);
    assert_eq!(tx.max_priority_fee_per_gas, 100);
    assert_eq!(tx.max_fee_per_gas, 110);
    assert_eq!(tx.max_fee_per_blob_gas, 2);
    assert_eq!(tx.blob_versioned_hashes.len(), 1);
    assert_eq!(tx.blob_versioned_hashes[0][0], 0x01);
    assert_eq!(&transaction.sidecar().blobs[0][..5], b"hello");
    assert_eq!(*tx_hash, transaction.hash());
    assert_eq!(transaction.recover_signer().unwrap(), sender);

    assert!(!report.is_failure());
    assert!(!report.safe_to_retry());
}

#[tokio::test]
async fn test_rejection_keeps_signed_transaction() {
    let mut submitter = MockChainSubmitter::new();
    submitter
        .expect_submit()
        .times(1)
        .returning(|_| Err(BlobTxError::RejectedByNode("replacement transaction underpriced".into())));

    let pipeline = pipeline_with(healthy_reader(), submitter, local_signer(), settings());
    let report = pipeline.run(b"hello", &CancellationToken::new()).await;

    let SubmissionReport::SubmissionFailed {
        tx_hash,
        transaction,
        error,
    } = &report
    else {
        panic!("unexpected report: {:?}", report);
    };
    assert_eq!(*tx_hash, transaction.hash());
    assert!(matches!(error, BlobTxError::RejectedByNode(_)));
    assert!(report.is_failure());
    assert!(!report.safe_to_retry());

    let summary = report.summary();
    assert_eq!(summary.outcome, "submission_failed");
    assert_eq!(summary.error_kind, Some("rejected_by_node"));
    assert_eq!(summary.tx_hash, Some(*tx_hash));
    assert!(summary.raw_transaction.unwrap().starts_with("0x03"));
}

#[tokio::test]
async fn test_oversized_payload_fails_before_any_node_call() {
    let mut reader = MockChainReader::new();
    reader.expect_chain_id().never();
    reader.expect_nonce().never();
    reader.expect_latest_block().never();
    let mut submitter = MockChainSubmitter::new();
    submitter.expect_submit().never();

    let pipeline = pipeline_with(reader, submitter, local_signer(), settings());
    let payload = vec![0xab; BYTES_PER_BLOB + 1];
    let report = pipeline.run(&payload, &CancellationToken::new()).await;

    assert!(matches!(
        report,
        SubmissionReport::FailedBeforeSubmission {
            state: PipelineState::Init,
            error: BlobTxError::PayloadTooLarge { .. },
        }
    ));
    assert!(report.safe_to_retry());
}

#[tokio::test]
async fn test_cancelled_run_never_submits() {
    let mut submitter = MockChainSubmitter::new();
    submitter.expect_submit().never();

    let pipeline = pipeline_with(healthy_reader(), submitter, local_signer(), settings());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = pipeline.run(b"hello", &cancel).await;

    assert!(matches!(
        report,
        SubmissionReport::FailedBeforeSubmission {
            error: BlobTxError::Cancelled,
            ..
        }
    ));
    assert!(report.tx_hash().is_none());
}

#[tokio::test]
async fn test_cancel_during_submit_is_not_safe_to_retry() {
    let cancel = CancellationToken::new();
    let submitter = CancellingSubmitter {
        cancel: cancel.clone(),
    };

    let pipeline = pipeline_with(healthy_reader(), submitter, local_signer(), settings());
    let report = pipeline.run(b"hello", &cancel).await;

    let SubmissionReport::SubmissionFailed {
        tx_hash,
        transaction,
        error,
    } = &report
    else {
        panic!("unexpected report: {:?}", report);
    };
    assert!(matches!(error, BlobTxError::Cancelled));
    assert_eq!(*tx_hash, transaction.hash());
    assert!(report.is_failure());
    assert!(!report.safe_to_retry());
    assert!(report.summary().raw_transaction.is_some());
}

#[tokio::test]
async fn test_unknown_submission_outcome_keeps_transaction() {
    let mut submitter = MockChainSubmitter::new();
    submitter
        .expect_submit()
        .times(1)
        .returning(|_| Err(BlobTxError::SubmissionUnknown("connection reset".into())));

    let pipeline = pipeline_with(healthy_reader(), submitter, local_signer(), settings());
    let report = pipeline.run(b"hello", &CancellationToken::new()).await;

    assert!(matches!(
        report,
        SubmissionReport::SubmissionFailed {
            error: BlobTxError::SubmissionUnknown(_),
            ..
        }
    ));
    assert!(!report.safe_to_retry());
    assert_eq!(report.summary().error_kind, Some("submission_unknown"));
}

#[tokio::test]
async fn test_node_hash_mismatch_reports_local_hash() {
    let node_hash = B256::repeat_byte(0xde);
    let mut submitter = MockChainSubmitter::new();
    submitter
        .expect_submit()
        .times(1)
        .returning(move |_| Ok(node_hash));

    let pipeline = pipeline_with(healthy_reader(), submitter, local_signer(), settings());
    let report = pipeline.run(b"hello", &CancellationToken::new()).await;

    let SubmissionReport::Submitted {
        tx_hash,
        transaction,
    } = &report
    else {
        panic!("unexpected report: {:?}", report);
    };
    assert_ne!(*tx_hash, node_hash);
    assert_eq!(*tx_hash, transaction.hash());
    assert_eq!(report.summary().tx_hash, Some(transaction.hash()));
    assert!(!report.is_failure());
}

#[tokio::test]
async fn test_retry_reads_fresh_snapshot() {
    let chain_id_calls = Arc::new(AtomicUsize::new(0));
    let nonce_calls = Arc::new(AtomicUsize::new(0));

    let mut reader = MockChainReader::new();
    let calls = chain_id_calls.clone();
    reader.expect_chain_id().returning(move || {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(BlobTxError::ChainStateUnavailable("connection reset".into()))
        } else {
            Ok(1)
        }
    });
    let calls = nonce_calls.clone();
    reader.expect_nonce().returning(move |_| {
        // Nonce moves between attempts; the latest read must win
        Ok(5 + calls.fetch_add(1, Ordering::SeqCst) as u64)
    });
    reader.expect_latest_block().returning(|| {
        Ok(LatestBlock {
            number: Some(100),
            base_fee_per_gas: Some(10),
            excess_blob_gas: Some(0),
        })
    });

    let pipeline = pipeline_with(reader, echo_submitter(), local_signer(), settings());
    let report = pipeline.run(b"hello", &CancellationToken::new()).await;

    assert_eq!(chain_id_calls.load(Ordering::SeqCst), 2);
    let nonce_reads = nonce_calls.load(Ordering::SeqCst) as u64;
    assert!(nonce_reads >= 1);
    let transaction = report.transaction().expect("transaction submitted");
    assert_eq!(transaction.tx().nonce, 4 + nonce_reads);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let mut reader = MockChainReader::new();
    reader
        .expect_chain_id()
        .times(2)
        .returning(|| Err(BlobTxError::ChainStateUnavailable("down".into())));
    reader.expect_nonce().returning(|_| Ok(5));
    reader
        .expect_latest_block()
        .returning(|| Ok(LatestBlock::default()));
    let mut submitter = MockChainSubmitter::new();
    submitter.expect_submit().never();

    let mut settings = settings();
    settings.max_attempts = 2;
    let pipeline = pipeline_with(reader, submitter, local_signer(), settings);
    let report = pipeline.run(b"hello", &CancellationToken::new()).await;

    assert!(matches!(
        report,
        SubmissionReport::FailedBeforeSubmission {
            state: PipelineState::Init,
            error: BlobTxError::ChainStateUnavailable(_),
        }
    ));
}

#[tokio::test]
async fn test_pre_cancun_chain_cannot_be_priced() {
    let mut reader = MockChainReader::new();
    reader.expect_chain_id().returning(|| Ok(1));
    reader.expect_nonce().returning(|_| Ok(0));
    reader.expect_latest_block().returning(|| {
        Ok(LatestBlock {
            number: Some(1),
            base_fee_per_gas: Some(10),
            excess_blob_gas: None,
        })
    });
    let mut submitter = MockChainSubmitter::new();
    submitter.expect_submit().never();

    let pipeline = pipeline_with(reader, submitter, local_signer(), settings());
    let report = pipeline.run(b"hello", &CancellationToken::new()).await;

    assert!(matches!(
        report,
        SubmissionReport::FailedBeforeSubmission {
            state: PipelineState::PayloadBuilt,
            error: BlobTxError::ChainStateUnavailable(_),
        }
    ));
}

#[tokio::test]
async fn test_fee_check_only_sends_nothing() {
    let mut submitter = MockChainSubmitter::new();
    submitter.expect_submit().never();
    let mut settings = settings();
    settings.fee_estimate_only = true;

    let pipeline = pipeline_with(healthy_reader(), submitter, local_signer(), settings);
    let report = pipeline.run(b"", &CancellationToken::new()).await;

    let SubmissionReport::NotAttempted { fees } = report else {
        panic!("unexpected report: {:?}", report);
    };
    assert_eq!(fees.tip_per_gas, 100);
    assert_eq!(fees.max_fee_per_gas, 110);
    assert_eq!(fees.blob_fee_cap, 2);
}

#[tokio::test]
async fn test_signer_failure_is_reported_at_assembled() {
    let mut signer = MockSigner::new();
    signer.expect_address().returning(|| Address::from([0x11; 20]));
    signer
        .expect_sign()
        .times(1)
        .returning(|_, _| Err(BlobTxError::SigningError("hardware wallet locked".into())));
    let mut submitter = MockChainSubmitter::new();
    submitter.expect_submit().never();

    let pipeline = pipeline_with(healthy_reader(), submitter, Arc::new(signer), settings());
    let report = pipeline.run(b"hello", &CancellationToken::new()).await;

    assert!(matches!(
        report,
        SubmissionReport::FailedBeforeSubmission {
            state: PipelineState::Assembled,
            error: BlobTxError::SigningError(_),
        }
    ));
}

#[tokio::test]
async fn test_signature_must_recover_to_sender() {
    let signer = MisreportingSigner {
        inner: LocalSigner::from_private_key(DEV_KEY).unwrap(),
    };
    let mut submitter = MockChainSubmitter::new();
    submitter.expect_submit().never();

    let pipeline = pipeline_with(healthy_reader(), submitter, Arc::new(signer), settings());
    let report = pipeline.run(b"hello", &CancellationToken::new()).await;

    assert!(matches!(
        report,
        SubmissionReport::FailedBeforeSubmission {
            error: BlobTxError::SigningError(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_waits_for_inclusion() {
    let mut reader = healthy_reader();
    let polls = Arc::new(AtomicUsize::new(0));
    let counter = polls.clone();
    reader.expect_transaction_receipt().returning(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Ok(None)
        } else {
            Ok(Some(InclusionReceipt {
                block_number: 101,
                success: true,
            }))
        }
    });

    let mut settings = settings();
    settings.wait_for_inclusion = true;
    let pipeline = pipeline_with(reader, echo_submitter(), local_signer(), settings);
    let report = pipeline.run(b"hello", &CancellationToken::new()).await;

    assert!(matches!(
        report,
        SubmissionReport::Confirmed {
            block_number: 101,
            success: true,
            ..
        }
    ));
    assert_eq!(polls.load(Ordering::SeqCst), 3);
    assert_eq!(report.summary().block_number, Some(101));
}

#[tokio::test]
async fn test_network_encoding_carries_sidecar() {
    let pipeline = pipeline_with(healthy_reader(), echo_submitter(), local_signer(), settings());
    let report = pipeline.run(b"sidecar", &CancellationToken::new()).await;
    let transaction = report.transaction().expect("transaction submitted");

    let encoded = transaction.network_encoding();
    assert_eq!(encoded[0], 0x03);

    let header = alloy_rlp::Header::decode(&mut &encoded[1..]).unwrap();
    assert!(header.list);
    assert_eq!(header.payload_length, encoded.len() - 1 - header.length());
    assert_eq!(transaction.tx().value, U256::ZERO);
    assert_eq!(&transaction.sidecar().blobs[0][..7], b"sidecar");
}

#[tokio::test]
async fn test_hung_request_times_out() {
    let mut settings = settings();
    settings.request_timeout = Duration::from_millis(10);
    let pipeline = pipeline_with(
        MockChainReader::new(),
        MockChainSubmitter::new(),
        local_signer(),
        settings,
    );

    let result = pipeline
        .guard(
            &CancellationToken::new(),
            "latest block",
            std::future::pending::<BlobTxResult<()>>(),
        )
        .await;

    let err = tokio_test::assert_err!(result);
    assert!(matches!(
        err,
        BlobTxError::Timeout { ref operation } if operation == "latest block"
    ));
}
