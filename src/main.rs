//! Blob Transaction Sender - builds, prices, signs and submits one EIP-4844
//! blob transaction
//!
//! Reads chain state from the configured node, commits the payload to a blob
//! with KZG, and broadcasts the signed type-3 transaction. The terminal
//! report is printed as JSON on stdout.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod blob;
mod chain;
mod config;
mod error;
mod metrics;
mod pipeline;
mod tx;

use blob::{BlobPayloadBuilder, KzgCommitter};
use chain::RpcChainClient;
use config::Settings;
use pipeline::{PipelineSettings, SubmissionPipeline};
use tx::{FeeEstimator, LocalSigner, TransactionAssembler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Blob Transaction Sender v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration with {} RPC endpoint(s)",
        settings.chain.rpc_urls.len()
    );

    let signer = Arc::new(LocalSigner::from_env(&settings.wallet.private_key_env)?);
    let client = Arc::new(RpcChainClient::new(&settings.chain)?);

    let committer = match settings.kzg.trusted_setup_path.as_deref() {
        Some(path) => KzgCommitter::load(Path::new(path))?,
        None => {
            info!("Using embedded mainnet KZG trusted setup");
            KzgCommitter::mainnet()
        }
    };

    let payload = if settings.pipeline.fee_estimate_only {
        Vec::new()
    } else {
        settings.payload()?
    };

    let pipeline = SubmissionPipeline::new(
        client.clone(),
        client,
        signer,
        BlobPayloadBuilder::new(Arc::new(committer)),
        FeeEstimator::new(settings.fee_policy()),
        TransactionAssembler::new(settings.transaction.gas_limit)
            .with_update_fraction(settings.fee_policy().blob_base_fee_update_fraction),
        PipelineSettings::from_settings(&settings)?,
    );

    // Cancel the run on shutdown signal
    let cancel = CancellationToken::new();
    let signal_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            warn!("Shutdown signal received, cancelling submission");
            cancel.cancel();
        }
    });

    let report = pipeline.run(&payload, &cancel).await;
    signal_handle.abort();

    match report.tx_hash() {
        Some(tx_hash) => info!("Run finished: {} ({})", report.label(), tx_hash),
        None => info!("Run finished: {}", report.label()),
    }
    println!("{}", serde_json::to_string_pretty(&report.summary())?);

    if settings.metrics.enabled {
        match settings.metrics.textfile_path.as_deref() {
            Some(path) => {
                if let Err(e) = metrics::write_textfile(Path::new(path)) {
                    error!("Failed to write metrics: {}", e);
                }
            }
            None => warn!("Metrics enabled without metrics.textfile_path; skipping"),
        }
    }

    if report.is_failure() {
        if !report.safe_to_retry() {
            warn!("Transaction may have reached the node; check before rerunning");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blob_tx_sender=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
