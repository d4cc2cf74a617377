//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Submission outcomes and latency
//! - Stage failures and chain state retries
//! - Fee parameters of the last priced transaction
//!
//! The process is one-shot, so the registry is written to a node-exporter
//! textfile instead of being served.

use crate::pipeline::SubmissionReport;
use crate::tx::FeeParameters;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::path::Path;
use tracing::info;

lazy_static! {
    pub static ref SUBMISSIONS: CounterVec = register_counter_vec!(
        "blob_sender_submissions_total",
        "Submission runs by terminal outcome",
        &["outcome"]
    ).unwrap();

    pub static ref STAGE_FAILURES: CounterVec = register_counter_vec!(
        "blob_sender_stage_failures_total",
        "Failures by pipeline state and error kind",
        &["state", "kind"]
    ).unwrap();

    pub static ref SNAPSHOT_RETRIES: CounterVec = register_counter_vec!(
        "blob_sender_snapshot_retries_total",
        "Chain state fetches retried with a fresh snapshot",
        &[]
    ).unwrap();

    pub static ref BLOB_FEE_CAP: GaugeVec = register_gauge_vec!(
        "blob_sender_blob_fee_cap_wei",
        "Blob fee cap of the last priced transaction",
        &["chain_id"]
    ).unwrap();

    pub static ref MAX_FEE_PER_GAS: GaugeVec = register_gauge_vec!(
        "blob_sender_max_fee_per_gas_wei",
        "Max fee per gas of the last priced transaction",
        &["chain_id"]
    ).unwrap();

    pub static ref PIPELINE_LATENCY: HistogramVec = register_histogram_vec!(
        "blob_sender_pipeline_latency_seconds",
        "End-to-end submission latency",
        &["outcome"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).unwrap();
}

/// Render the registry in the Prometheus text format
pub fn render() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics are not valid UTF-8")
}

/// Write the registry to a textfile collector path
pub fn write_textfile(path: &Path) -> Result<()> {
    let rendered = render()?;
    std::fs::write(path, rendered)
        .with_context(|| format!("Failed to write metrics to {:?}", path))?;
    info!("Metrics written to {:?}", path);
    Ok(())
}

// Helper functions to record metrics

pub fn record_fees(chain_id: u64, fees: &FeeParameters) {
    let chain_id = chain_id.to_string();
    BLOB_FEE_CAP
        .with_label_values(&[&chain_id])
        .set(fees.blob_fee_cap as f64);
    MAX_FEE_PER_GAS
        .with_label_values(&[&chain_id])
        .set(fees.max_fee_per_gas as f64);
}

pub fn record_snapshot_retry() {
    SNAPSHOT_RETRIES.with_label_values(&[]).inc();
}

pub fn record_report(report: &SubmissionReport, latency_secs: f64) {
    let outcome = report.label();
    SUBMISSIONS.with_label_values(&[outcome]).inc();
    PIPELINE_LATENCY
        .with_label_values(&[outcome])
        .observe(latency_secs);

    if let Some((state, error)) = report.failure() {
        STAGE_FAILURES
            .with_label_values(&[state.as_str(), error.kind()])
            .inc();
    }
}
