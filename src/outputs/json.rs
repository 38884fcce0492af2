//! JSON run reports.
//!
//! One file per run, grouped by the UTC date the run started:
//! `{summary_dir}/{YYYY-MM-DD}/run-{HHMMSS}.json`.

use crate::models::RunSummary;
use crate::utils::ensure_writable_dir;
use std::error::Error;
use tokio::fs;
use tracing::{error, info, instrument};

/// Path of the report for `summary` under `summary_dir`.
pub fn summary_path(summary: &RunSummary, summary_dir: &str) -> String {
    format!(
        "{}/{}/run-{}.json",
        summary_dir.trim_end_matches('/'),
        summary.started_at.format("%Y-%m-%d"),
        summary.started_at.format("%H%M%S")
    )
}

/// Write `summary` as pretty JSON and return the file path.
///
/// # Errors
///
/// Returns an error if the date directory is not writable or the file
/// cannot be written.
#[instrument(level = "info", skip_all, fields(summary_dir = %summary_dir))]
pub async fn write_summary(
    summary: &RunSummary,
    summary_dir: &str,
) -> Result<String, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(summary)?;

    let date_dir = format!(
        "{}/{}",
        summary_dir.trim_end_matches('/'),
        summary.started_at.format("%Y-%m-%d")
    );
    if let Err(e) = ensure_writable_dir(&date_dir).await {
        error!(%date_dir, error = %e, "Report directory is not writable");
        return Err(e);
    }

    let path = summary_path(summary, summary_dir);
    fs::write(&path, json).await?;
    info!(%path, delivered = summary.delivered, "Wrote run report");
    Ok(path)
}
