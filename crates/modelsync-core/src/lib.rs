#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod images;
pub mod mirror;
mod net;
pub mod outcome;
mod progress;
pub mod snapshot;
pub mod transfer;
pub mod verify;

use modelsync_domain::ModelPageUrl;
use serde_json::json;
use tracing::{error, info, warn};

pub use catalog::{Catalog, CatalogEntry, HttpCatalog};
pub use config::{HttpSettings, MarkerPolicy, SyncConfig, DEFAULT_API_BASE, DEFAULT_TIMEOUT};
pub use engine::{
    plan_sync, FileSynchronizer, LocalFileState, RemoteFileDescriptor, SyncAction, SyncOutcome,
    Verification,
};
pub use error::{CatalogError, FetchError, ImageIndexError, MirrorError, SyncError};
pub use images::{ImageIndex, ImageIndexer, ReconcileReport};
pub use mirror::{FileOutcome, Mirror, MirrorReport, MirrorSummary};
pub use outcome::{CommandStatus, ExecutionOutcome};
pub use transfer::{FetchReport, Fetcher, HttpFetcher};

const URL_HINT: &str = "pass a model page link such as https://civitai.com/models/4201/some-model";

/// Mirror the model behind `url` using HTTP clients built from `config`.
pub fn execute(config: &SyncConfig, url: &str) -> ExecutionOutcome {
    match http_clients(config) {
        Ok((catalog, fetcher)) => execute_with(config, url, &catalog, &fetcher),
        Err(err) => ExecutionOutcome::failure(
            err.to_string(),
            json!({ "kind": "transport", "error": format!("{:#}", anyhow::Error::new(err)) }),
        ),
    }
}

/// Catalog and fetcher sharing one connection pool.
pub fn http_clients(config: &SyncConfig) -> Result<(HttpCatalog, HttpFetcher), FetchError> {
    let client = net::build_client(&config.http).map_err(FetchError::Client)?;
    Ok((
        HttpCatalog::with_client(client.clone(), &config.api_base),
        HttpFetcher::with_client(client, config.http.progress),
    ))
}

/// Like [`execute`], with the catalog and fetcher supplied by the caller.
pub fn execute_with(
    config: &SyncConfig,
    url: &str,
    catalog: &dyn Catalog,
    fetcher: &dyn Fetcher,
) -> ExecutionOutcome {
    let result = ModelPageUrl::parse(url)
        .map_err(MirrorError::from)
        .and_then(|page| Mirror::new(config, catalog, fetcher).mirror_model(&page));
    match result {
        Ok(report) => report_outcome(&report),
        Err(err) => error_outcome(err),
    }
}

fn report_outcome(report: &MirrorReport) -> ExecutionOutcome {
    let summary = report.summary();
    let message = if report.dry_run {
        format!(
            "dry run for {}: {} file(s) and {} sample(s) considered, nothing written",
            report.model_name, summary.files_planned, summary.samples_planned
        )
    } else {
        format!(
            "mirrored {} into {} ({} file(s) fetched, {} up to date, {} skipped, {} new sample(s))",
            report.model_name,
            report.model_dir.display(),
            summary.files_fetched,
            summary.files_up_to_date,
            summary.files_skipped,
            summary.samples_fetched
        )
    };
    info!(
        model = report.model_id,
        fetched = summary.files_fetched,
        samples = summary.samples_fetched,
        "run finished"
    );

    let mut details = json!({ "summary": summary, "report": report });
    if summary.verification_failures > 0 {
        warn!(
            count = summary.verification_failures,
            "files failed digest verification"
        );
        details["hint"] = json!(format!(
            "{} file(s) failed digest verification; see the .invalid markers next to them",
            summary.verification_failures
        ));
    }
    ExecutionOutcome::success(message, details)
}

fn error_outcome(err: MirrorError) -> ExecutionOutcome {
    let kind = err.classification();
    let message = err.to_string();
    error!(kind, "{message}");
    let mut details = json!({
        "kind": kind,
        "error": format!("{:#}", anyhow::Error::new(err)),
    });
    if kind == "invalid-url" {
        details["hint"] = json!(URL_HINT);
    }
    if matches!(kind, "invalid-url" | "unsupported-model-type") {
        ExecutionOutcome::user_error(message, details)
    } else {
        ExecutionOutcome::failure(message, details)
    }
}
