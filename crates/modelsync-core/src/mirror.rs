//! Per-model driver: snapshot, version folders, file sync and samples.

use std::fs;
use std::path::{Path, PathBuf};

use modelsync_domain::{ModelFile, ModelLayout, ModelPageUrl, ModelVersion};
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::catalog::Catalog;
use crate::config::SyncConfig;
use crate::engine::{
    plan_sync, FileSynchronizer, LocalFileState, RemoteFileDescriptor, SyncAction, SyncOutcome,
};
use crate::error::{MirrorError, SyncError};
use crate::images::{ImageIndexer, ReconcileReport};
use crate::snapshot;
use crate::transfer::Fetcher;

#[derive(Debug, Clone, Serialize)]
pub struct MirrorReport {
    pub model_id: u64,
    pub model_name: String,
    /// Canonical page link of the mirrored model.
    pub page: String,
    pub model_dir: PathBuf,
    pub dry_run: bool,
    pub archived_snapshot: Option<PathBuf>,
    pub versions: Vec<VersionReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionReport {
    pub name: String,
    pub dir: PathBuf,
    pub files: Vec<FileReport>,
    pub images: ReconcileReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub name: String,
    pub path: Option<PathBuf>,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum FileOutcome {
    Synced { result: SyncOutcome },
    /// Dry run: what would have happened.
    Planned { action: SyncAction },
    /// Upstream pickle or virus scan did not report success.
    SkippedUnsafe {
        pickle_scan: Option<String>,
        virus_scan: Option<String>,
    },
    /// The catalog file name has no usable final component.
    SkippedBadName,
}

/// Counts shown in the one-line summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MirrorSummary {
    pub files_fetched: usize,
    pub files_up_to_date: usize,
    pub files_planned: usize,
    pub files_skipped: usize,
    pub verification_failures: usize,
    pub samples_fetched: usize,
    pub samples_planned: usize,
    pub samples_missing_images: usize,
}

impl MirrorReport {
    pub fn summary(&self) -> MirrorSummary {
        let mut summary = MirrorSummary::default();
        for version in &self.versions {
            for file in &version.files {
                match &file.outcome {
                    FileOutcome::Synced { result } => {
                        if result.fetched() {
                            summary.files_fetched += 1;
                        } else {
                            summary.files_up_to_date += 1;
                        }
                        if result.verification().is_some_and(|v| v.is_failed()) {
                            summary.verification_failures += 1;
                        }
                    }
                    FileOutcome::Planned { .. } => summary.files_planned += 1,
                    FileOutcome::SkippedUnsafe { .. } | FileOutcome::SkippedBadName => {
                        summary.files_skipped += 1;
                    }
                }
            }
            summary.samples_fetched += version.images.fetched.len();
            summary.samples_planned += version.images.planned.len();
            summary.samples_missing_images += version.images.missing_images.len();
        }
        summary
    }
}

pub struct Mirror<'a> {
    config: &'a SyncConfig,
    catalog: &'a dyn Catalog,
    fetcher: &'a dyn Fetcher,
}

impl<'a> Mirror<'a> {
    pub fn new(config: &'a SyncConfig, catalog: &'a dyn Catalog, fetcher: &'a dyn Fetcher) -> Self {
        Self {
            config,
            catalog,
            fetcher,
        }
    }

    /// Mirror every version of the model behind `page` into the configured root.
    ///
    /// # Errors
    /// Fails on an unsupported model type, on catalog or transfer errors, on a
    /// stale incomplete marker that may not be removed, on malformed sample
    /// sidecars and on filesystem errors. Digest mismatches and unsafe files
    /// are reported, not raised.
    pub fn mirror_model(&self, page: &ModelPageUrl) -> Result<MirrorReport, MirrorError> {
        info!(%page, "fetching catalog document");
        let entry = self.catalog.fetch_model(page.model_id)?;
        let document = &entry.document;
        let layout = ModelLayout::resolve(&self.config.root, document)?;
        let _span = info_span!("model", id = document.id, name = %document.name).entered();
        info!(dir = %layout.model_dir.display(), kind = ?layout.kind, "mirroring model");

        let snapshot_path = layout.snapshot_path();
        let archived_snapshot = if self.config.dry_run {
            info!(path = %snapshot_path.display(), "would write catalog snapshot");
            None
        } else {
            let snapshot_err = |source: std::io::Error| MirrorError::Snapshot {
                path: snapshot_path.clone(),
                source,
            };
            let archived = snapshot::archive_snapshot(&snapshot_path, self.config.archive_offset)
                .map_err(snapshot_err)?;
            snapshot::write_snapshot(&snapshot_path, &entry.raw).map_err(snapshot_err)?;
            archived
        };

        let mut versions = Vec::with_capacity(document.model_versions.len());
        for version in &document.model_versions {
            versions.push(self.mirror_version(&layout, version)?);
        }

        Ok(MirrorReport {
            model_id: document.id,
            model_name: document.name.clone(),
            page: page.to_string(),
            model_dir: layout.model_dir,
            dry_run: self.config.dry_run,
            archived_snapshot,
            versions,
        })
    }

    fn mirror_version(
        &self,
        layout: &ModelLayout,
        version: &ModelVersion,
    ) -> Result<VersionReport, MirrorError> {
        let dir = layout.version_dir(version);
        let samples_dir = layout.samples_dir(version);
        let _span = info_span!("version", name = %version.name).entered();
        if !self.config.dry_run {
            fs::create_dir_all(&samples_dir).map_err(|source| MirrorError::Io {
                path: samples_dir.clone(),
                source,
            })?;
        }

        let synchronizer = FileSynchronizer::new(self.fetcher, self.config.markers);
        let mut files = Vec::with_capacity(version.files.len());
        for file in &version.files {
            files.push(self.mirror_file(&synchronizer, &dir, file)?);
        }

        let images = ImageIndexer::new(self.fetcher, self.config.dry_run)
            .reconcile(&samples_dir, &version.images)?;
        info!(
            existing = images.existing,
            fetched = images.fetched.len(),
            "samples reconciled"
        );

        Ok(VersionReport {
            name: version.name.clone(),
            dir,
            files,
            images,
        })
    }

    fn mirror_file(
        &self,
        synchronizer: &FileSynchronizer<'_>,
        version_dir: &Path,
        file: &ModelFile,
    ) -> Result<FileReport, MirrorError> {
        let report = |path: Option<PathBuf>, outcome: FileOutcome| FileReport {
            name: file.name.clone(),
            path,
            outcome,
        };

        let Some(leaf) = Path::new(&file.name).file_name() else {
            warn!(name = %file.name, "catalog file name has no usable component; skipping");
            return Ok(report(None, FileOutcome::SkippedBadName));
        };
        let destination = version_dir.join(leaf);

        if !file.is_scanned_safe() && !self.config.allow_unsafe {
            warn!(
                path = %destination.display(),
                pickle_scan = ?file.pickle_scan_result,
                virus_scan = ?file.virus_scan_result,
                "upstream scans did not pass; skipping (use --allow-unsafe to fetch anyway)"
            );
            return Ok(report(
                Some(destination),
                FileOutcome::SkippedUnsafe {
                    pickle_scan: file.pickle_scan_result.clone(),
                    virus_scan: file.virus_scan_result.clone(),
                },
            ));
        }

        let descriptor = RemoteFileDescriptor {
            url: file.download_url.clone(),
            expected_size_kb: file.size_kb,
            expected_digest: file.expected_digest(),
            destination,
        };

        let outcome = if self.config.dry_run {
            let local = LocalFileState::inspect(&descriptor.destination).map_err(|source| {
                SyncError::Io {
                    path: descriptor.destination.clone(),
                    source,
                }
            })?;
            let action = plan_sync(&descriptor, local);
            info!(path = %descriptor.destination.display(), ?action, "planned");
            FileOutcome::Planned { action }
        } else {
            FileOutcome::Synced {
                result: synchronizer.sync(&descriptor)?,
            }
        };
        Ok(report(Some(descriptor.destination), outcome))
    }
}
