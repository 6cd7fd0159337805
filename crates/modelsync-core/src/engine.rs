//! Sync decision engine.
//!
//! Reconciles what the catalog says about a file (size in KB, optional digest)
//! with what is on disk, and drives the verifier and the transfer executor.
//! Every call re-reads the filesystem and performs at most one fetch.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use modelsync_domain::ExpectedDigest;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::MarkerPolicy;
use crate::error::SyncError;
use crate::transfer::Fetcher;
use crate::verify;

pub const INCOMPLETE_SUFFIX: &str = "inc";
pub const INVALID_SUFFIX: &str = "invalid";

/// Relative tolerance for comparing catalog kilobytes with local bytes / 1024.
const SIZE_REL_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFileDescriptor {
    pub url: String,
    pub expected_size_kb: Option<f64>,
    pub expected_digest: Option<ExpectedDigest>,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalFileState {
    pub exists: bool,
    pub size_bytes: Option<u64>,
}

impl LocalFileState {
    pub const ABSENT: Self = Self {
        exists: false,
        size_bytes: None,
    };

    /// Read the current state of `path`. Anything that is not a regular file
    /// counts as absent.
    ///
    /// # Errors
    /// Returns an error when metadata cannot be read for a reason other than
    /// the path not existing.
    pub fn inspect(path: &Path) -> io::Result<Self> {
        match fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => Ok(Self {
                exists: true,
                size_bytes: Some(metadata.len()),
            }),
            Ok(_) => Ok(Self::ABSENT),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::ABSENT),
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchReason {
    Missing,
    /// The catalog gave no size, so completeness of the local copy is unknown.
    UnknownSize,
}

/// What the engine will do for one file, decided before touching anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum SyncAction {
    Fetch { reason: FetchReason },
    /// Size matches and a digest is known: verify, never refetch.
    VerifyExisting,
    /// Size matches and no digest is known.
    SkipComplete,
    /// Size differs but a digest is known: a matching digest wins.
    VerifyOrRepair,
    /// Size differs and no digest is known.
    Repair,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum Verification {
    Passed,
    Failed { expected: String, actual: String },
    NotAvailable,
}

impl Verification {
    pub fn is_failed(&self) -> bool {
        matches!(self, Verification::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum SyncOutcome {
    Fetched {
        reason: FetchReason,
        bytes: u64,
        verification: Verification,
    },
    Repaired {
        marker: PathBuf,
        bytes: u64,
        verification: Verification,
    },
    VerifiedExisting {
        verification: Verification,
    },
    SkippedComplete,
    /// Sizes disagree but the digest matches; kept as complete.
    SkippedAnomaly,
}

impl SyncOutcome {
    pub fn fetched(&self) -> bool {
        matches!(
            self,
            SyncOutcome::Fetched { .. } | SyncOutcome::Repaired { .. }
        )
    }

    pub fn verification(&self) -> Option<&Verification> {
        match self {
            SyncOutcome::Fetched { verification, .. }
            | SyncOutcome::Repaired { verification, .. }
            | SyncOutcome::VerifiedExisting { verification } => Some(verification),
            SyncOutcome::SkippedComplete | SyncOutcome::SkippedAnomaly => None,
        }
    }
}

/// Catalog sizes are kilobytes as floats; compare with the local byte count
/// converted the same way, allowing only float rounding.
#[allow(clippy::cast_precision_loss)]
pub fn sizes_match(expected_kb: f64, local_bytes: u64) -> bool {
    let local_kb = local_bytes as f64 / 1024.0;
    let diff = (expected_kb - local_kb).abs();
    diff <= SIZE_REL_TOLERANCE * expected_kb.abs().max(local_kb.abs())
}

pub fn plan_sync(descriptor: &RemoteFileDescriptor, local: LocalFileState) -> SyncAction {
    let Some(local_bytes) = local.size_bytes.filter(|_| local.exists) else {
        return SyncAction::Fetch {
            reason: FetchReason::Missing,
        };
    };
    let Some(expected_kb) = descriptor.expected_size_kb else {
        return SyncAction::Fetch {
            reason: FetchReason::UnknownSize,
        };
    };
    match (
        sizes_match(expected_kb, local_bytes),
        descriptor.expected_digest.is_some(),
    ) {
        (true, true) => SyncAction::VerifyExisting,
        (true, false) => SyncAction::SkipComplete,
        (false, true) => SyncAction::VerifyOrRepair,
        (false, false) => SyncAction::Repair,
    }
}

/// `{destination}.{suffix}`, appended to the full file name.
pub fn marker_path(destination: &Path, suffix: &str) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    destination.with_file_name(name)
}

pub struct FileSynchronizer<'a> {
    fetcher: &'a dyn Fetcher,
    markers: MarkerPolicy,
}

impl<'a> FileSynchronizer<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, markers: MarkerPolicy) -> Self {
        Self { fetcher, markers }
    }

    /// Bring `descriptor.destination` in line with the catalog.
    ///
    /// # Errors
    /// Fails on transport errors, on filesystem errors, and when a stale
    /// incomplete marker blocks a repair while marker removal is disabled.
    /// A digest mismatch is not an error; it is reported in the outcome.
    pub fn sync(&self, descriptor: &RemoteFileDescriptor) -> Result<SyncOutcome, SyncError> {
        let path = &descriptor.destination;
        let local = LocalFileState::inspect(path).map_err(|source| SyncError::Io {
            path: path.clone(),
            source,
        })?;
        let action = plan_sync(descriptor, local);
        match action {
            SyncAction::Fetch { reason } => {
                info!(url = %descriptor.url, path = %path.display(), ?reason, "fetching");
                let bytes = self.fetch(descriptor)?;
                let verification = self.verify_and_flag(descriptor)?;
                Ok(SyncOutcome::Fetched {
                    reason,
                    bytes,
                    verification,
                })
            }
            SyncAction::SkipComplete => {
                info!(path = %path.display(), "complete, no digest published; skipping");
                Ok(SyncOutcome::SkippedComplete)
            }
            SyncAction::VerifyExisting => {
                info!(path = %path.display(), "complete; verifying existing file");
                let verification = self.verify_and_flag(descriptor)?;
                Ok(SyncOutcome::VerifiedExisting { verification })
            }
            SyncAction::VerifyOrRepair => {
                if let Some(expected) = &descriptor.expected_digest {
                    let check = verify::check(path, expected).map_err(|source| SyncError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    if check.matched {
                        warn!(
                            path = %path.display(),
                            expected_kb = descriptor.expected_size_kb,
                            local_bytes = local.size_bytes,
                            "sizes differ but digests match; keeping file"
                        );
                        self.clear_invalid_marker(path)?;
                        return Ok(SyncOutcome::SkippedAnomaly);
                    }
                }
                self.repair(descriptor)
            }
            SyncAction::Repair => self.repair(descriptor),
        }
    }

    fn repair(&self, descriptor: &RemoteFileDescriptor) -> Result<SyncOutcome, SyncError> {
        let path = &descriptor.destination;
        let marker = marker_path(path, INCOMPLETE_SUFFIX);
        let io_err = |at: &Path| {
            let at = at.to_path_buf();
            move |source: io::Error| SyncError::Io { path: at, source }
        };

        if fs::symlink_metadata(&marker).is_ok() {
            if !self.markers.remove_stale_incomplete {
                error!(marker = %marker.display(), "stale incomplete marker; refusing to replace it");
                return Err(SyncError::StaleMarker { marker });
            }
            fs::remove_file(&marker).map_err(io_err(&marker))?;
        }
        warn!(
            path = %path.display(),
            marker = %marker.display(),
            "incomplete file; moving aside and fetching again"
        );
        fs::rename(path, &marker).map_err(io_err(path))?;

        let bytes = self.fetch(descriptor)?;
        let verification = self.verify_and_flag(descriptor)?;
        Ok(SyncOutcome::Repaired {
            marker,
            bytes,
            verification,
        })
    }

    fn fetch(&self, descriptor: &RemoteFileDescriptor) -> Result<u64, SyncError> {
        let report = self
            .fetcher
            .fetch(&descriptor.url, &descriptor.destination)?;
        Ok(report.bytes_written)
    }

    fn verify_and_flag(
        &self,
        descriptor: &RemoteFileDescriptor,
    ) -> Result<Verification, SyncError> {
        let path = &descriptor.destination;
        let Some(expected) = &descriptor.expected_digest else {
            return Ok(Verification::NotAvailable);
        };
        let check = verify::check(path, expected).map_err(|source| SyncError::Io {
            path: path.clone(),
            source,
        })?;
        if check.matched {
            info!(path = %path.display(), digest = %expected, "digest check ok");
            self.clear_invalid_marker(path)?;
            return Ok(Verification::Passed);
        }

        error!(
            path = %path.display(),
            expected = %expected,
            actual = %check.actual,
            "digest check failed; file kept for inspection"
        );
        if self.markers.write_invalid {
            let marker = marker_path(path, INVALID_SUFFIX);
            let contents = format!(
                "expected {} {}\nactual {} {}\n",
                expected.algorithm, expected.hex, expected.algorithm, check.actual
            );
            fs::write(&marker, contents).map_err(|source| SyncError::Io {
                path: marker.clone(),
                source,
            })?;
        }
        Ok(Verification::Failed {
            expected: expected.hex.clone(),
            actual: check.actual,
        })
    }

    fn clear_invalid_marker(&self, path: &Path) -> Result<(), SyncError> {
        if !self.markers.write_invalid {
            return Ok(());
        }
        let marker = marker_path(path, INVALID_SUFFIX);
        match fs::remove_file(&marker) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SyncError::Io {
                path: marker,
                source,
            }),
        }
    }
}
