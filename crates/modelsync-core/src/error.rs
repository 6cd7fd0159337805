//! Failure taxonomy for a mirror run.
//!
//! Transport failures, stale incomplete markers and malformed local sample
//! state abort the run. Digest mismatches and unsafe files are not errors:
//! they are reported through the outcome types.

use std::io;
use std::path::PathBuf;

use modelsync_domain::{InvalidModelUrl, UnsupportedModelType};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to build http client")]
    Client(#[source] reqwest::Error),
    #[error("request for {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("stream error while fetching {url}")]
    Stream {
        url: String,
        #[source]
        source: io::Error,
    },
    #[error("unable to write {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(
        "incomplete marker {} already exists and marker removal is disabled",
        .marker.display()
    )]
    StaleMarker { marker: PathBuf },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("filesystem error at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ImageIndexError {
    #[error("malformed sample sidecar {}: {reason}", .path.display())]
    MalformedSidecar { path: PathBuf, reason: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("filesystem error at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("catalog returned status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("catalog response from {url} is not a model document")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error(transparent)]
    InvalidUrl(#[from] InvalidModelUrl),
    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedModelType),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Images(#[from] ImageIndexError),
    #[error("unable to rotate snapshot {}", .path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("filesystem error at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MirrorError {
    /// Errors caused by what the user asked for rather than by the run itself.
    pub fn is_user_error(&self) -> bool {
        matches!(self, MirrorError::InvalidUrl(_) | MirrorError::UnsupportedType(_))
    }

    /// Short classification logged before the run terminates.
    pub fn classification(&self) -> &'static str {
        match self {
            MirrorError::InvalidUrl(_) => "invalid-url",
            MirrorError::UnsupportedType(_) => "unsupported-model-type",
            MirrorError::Catalog(_)
            | MirrorError::Sync(SyncError::Fetch(_))
            | MirrorError::Images(ImageIndexError::Fetch(_)) => "transport",
            MirrorError::Sync(SyncError::StaleMarker { .. }) => "filesystem-conflict",
            MirrorError::Images(ImageIndexError::MalformedSidecar { .. }) => {
                "malformed-local-state"
            }
            MirrorError::Sync(SyncError::Io { .. })
            | MirrorError::Images(ImageIndexError::Io { .. })
            | MirrorError::Snapshot { .. }
            | MirrorError::Io { .. } => "filesystem",
        }
    }
}
