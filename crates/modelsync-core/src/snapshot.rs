//! Rotation of the per-model catalog snapshot (`civitai_model.json`).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::Value;
use tempfile::NamedTempFile;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info};

/// Rename an existing snapshot to `{stem}_DD_MM_YYYY__HH_MM.json`, stamped
/// with its creation time (modification time where creation is unknown) at
/// `offset`.
///
/// Returns the archive path, or `None` when there was nothing to archive.
/// Archives created within the same minute get a `_1`, `_2`, ... suffix.
///
/// # Errors
/// Returns an error when the snapshot cannot be inspected or renamed.
pub fn archive_snapshot(path: &Path, offset: UtcOffset) -> io::Result<Option<PathBuf>> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let born = metadata.created().or_else(|_| metadata.modified())?;
    let stamp = format_stamp(born, offset)?;

    let stem = path
        .file_stem()
        .map_or_else(|| "civitai_model".into(), |stem| stem.to_string_lossy());
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut target = dir.join(format!("{stem}_{stamp}.json"));
    let mut attempt = 0u32;
    while target.exists() {
        attempt += 1;
        target = dir.join(format!("{stem}_{stamp}_{attempt}.json"));
    }

    fs::rename(path, &target)?;
    info!(from = %path.display(), to = %target.display(), "archived previous snapshot");
    Ok(Some(target))
}

/// Write the raw catalog document as pretty-printed JSON.
///
/// # Errors
/// Returns an error when the parent directory or the file cannot be written.
pub fn write_snapshot(path: &Path, document: &Value) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut staging = NamedTempFile::new_in(parent)?;
    serde_json::to_writer_pretty(&mut staging, document)?;
    staging.flush()?;
    staging.persist(path).map_err(|err| err.error)?;
    debug!(path = %path.display(), "wrote catalog snapshot");
    Ok(())
}

/// The local UTC offset, or UTC when it cannot be read. Reading it is only
/// reliable before the process starts other threads.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

fn format_stamp(at: SystemTime, offset: UtcOffset) -> io::Result<String> {
    OffsetDateTime::from(at)
        .to_offset(offset)
        .format(format_description!("[day]_[month]_[year]__[hour]_[minute]"))
        .map_err(io::Error::other)
}
