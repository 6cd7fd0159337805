//! Transfer executor: streams a remote body onto a local path.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_LENGTH;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::HttpSettings;
use crate::error::FetchError;
use crate::net;
use crate::progress::TransferProgress;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchReport {
    pub bytes_written: u64,
    /// `Content-Length` as announced by the server, if any.
    pub declared_length: Option<u64>,
}

/// Fetches one remote resource to a local path, replacing whatever is there.
///
/// A single call is a single attempt; callers never retry.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, destination: &Path) -> Result<FetchReport, FetchError>;
}

/// [`Fetcher`] backed by a blocking reqwest client.
pub struct HttpFetcher {
    client: Client,
    progress: bool,
}

impl HttpFetcher {
    /// # Errors
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(settings: &HttpSettings) -> Result<Self, FetchError> {
        let client = net::build_client(settings).map_err(FetchError::Client)?;
        Ok(Self::with_client(client, settings.progress))
    }

    pub fn with_client(client: Client, progress: bool) -> Self {
        Self { client, progress }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<FetchReport, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let declared_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        let write_err = |source| FetchError::Write {
            path: destination.to_path_buf(),
            source,
        };
        let parent = destination
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(write_err)?;
        let mut staging = NamedTempFile::new_in(parent).map_err(write_err)?;

        let label = destination
            .file_name()
            .map_or_else(|| url.to_string(), |name| name.to_string_lossy().into_owned());
        let mut progress = TransferProgress::start(label, declared_length, self.progress);
        pump(&mut response, &mut staging, &mut progress).map_err(|err| match err {
            PumpError::Read(source) => FetchError::Stream {
                url: url.to_string(),
                source,
            },
            PumpError::Write(source) => write_err(source),
        })?;
        staging.flush().map_err(write_err)?;
        let bytes_written = progress.finish();

        if let Some(expected) = declared_length {
            if expected != bytes_written {
                debug!(
                    url,
                    declared = expected,
                    received = bytes_written,
                    "content-length differs from received body"
                );
            }
        }

        staging
            .persist(destination)
            .map_err(|err| write_err(err.error))?;
        debug!(url, path = %destination.display(), bytes = bytes_written, "fetched");
        Ok(FetchReport {
            bytes_written,
            declared_length,
        })
    }
}

#[derive(Debug)]
enum PumpError {
    Read(io::Error),
    Write(io::Error),
}

/// Copy `reader` into `writer` chunk by chunk, counting bytes on `progress`.
/// Interrupted reads are retried.
fn pump(
    reader: &mut impl Read,
    writer: &mut impl Write,
    progress: &mut TransferProgress,
) -> Result<(), PumpError> {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(PumpError::Read(err)),
        };
        writer
            .write_all(&buffer[..read])
            .map_err(PumpError::Write)?;
        progress.advance(read as u64);
    }
}
