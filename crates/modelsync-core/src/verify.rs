//! Streaming content verification.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use modelsync_domain::{ExpectedDigest, HashAlgorithm};
use sha2::{Digest, Sha256};

const BLOCK_SIZE: usize = 64 * 1024;

enum Accumulator {
    Blake3(Box<blake3::Hasher>),
    Sha256(Sha256),
}

impl Accumulator {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Blake3 => Accumulator::Blake3(Box::new(blake3::Hasher::new())),
            HashAlgorithm::Sha256 => Accumulator::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, block: &[u8]) {
        match self {
            Accumulator::Blake3(hasher) => {
                hasher.update(block);
            }
            Accumulator::Sha256(hasher) => hasher.update(block),
        }
    }

    fn finalize_upper_hex(self) -> String {
        match self {
            Accumulator::Blake3(hasher) => hex::encode_upper(hasher.finalize().as_bytes()),
            Accumulator::Sha256(hasher) => hex::encode_upper(hasher.finalize()),
        }
    }
}

/// Digest of the file at `path`, upper-case hex.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn digest_file(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
    digest_reader(File::open(path)?, algorithm)
}

/// Digest of everything `reader` yields, upper-case hex. Interrupted reads
/// are retried.
///
/// # Errors
/// Returns the first read error other than [`io::ErrorKind::Interrupted`].
pub fn digest_reader(mut reader: impl Read, algorithm: HashAlgorithm) -> io::Result<String> {
    let mut accumulator = Accumulator::new(algorithm);
    let mut buffer = vec![0u8; BLOCK_SIZE];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        accumulator.update(&buffer[..read]);
    }
    Ok(accumulator.finalize_upper_hex())
}

/// Outcome of checking a file against a published digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestCheck {
    pub actual: String,
    pub matched: bool,
}

/// Hash `path` and compare against `expected`, keeping the computed digest.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn check(path: &Path, expected: &ExpectedDigest) -> io::Result<DigestCheck> {
    let actual = digest_file(path, expected.algorithm)?;
    let matched = expected.matches(&actual);
    Ok(DigestCheck { actual, matched })
}

/// `true` only when the file's digest equals `expected` (case-insensitive).
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn verify(path: &Path, expected: &ExpectedDigest) -> io::Result<bool> {
    check(path, expected).map(|check| check.matched)
}
