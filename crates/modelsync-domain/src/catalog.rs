//! Catalog document types as served by the model API.
//!
//! Only the fields the mirror acts on are typed. Everything else is kept in
//! `extra` maps so that re-serializing a record yields the full remote record.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Upstream scan verdict for a file that passed pickle and virus scanning.
pub const SCAN_SUCCESS: &str = "Success";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDocument {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub model_versions: Vec<ModelVersion>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelVersion {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub files: Vec<ModelFile>,
    #[serde(default)]
    pub images: Vec<ModelImage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFile {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(rename = "sizeKB", default)]
    pub size_kb: Option<f64>,
    pub download_url: String,
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub pickle_scan_result: Option<String>,
    #[serde(default)]
    pub virus_scan_result: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelFile {
    /// Both upstream scans finished and reported success.
    ///
    /// Freshly uploaded files report `Pending` for both scans and carry no
    /// hashes yet; those are treated as unsafe.
    pub fn is_scanned_safe(&self) -> bool {
        self.pickle_scan_result.as_deref() == Some(SCAN_SUCCESS)
            && self.virus_scan_result.as_deref() == Some(SCAN_SUCCESS)
    }

    /// The strongest digest the catalog published for this file.
    pub fn expected_digest(&self) -> Option<ExpectedDigest> {
        [HashAlgorithm::Blake3, HashAlgorithm::Sha256]
            .into_iter()
            .find_map(|algorithm| {
                self.hashes
                    .get(algorithm.catalog_key())
                    .map(|hex| hex.trim())
                    .filter(|hex| !hex.is_empty())
                    .map(|hex| ExpectedDigest::new(algorithm, hex))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelImage {
    /// Stable identity used to match a remote image against local samples.
    ///
    /// The content hash when published, otherwise the image URL.
    pub fn identity(&self) -> &str {
        self.hash
            .as_deref()
            .map(str::trim)
            .filter(|hash| !hash.is_empty())
            .unwrap_or(self.url.as_str())
    }

    /// The nested generation metadata, `null` when the catalog has none.
    pub fn meta_value(&self) -> &Value {
        self.meta.as_ref().unwrap_or(&Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Blake3,
    Sha256,
}

impl HashAlgorithm {
    pub fn catalog_key(self) -> &'static str {
        match self {
            HashAlgorithm::Blake3 => "BLAKE3",
            HashAlgorithm::Sha256 => "SHA256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.catalog_key())
    }
}

/// A digest published by the catalog, normalized to upper-case hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedDigest {
    pub algorithm: HashAlgorithm,
    pub hex: String,
}

impl ExpectedDigest {
    pub fn new(algorithm: HashAlgorithm, hex: &str) -> Self {
        Self {
            algorithm,
            hex: hex.trim().to_ascii_uppercase(),
        }
    }

    pub fn matches(&self, actual_hex: &str) -> bool {
        self.hex.eq_ignore_ascii_case(actual_hex.trim())
    }
}

impl fmt::Display for ExpectedDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}
