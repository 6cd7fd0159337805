#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod catalog;
pub mod layout;
pub mod naming;
pub mod page_url;

pub use catalog::{
    ExpectedDigest, HashAlgorithm, ModelDocument, ModelFile, ModelImage, ModelVersion,
    SCAN_SUCCESS,
};
pub use layout::{ModelKind, ModelLayout, UnsupportedModelType, SAMPLES_DIR, SNAPSHOT_FILE};
pub use naming::sanitize_component;
pub use page_url::{InvalidModelUrl, ModelPageUrl};
