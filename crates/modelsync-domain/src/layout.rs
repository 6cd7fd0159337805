//! Where a mirrored model lands on disk.
//!
//! ```text
//! {root}/models/{kind folder}/{id}_{model name}/
//!     civitai_model.json                   latest catalog snapshot
//!     civitai_model_DD_MM_YYYY__HH_MM.json archived snapshots
//!     {version name}/
//!         {file name}                      model files (+ transient .inc/.invalid markers)
//!         samples/{N}.jpg|json|meta
//! ```

use std::path::{Path, PathBuf};

use crate::catalog::{ModelDocument, ModelVersion};
use crate::naming::sanitize_component;

pub const SNAPSHOT_FILE: &str = "civitai_model.json";
pub const SAMPLES_DIR: &str = "samples";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Checkpoint,
    Lora,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("model type `{0}` is not supported yet")]
pub struct UnsupportedModelType(pub String);

impl ModelKind {
    pub fn from_catalog_type(raw: &str) -> Result<Self, UnsupportedModelType> {
        match raw {
            "Checkpoint" => Ok(ModelKind::Checkpoint),
            "LORA" => Ok(ModelKind::Lora),
            other => Err(UnsupportedModelType(other.to_string())),
        }
    }

    pub fn folder(self, root: &Path) -> PathBuf {
        let leaf = match self {
            ModelKind::Checkpoint => "Stable-diffusion",
            ModelKind::Lora => "LoRA",
        };
        root.join("models").join(leaf)
    }
}

#[derive(Debug, Clone)]
pub struct ModelLayout {
    pub kind: ModelKind,
    pub model_dir: PathBuf,
}

impl ModelLayout {
    pub fn resolve(root: &Path, document: &ModelDocument) -> Result<Self, UnsupportedModelType> {
        let kind = ModelKind::from_catalog_type(&document.kind)?;
        let folder = format!(
            "{}_{}",
            document.id,
            sanitize_component(&document.name, false)
        );
        Ok(Self {
            kind,
            model_dir: kind.folder(root).join(folder),
        })
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.model_dir.join(SNAPSHOT_FILE)
    }

    /// Versions whose name sanitizes to nothing fall back to their catalog id.
    pub fn version_dir(&self, version: &ModelVersion) -> PathBuf {
        let mut name = sanitize_component(&version.name, true);
        if name.is_empty() {
            name = version
                .id
                .map_or_else(|| "unnamed".to_string(), |id| id.to_string());
        }
        self.model_dir.join(name)
    }

    pub fn samples_dir(&self, version: &ModelVersion) -> PathBuf {
        self.version_dir(version).join(SAMPLES_DIR)
    }
}
