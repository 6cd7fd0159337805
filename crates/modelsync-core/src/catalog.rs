use modelsync_domain::ModelDocument;
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::HttpSettings;
use crate::error::{CatalogError, FetchError};
use crate::net;

/// A model document together with the exact JSON it was decoded from.
///
/// The raw value is what gets written to `civitai_model.json` so the
/// snapshot keeps every field the catalog served.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub raw: Value,
    pub document: ModelDocument,
}

impl CatalogEntry {
    /// # Errors
    /// Fails when `raw` does not have the shape of a model document.
    pub fn from_value(raw: Value) -> Result<Self, serde_json::Error> {
        let document = serde_json::from_value(raw.clone())?;
        Ok(Self { raw, document })
    }
}

pub trait Catalog: Send + Sync {
    fn fetch_model(&self, model_id: u64) -> Result<CatalogEntry, CatalogError>;
}

/// Catalog served over HTTP at `{api_base}/api/v1/models/{id}`.
pub struct HttpCatalog {
    client: Client,
    api_base: String,
}

impl HttpCatalog {
    /// # Errors
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(settings: &HttpSettings, api_base: &str) -> Result<Self, FetchError> {
        let client = net::build_client(settings).map_err(FetchError::Client)?;
        Ok(Self::with_client(client, api_base))
    }

    pub fn with_client(client: Client, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn model_url(&self, model_id: u64) -> String {
        format!("{}/api/v1/models/{model_id}", self.api_base)
    }
}

impl Catalog for HttpCatalog {
    fn fetch_model(&self, model_id: u64) -> Result<CatalogEntry, CatalogError> {
        let url = self.model_url(model_id);
        debug!(%url, "requesting model document");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|source| CatalogError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let body = response.bytes().map_err(|source| CatalogError::Transport {
            url: url.clone(),
            source,
        })?;
        serde_json::from_slice::<Value>(&body)
            .and_then(CatalogEntry::from_value)
            .map_err(|source| CatalogError::Decode { url, source })
    }
}
