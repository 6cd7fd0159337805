use std::fmt;

use url::Url;

pub const CATALOG_HOST: &str = "civitai.com";

/// A model page link such as `https://civitai.com/models/4201/realistic-vision`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPageUrl {
    pub model_id: u64,
    pub slug: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("not a valid model page url: {input} ({reason})")]
pub struct InvalidModelUrl {
    pub input: String,
    pub reason: &'static str,
}

impl ModelPageUrl {
    pub fn parse(input: &str) -> Result<Self, InvalidModelUrl> {
        let invalid = |reason| InvalidModelUrl {
            input: input.to_string(),
            reason,
        };
        let url = Url::parse(input.trim()).map_err(|_| invalid("unparseable url"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if url.host_str() != Some(CATALOG_HOST) {
            return Err(invalid("unexpected host"));
        }
        let mut segments = url
            .path_segments()
            .ok_or_else(|| invalid("missing path"))?;
        if segments.next() != Some("models") {
            return Err(invalid("path must start with /models/"));
        }
        let model_id = segments
            .next()
            .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|id| id.parse::<u64>().ok())
            .ok_or_else(|| invalid("missing numeric model id"))?;
        let slug = segments
            .next()
            .filter(|slug| !slug.is_empty())
            .ok_or_else(|| invalid("missing model slug"))?
            .to_string();
        Ok(Self { model_id, slug })
    }
}

impl fmt::Display for ModelPageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "https://{CATALOG_HOST}/models/{}/{}",
            self.model_id, self.slug
        )
    }
}
