//! Stored capture records.
//!
//! Current records are JSON objects holding the hosted image id. Older
//! records may carry only a public variant URL, and the oldest are the bare
//! variant URL with no JSON wrapper at all.

use serde::{Deserialize, Serialize};
use url::Url;

/// The value stored under a capture key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CacheRecord {
    /// A record written by the cache writer: the hosted id plus the variant
    /// URL served when the original cannot be fetched.
    pub fn with_variant(id: impl Into<String>, variant: Option<&str>) -> Self {
        Self { id: Some(id.into()), url: variant.filter(|v| !v.is_empty()).map(str::to_string) }
    }

    /// Interpret a stored value. Anything that is not a JSON object is read
    /// as a bare variant URL.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<CacheRecord>(raw) {
            Ok(record) => record,
            Err(_) => Self { id: None, url: Some(raw.trim().to_string()).filter(|s| !s.is_empty()) },
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Non-empty explicit id.
    pub fn explicit_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// The explicit id, else one recovered from the variant URL.
    pub fn image_id(&self, delivery_host: &str) -> Option<String> {
        if let Some(id) = self.explicit_id() {
            return Some(id.to_string());
        }
        self.url.as_deref().and_then(|u| image_id_from_variant_url(u, delivery_host))
    }

    pub fn is_empty(&self) -> bool {
        self.explicit_id().is_none() && self.url.as_deref().is_none_or(str::is_empty)
    }
}

/// Recover the image id from `https://<delivery_host>/<account>/<id>/<variant>`.
pub fn image_id_from_variant_url(raw: &str, delivery_host: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    if !host.ends_with(delivery_host) {
        return None;
    }
    let parts: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    if parts.len() < 3 {
        return None;
    }
    Some(parts[1].to_string())
}
