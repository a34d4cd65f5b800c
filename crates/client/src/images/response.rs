//! Image API response envelopes.

use serde::Deserialize;

/// Standard `{ success, errors, result }` envelope.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// `result` of an upload.
#[derive(Debug, Deserialize)]
pub struct UploadResult {
    pub id: String,
    #[serde(default)]
    pub variants: Vec<String>,
}

impl<T> ApiEnvelope<T> {
    /// Joined error messages, for logs.
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "success=false".to_string();
        }
        self.errors.iter().map(|e| format!("{}: {}", e.code, e.message)).collect::<Vec<_>>().join("; ")
    }
}
