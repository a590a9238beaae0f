use serde::{Deserialize, Serialize};

/// Error envelope returned by the backend on non-2xx responses.
///
/// `detail` is either a plain message or a list of validation entries that
/// each carry a `msg` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub detail: serde_json::Value,
}

impl ApiErrorBody {
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(message) => message.clone(),
            serde_json::Value::Array(entries) => entries
                .iter()
                .map(|entry| {
                    entry
                        .get("msg")
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| entry.to_string())
                })
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        }
    }
}

/// Best-effort human readable text for an error response body.
pub fn describe_error_body(body: &[u8]) -> String {
    if let Ok(envelope) = serde_json::from_slice::<ApiErrorBody>(body) {
        return envelope.message();
    }
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "<empty>".to_string()
    } else {
        trimmed.to_string()
    }
}
