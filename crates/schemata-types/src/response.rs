//! Outcome records returned by remote mutations.

use serde::{Deserialize, Serialize};

/// Error details attached to a failed remote call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    #[serde(default)]
    pub error_code: serde_json::Value,
    #[serde(default)]
    pub message: serde_json::Value,
}

impl ErrorInfo {
    /// Human-readable message, whatever shape the remote sent.
    pub fn describe(&self) -> String {
        match &self.message {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => match &self.error_code {
                serde_json::Value::Null => "unknown error".to_string(),
                code => format!("error code {code}"),
            },
            other => other.to_string(),
        }
    }
}

/// Generic success/failure envelope (lock, unlock, revert).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteResponse {
    pub success: bool,
    #[serde(default)]
    pub error_info: Option<ErrorInfo>,
}

impl RemoteResponse {
    pub fn ok() -> Self {
        Self { success: true, error_info: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_info: Some(ErrorInfo {
                error_code: serde_json::Value::Null,
                message: serde_json::Value::String(message.into()),
            }),
        }
    }

    /// Failure description, or a generic message when the remote gave none.
    pub fn error_message(&self) -> String {
        self.error_info
            .as_ref()
            .map(ErrorInfo::describe)
            .unwrap_or_else(|| "remote rejected the request".to_string())
    }
}

/// Result of saving a schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub success: bool,
    #[serde(default)]
    pub error_info: Option<ErrorInfo>,
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl SaveResponse {
    pub fn ok() -> Self {
        Self { success: true, ..Self::default() }
    }

    pub fn error_message(&self) -> String {
        if let Some(info) = &self.error_info {
            return info.describe();
        }
        if let Some(msg) = self.message.as_deref().filter(|m| !m.is_empty()) {
            return msg.to_string();
        }
        match &self.errors {
            Some(errors) if !errors.is_null() => errors.to_string(),
            _ => "error saving schema".to_string(),
        }
    }
}

/// One compiler diagnostic from a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMessage {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub line: i64,
    #[serde(default)]
    pub column: i64,
    #[serde(default)]
    pub error_number: String,
    #[serde(default)]
    pub error_text: String,
}

/// Result of a build or rebuild.
///
/// Builds report failure through `errors` rather than the usual envelope, so
/// this type is decoded on its own instead of through [`RemoteResponse`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResponse {
    pub success: bool,
    #[serde(default)]
    pub build_result: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Option<Vec<BuildMessage>>,
}
