use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::RenditionFormat;

#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error("song card has no usable identifier")]
    MissingId,

    #[error("required field {field} not found on song card")]
    MissingField { field: &'static str },

    #[error("invalid {field}: '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("timed out waiting for {format} transfer after {timeout_ms} ms")]
    TransferTimeout {
        format: RenditionFormat,
        timeout_ms: u128,
    },

    #[error("timed out waiting for {0}")]
    AffordanceTimeout(String),

    #[error("provider action failed: {0}")]
    Provider(String),

    #[error("WebDriver request failed: {0}")]
    WebDriverHttp(String),

    #[error("WebDriver command timed out: {0}")]
    WebDriverTimeout(String),

    #[error("WebDriver returned status {status}: {error}: {message}")]
    WebDriverStatus {
        status: u16,
        error: String,
        message: String,
    },

    #[error("unsupported browser engine: {0}")]
    #[diagnostic(help("use one of: firefox, chromium, webkit"))]
    InvalidBrowser(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to encode song store: {0}")]
    StoreEncode(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("session snapshot not found at {0}")]
    #[diagnostic(help("run `suno-sync login` first to capture a logged-in session"))]
    MissingSession(PathBuf),

    #[error("failed to parse session snapshot: {0}")]
    SessionParse(String),
}

impl SyncError {
    /// Errors that abandon a single song card while the run carries on.
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            SyncError::MissingId
                | SyncError::MissingField { .. }
                | SyncError::InvalidField { .. }
                | SyncError::TransferTimeout { .. }
                | SyncError::AffordanceTimeout(_)
                | SyncError::Provider(_)
                | SyncError::WebDriverStatus { .. }
                | SyncError::WebDriverTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_scope_classification() {
        assert!(SyncError::MissingId.is_item_scoped());
        assert!(
            SyncError::TransferTimeout {
                format: RenditionFormat::AudioLossless,
                timeout_ms: 10_000,
            }
            .is_item_scoped()
        );
        assert!(!SyncError::Filesystem("disk full".to_string()).is_item_scoped());
        assert!(!SyncError::WebDriverHttp("connection refused".to_string()).is_item_scoped());
        assert!(SyncError::WebDriverTimeout("element click".to_string()).is_item_scoped());
    }
}
