use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error shared by the ledger, its stores, and the HTTP shell.
///
/// `code` prefixes classify the failure: `VALIDATION_*` is caller data and is the only class the
/// ledger returns; `STORE_*`, `DB_*` and `KV_*` come from durable stores and are absorbed by the
/// ledger's fallback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    /// Rejected caller input. `message` is safe to show to the caller verbatim.
    pub fn validation(what: &str, message: impl Into<String>) -> Self {
        Self::new(format!("VALIDATION_{what}"), message)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Caller-supplied data was rejected. This is the only error class the ledger lets escape.
    pub fn is_validation(&self) -> bool {
        self.code.starts_with("VALIDATION_")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
