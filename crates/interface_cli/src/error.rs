//! CLI error handling

use std::path::PathBuf;
use thiserror::Error;

use domain_billing::BillingError;

/// Errors raised while reading operator input or writing documents
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid usage file {path}: {source}")]
    Usage {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{path} line {line}: {message}")]
    Csv {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid argument: {0}")]
    Argument(String),
}

impl From<CliError> for BillingError {
    fn from(error: CliError) -> Self {
        BillingError::Render(error.to_string())
    }
}
