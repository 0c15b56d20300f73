//! Operator configuration
//!
//! Values come from `INVOICING_*` environment variables (a `.env` file is
//! loaded first by the binary). Command line flags override them.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;

/// Invoicing configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InvoicingConfig {
    /// SQLite ledger URL
    pub database_url: String,
    /// Staff hourly rate in EUR
    pub hourly_rate: Decimal,
    /// Account users transfer payments to
    pub chargeable_account: String,
    /// Facility name; also marks facility-internal projects
    pub facility_name: String,
    /// Directory documents are written to
    pub output_dir: PathBuf,
    /// Log level
    pub log_level: String,
    /// Emit logs as JSON lines
    pub json_logs: bool,
}

impl Default for InvoicingConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://invoicing.db".to_string(),
            hourly_rate: Decimal::from(20),
            chargeable_account: "1414 11171 08 2151040901".to_string(),
            facility_name: "SequAna".to_string(),
            output_dir: PathBuf::from("."),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl InvoicingConfig {
    /// Loads configuration from the environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::with_prefix("INVOICING"))
    }

    fn from_source<S>(source: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }
}
