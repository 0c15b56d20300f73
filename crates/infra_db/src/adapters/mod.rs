//! Domain Adapters
//!
//! Implementations of the billing domain's storage ports on top of the
//! SQLite repository layer.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::SqliteLedger;
//! use domain_billing::LedgerStore;
//!
//! let ledger = SqliteLedger::new(pool);
//! let mut unit = ledger.begin().await?;
//! ```

pub mod ledger;

pub use ledger::{SqliteLedger, SqliteLedgerUnit};
