//! Infrastructure Database Layer
//!
//! SQLite persistence for the facility invoicing ledger, using SQLx.
//!
//! # Architecture
//!
//! - [`pool`]: connection pool and embedded migrations
//! - [`repositories`]: parameterised SQL and row mapping
//! - [`adapters`]: the [`SqliteLedger`] implementation of the billing
//!   domain's `LedgerStore` port
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool_from_url, run_migrations, SqliteLedger};
//!
//! let pool = create_pool_from_url("sqlite://invoicing.db").await?;
//! run_migrations(&pool).await?;
//! let ledger = SqliteLedger::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool};
pub use error::DatabaseError;
pub use adapters::{SqliteLedger, SqliteLedgerUnit};
