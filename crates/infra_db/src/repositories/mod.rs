//! Repository functions for the ledger tables
//!
//! Repositories hold the SQL and map between rows and domain types. They
//! run on a borrowed connection so a caller can group several statements
//! in one transaction.

pub mod ledger;
