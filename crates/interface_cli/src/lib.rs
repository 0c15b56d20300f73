//! Operator Command Line
//!
//! Wires the billing domain to its outer collaborators for the
//! `invoicing` binary.
//!
//! # Architecture
//!
//! - **cli**: argument definitions
//! - **config**: `INVOICING_*` environment configuration
//! - **commands**: one method per subcommand over the ledger store
//! - **prompt**: terminal confirmation and new-user details
//! - **input**: usage JSON and `user_email,amount_payable` lists
//! - **render**: JSON document output
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_cli::{Invoicing, JsonRenderer};
//!
//! let app = Invoicing::new(store, confirm, Arc::new(JsonRenderer::new(".")));
//! let run = app.create_invoices(&usage, params, new_users).await?;
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod input;
pub mod prompt;
pub mod render;

pub use commands::{InvoiceRun, Invoicing};
pub use config::InvoicingConfig;
pub use error::CliError;
pub use prompt::{Prompt, PromptedUsers};
pub use render::JsonRenderer;
