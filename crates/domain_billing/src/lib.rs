//! Billing Domain - Facility Invoicing Ledger
//!
//! This crate reconciles facility usage against a ledger of users, projects,
//! invoices and charges, applies subsidies and prepaid credit, and guards
//! the sent/paid lifecycle of finished invoices.
//!
//! # Flow
//!
//! ```text
//! UsageInput ─▶ normalise ─▶ ReconciliationEngine ─▶ resolve_credit ─▶ LifecycleGuard
//!                                  │                                        │
//!                                  └──────────── LedgerUnit (one per user) ─┘
//! ```
//!
//! # Subsidy and credit
//!
//! - Every charge: `subtotal = cost - cost * subsidy_percent / 100`
//! - Balance: sum of staff and consumable subtotals
//! - Available credit: paid credit invoices minus applied credit debits
//! - Amount payable: `balance - min(available, balance)` when both are positive
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::{ReconciliationEngine, RunParameters, InMemoryLedger};
//!
//! let engine = ReconciliationEngine::new(store, confirm, new_users, params);
//! let report = engine.run(&usage).await?;
//! for invoice in report.reconciled() {
//!     publish(&renderer, confirm.as_ref(), &invoice_document(invoice)?)?;
//! }
//! ```

pub mod charge;
pub mod confirm;
pub mod credit;
pub mod credit_invoice;
pub mod error;
pub mod invoice;
pub mod ledger;
pub mod lifecycle;
pub mod memory;
pub mod project;
pub mod reconciliation;
pub mod statement;
pub mod usage;
pub mod user;

pub use charge::{
    ChargeChange, ConsumableCharge, ConsumableKey, InvoiceTotals, NewConsumableCharge,
    NewStaffCharge, StaffCharge,
};
pub use confirm::{AlwaysDecline, AutoConfirm, Confirmation, Question, ScriptedConfirmation};
pub use credit::{apply_credit, resolve_credit, CreditApplication, CreditDebit, CreditPosition, NewCreditDebit};
pub use credit_invoice::{CreditInvoiceIssuer, IssuedCredit};
pub use error::BillingError;
pub use invoice::{Invoice, InvoiceState, InvoiceType, NewInvoice, StatusTransition};
pub use ledger::{InvoiceQuery, LedgerStore, LedgerUnit};
pub use lifecycle::{AmountRow, LifecycleGuard, StatusChange};
pub use memory::{InMemoryLedger, LedgerState};
pub use project::{NewProject, Project, ProjectType};
pub use reconciliation::{
    InvoiceOutcome, ReconciledInvoice, ReconciliationContext, ReconciliationEngine, RunParameters,
    RunReport, StaffLine, UserFailure,
};
pub use statement::{credit_document, invoice_document, publish, Document, DocumentRenderer};
pub use usage::{check_line_amounts, normalise, NormalisedUsage, ProjectIdentity, UsageDate, UsageInput};
pub use user::{NewUser, NewUserRecord, NewUserSource, PreparedUsers, User};
