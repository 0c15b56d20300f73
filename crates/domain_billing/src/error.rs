//! Billing domain errors

use core_kernel::{BillingPeriod, MoneyError, PeriodError, PortError};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur in the billing domain
///
/// Validation errors are raised before anything is written. Ambiguity,
/// overlap and decline errors abort the unit of work for the affected user
/// or row; units already committed for other users are left alone.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Usage input or operator data failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// A lookup matched more than one record
    #[error("Ambiguous match: {0}")]
    Ambiguous(String),

    /// An existing invoice overlaps the requested period without matching it
    #[error("Invoice period {requested} for {user} overlaps existing invoice period(s) {existing}")]
    PeriodOverlap {
        user: String,
        requested: BillingPeriod,
        existing: String,
    },

    /// The operator answered no to a confirmation
    #[error("Declined by operator: {0}")]
    Declined(String),

    /// A referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// No invoice matched a status row
    #[error("No invoice for {email} with amount {amount} is {state}")]
    NoMatchingInvoice {
        email: String,
        amount: Decimal,
        state: String,
    },

    /// A sent/paid transition is not allowed from the current state
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// A document could not be written
    #[error("Render error: {0}")]
    Render(String),

    /// Ledger store failure
    #[error("Ledger error: {0}")]
    Port(#[from] PortError),
}

impl BillingError {
    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation(message.into())
    }

    pub fn ambiguous(message: impl Into<String>) -> Self {
        BillingError::Ambiguous(message.into())
    }

    pub fn declined(message: impl Into<String>) -> Self {
        BillingError::Declined(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        BillingError::NotFound(message.into())
    }

    /// True when the error is the operator saying no rather than a fault
    pub fn is_decline(&self) -> bool {
        matches!(self, BillingError::Declined(_))
    }

    /// True for input problems detected before any mutation
    pub fn is_validation(&self) -> bool {
        matches!(self, BillingError::Validation(_))
    }
}

impl From<MoneyError> for BillingError {
    fn from(error: MoneyError) -> Self {
        BillingError::Validation(error.to_string())
    }
}

impl From<PeriodError> for BillingError {
    fn from(error: PeriodError) -> Self {
        BillingError::Validation(error.to_string())
    }
}
