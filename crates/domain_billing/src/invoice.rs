//! Invoice records and the sent/paid lifecycle
//!
//! An invoice moves through three states:
//!
//! ```text
//! unsent/unpaid ──mark sent──▶ sent/unpaid ──mark paid──▶ sent/paid
//!   (mutable)                 (frozen for reconciliation)   (terminal)
//! ```

use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{BillingPeriod, InvoiceId, Money, UserId};

use crate::error::BillingError;

/// Amount stored on a debit invoice until its balance has been computed
pub fn placeholder_amount() -> Money {
    Money::new(dec!(99999.99))
}

/// Whether an invoice charges for usage or sells prepaid credit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceType {
    /// Standard invoice for staff time and consumables
    Debit,
    /// Prepayment invoice; once paid it funds available credit
    Credit,
}

impl InvoiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceType::Debit => "debit",
            InvoiceType::Credit => "credit",
        }
    }
}

impl fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceType {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(InvoiceType::Debit),
            "credit" => Ok(InvoiceType::Credit),
            other => Err(BillingError::validation(format!("unknown invoice type '{}'", other))),
        }
    }
}

/// Lifecycle state derived from the `sent` and `paid` flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceState {
    UnsentUnpaid,
    SentUnpaid,
    SentPaid,
}

impl InvoiceState {
    /// Reads the state from stored flags
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidStateTransition` for the impossible
    /// combination paid-but-not-sent.
    pub fn from_flags(sent: bool, paid: bool) -> Result<Self, BillingError> {
        match (sent, paid) {
            (false, false) => Ok(InvoiceState::UnsentUnpaid),
            (true, false) => Ok(InvoiceState::SentUnpaid),
            (true, true) => Ok(InvoiceState::SentPaid),
            (false, true) => Err(BillingError::InvalidStateTransition(
                "invoice is marked paid but not sent".to_string(),
            )),
        }
    }

    /// The `(sent, paid)` flags for this state
    pub fn flags(&self) -> (bool, bool) {
        match self {
            InvoiceState::UnsentUnpaid => (false, false),
            InvoiceState::SentUnpaid => (true, false),
            InvoiceState::SentPaid => (true, true),
        }
    }
}

impl fmt::Display for InvoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InvoiceState::UnsentUnpaid => "not sent nor paid",
            InvoiceState::SentUnpaid => "sent but not paid",
            InvoiceState::SentPaid => "sent and paid",
        };
        f.write_str(text)
    }
}

/// An operator-driven lifecycle step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    MarkSent,
    MarkPaid,
}

impl StatusTransition {
    /// State an invoice must be in for the transition to apply
    pub fn from_state(&self) -> InvoiceState {
        match self {
            StatusTransition::MarkSent => InvoiceState::UnsentUnpaid,
            StatusTransition::MarkPaid => InvoiceState::SentUnpaid,
        }
    }

    /// State the invoice is in afterwards
    pub fn to_state(&self) -> InvoiceState {
        match self {
            StatusTransition::MarkSent => InvoiceState::SentUnpaid,
            StatusTransition::MarkPaid => InvoiceState::SentPaid,
        }
    }
}

impl fmt::Display for StatusTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusTransition::MarkSent => f.write_str("sent"),
            StatusTransition::MarkPaid => f.write_str("paid"),
        }
    }
}

/// An invoice stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub user_id: UserId,
    pub invoice_type: InvoiceType,
    pub period: BillingPeriod,
    pub timestamp: DateTime<Utc>,
    pub chargeable_account: String,
    /// Final only once the balance has been computed; see [`placeholder_amount`]
    pub amount_payable: Money,
    pub reference_text: Option<String>,
    pub sent: bool,
    pub paid: bool,
}

impl Invoice {
    pub fn state(&self) -> Result<InvoiceState, BillingError> {
        InvoiceState::from_flags(self.sent, self.paid)
    }

    /// Sent invoices are never modified by reconciliation
    pub fn is_frozen(&self) -> bool {
        self.sent
    }

    pub fn is_credit(&self) -> bool {
        self.invoice_type == InvoiceType::Credit
    }

    /// Checks a transition against the current flags and returns the new ones
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidStateTransition` if the invoice is not in
    /// the state the transition starts from.
    pub fn transition(&self, transition: StatusTransition) -> Result<(bool, bool), BillingError> {
        let current = self.state()?;
        if current != transition.from_state() {
            return Err(BillingError::InvalidStateTransition(format!(
                "invoice {} is {}; cannot mark {}",
                self.id, current, transition
            )));
        }
        Ok(transition.to_state().flags())
    }

    /// Document number: `C<id>` for credit invoices, the bare id otherwise
    pub fn document_number(&self) -> String {
        match self.invoice_type {
            InvoiceType::Credit => format!("C{}", self.id.value()),
            InvoiceType::Debit => self.id.value().to_string(),
        }
    }
}

/// An invoice to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub user_id: UserId,
    pub invoice_type: InvoiceType,
    pub period: BillingPeriod,
    pub timestamp: DateTime<Utc>,
    pub chargeable_account: String,
    pub amount_payable: Money,
}

impl NewInvoice {
    /// A debit invoice awaiting its charges
    pub fn debit(
        user_id: UserId,
        period: BillingPeriod,
        timestamp: DateTime<Utc>,
        chargeable_account: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            invoice_type: InvoiceType::Debit,
            period,
            timestamp,
            chargeable_account: chargeable_account.into(),
            amount_payable: placeholder_amount(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::BillingMonth;

    fn invoice(sent: bool, paid: bool) -> Invoice {
        let month = BillingMonth::new(2024, 5).unwrap();
        Invoice {
            id: InvoiceId::new(3),
            user_id: UserId::new(1),
            invoice_type: InvoiceType::Debit,
            period: BillingPeriod::single(month),
            timestamp: Utc::now(),
            chargeable_account: "1414".to_string(),
            amount_payable: Money::new(dec!(70)),
            reference_text: None,
            sent,
            paid,
        }
    }

    #[test]
    fn test_mark_sent_from_unsent() {
        assert_eq!(
            invoice(false, false).transition(StatusTransition::MarkSent).unwrap(),
            (true, false)
        );
    }

    #[test]
    fn test_mark_paid_requires_sent() {
        assert!(invoice(false, false).transition(StatusTransition::MarkPaid).is_err());
        assert_eq!(
            invoice(true, false).transition(StatusTransition::MarkPaid).unwrap(),
            (true, true)
        );
    }

    #[test]
    fn test_paid_is_terminal() {
        let paid = invoice(true, true);
        assert!(paid.transition(StatusTransition::MarkSent).is_err());
        assert!(paid.transition(StatusTransition::MarkPaid).is_err());
    }

    #[test]
    fn test_paid_without_sent_is_invalid() {
        assert!(InvoiceState::from_flags(false, true).is_err());
    }

    #[test]
    fn test_document_number() {
        let mut inv = invoice(false, false);
        assert_eq!(inv.document_number(), "3");
        inv.invoice_type = InvoiceType::Credit;
        assert_eq!(inv.document_number(), "C3");
    }
}
