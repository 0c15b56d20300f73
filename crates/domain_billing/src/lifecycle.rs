//! Invoice lifecycle guard
//!
//! Sent and paid flags only ever move forward, and only by operator action.
//! A status batch names invoices by (user email, exact amount payable); every
//! row must match exactly one invoice in the expected state before any flag
//! is changed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use core_kernel::{InvoiceId, Money};

use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceState, StatusTransition};
use crate::ledger::{InvoiceQuery, LedgerStore};

/// One `user_email,amount_payable` row of an operator list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRow {
    pub user_email: String,
    pub amount_payable: Decimal,
}

impl AmountRow {
    pub fn new(user_email: impl Into<String>, amount_payable: Decimal) -> Self {
        Self {
            user_email: user_email.into(),
            amount_payable,
        }
    }

    pub fn amount(&self) -> Money {
        Money::new(self.amount_payable)
    }
}

/// A flag change applied to one invoice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub invoice_id: InvoiceId,
    pub user_email: String,
    pub amount_payable: Money,
    pub from: InvoiceState,
    pub to: InvoiceState,
}

/// Applies sent/paid transitions and checks invoices before they become
/// payable
pub struct LifecycleGuard {
    store: Arc<dyn LedgerStore>,
}

impl LifecycleGuard {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Checks a reconciled invoice before its amount payable is stored
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidStateTransition` if the invoice was
    /// already sent, and `BillingError::Validation` if the amount is
    /// negative.
    pub fn check_payable(invoice: &Invoice) -> Result<(), BillingError> {
        if invoice.is_frozen() {
            return Err(BillingError::InvalidStateTransition(format!(
                "invoice {} has been sent and cannot be changed",
                invoice.id
            )));
        }
        if invoice.amount_payable.is_negative() {
            return Err(BillingError::validation(format!(
                "invoice {} would have a negative amount payable {}",
                invoice.id, invoice.amount_payable
            )));
        }
        Ok(())
    }

    /// Applies a transition to every invoice named in `rows`
    ///
    /// All rows are matched first; if any row fails, nothing is changed.
    ///
    /// # Errors
    ///
    /// - `BillingError::NoMatchingInvoice` if a row matches no invoice in the
    ///   transition's starting state
    /// - `BillingError::Ambiguous` if a row matches several invoices, or two
    ///   rows match the same invoice
    pub async fn apply(
        &self,
        transition: StatusTransition,
        rows: &[AmountRow],
    ) -> Result<Vec<StatusChange>, BillingError> {
        let from = transition.from_state();
        let (sent, paid) = from.flags();
        let mut unit = self.store.begin().await?;

        let mut matched: Vec<Invoice> = Vec::with_capacity(rows.len());
        let mut claimed: HashMap<InvoiceId, usize> = HashMap::new();
        for (index, row) in rows.iter().enumerate() {
            let query = InvoiceQuery::by_email_and_amount(row.user_email.trim(), row.amount())
                .with_flags(sent, paid);
            let mut found = unit.find_invoices(&query).await?;

            match found.len() {
                0 => {
                    return Err(BillingError::NoMatchingInvoice {
                        email: row.user_email.clone(),
                        amount: row.amount_payable,
                        state: from.to_string(),
                    })
                }
                1 => {}
                n => {
                    return Err(BillingError::ambiguous(format!(
                        "{} invoices for {} with amount {} are {}",
                        n,
                        row.user_email,
                        row.amount(),
                        from
                    )))
                }
            }

            let invoice = found.remove(0);
            if let Some(earlier) = claimed.insert(invoice.id, index) {
                return Err(BillingError::ambiguous(format!(
                    "rows {} and {} both match invoice {}",
                    earlier + 1,
                    index + 1,
                    invoice.id
                )));
            }
            matched.push(invoice);
        }

        let mut changes = Vec::with_capacity(matched.len());
        for (invoice, row) in matched.iter().zip(rows) {
            let (sent, paid) = invoice.transition(transition)?;
            unit.set_invoice_flags(invoice.id, sent, paid).await?;
            info!(
                invoice_id = %invoice.id,
                email = %row.user_email,
                amount = %invoice.amount_payable,
                "Marked invoice {}",
                transition
            );
            changes.push(StatusChange {
                invoice_id: invoice.id,
                user_email: row.user_email.clone(),
                amount_payable: invoice.amount_payable,
                from,
                to: transition.to_state(),
            });
        }

        unit.commit().await?;
        Ok(changes)
    }
}
