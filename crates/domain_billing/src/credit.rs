//! Prepaid credit and its application against debit invoices
//!
//! A user's available credit is never stored. It is always derived:
//!
//! ```text
//! available = Σ amount_payable of paid credit invoices − Σ credit debits
//! ```
//!
//! Applying credit to an invoice first removes any debits recorded for the
//! same (invoice, user) by an earlier run, so re-running a reconciliation
//! reaches the same result.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use core_kernel::{CreditDebitId, InvoiceId, Money, UserId};

use crate::error::BillingError;
use crate::invoice::Invoice;
use crate::ledger::{InvoiceQuery, LedgerUnit};
use crate::user::User;

/// One application of a user's credit against a debit invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditDebit {
    pub id: CreditDebitId,
    pub user_id: UserId,
    pub debit_invoice_id: InvoiceId,
    pub amount: Money,
}

/// A credit debit to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCreditDebit {
    pub user_id: UserId,
    pub debit_invoice_id: InvoiceId,
    pub amount: Money,
}

/// Snapshot of the rows a user's credit is derived from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreditPosition {
    /// Sum of paid credit invoices
    pub purchased: Money,
    /// Sum of every credit debit recorded against the user
    pub used: Money,
}

impl CreditPosition {
    /// Builds a position from loaded rows
    pub fn from_rows(paid_credit_invoices: &[Invoice], debits: &[CreditDebit]) -> Self {
        Self {
            purchased: paid_credit_invoices.iter().map(|i| i.amount_payable).sum(),
            used: debits.iter().map(|d| d.amount).sum(),
        }
    }

    pub fn available(&self) -> Money {
        self.purchased - self.used
    }
}

/// Outcome of netting credit against an invoice balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditApplication {
    /// Credit available before this invoice
    pub starting_credit: Money,
    /// Credit consumed by this invoice
    pub applied: Money,
    /// Credit left afterwards
    pub closing_credit: Money,
    /// Invoice balance before credit
    pub balance_before: Money,
    /// Balance after credit; the invoice's final amount payable
    pub amount_payable: Money,
}

/// Nets available credit against a balance
///
/// Nothing is applied when the balance is not positive or there is no
/// credit; otherwise `min(available, balance)` is applied.
pub fn apply_credit(position: &CreditPosition, balance: Money) -> CreditApplication {
    let available = position.available();
    let applied = if balance.is_positive() && available.is_positive() {
        available.min(balance)
    } else {
        Money::zero()
    };

    CreditApplication {
        starting_credit: available,
        applied,
        closing_credit: available - applied,
        balance_before: balance,
        amount_payable: balance - applied,
    }
}

/// Loads a user's credit position through a unit of work
pub async fn credit_position(
    unit: &mut dyn LedgerUnit,
    user_id: UserId,
) -> Result<CreditPosition, BillingError> {
    let purchased = unit.find_invoices(&InvoiceQuery::paid_credit_for(user_id)).await?;
    let debits = unit.credit_debits_for_user(user_id).await?;
    Ok(CreditPosition::from_rows(&purchased, &debits))
}

/// Applies a user's credit to an invoice and records the debit
///
/// Prior debits for (invoice, user) are removed before the position is
/// read, so the starting credit includes what an earlier run applied.
///
/// # Errors
///
/// Returns `BillingError::Port` if the ledger cannot be read or written.
pub async fn resolve_credit(
    unit: &mut dyn LedgerUnit,
    user: &User,
    invoice: &Invoice,
    balance: Money,
) -> Result<CreditApplication, BillingError> {
    let removed = unit.delete_credit_debits(invoice.id, user.id).await?;
    if removed > 0 {
        debug!(invoice_id = %invoice.id, removed, "Removed earlier credit debits");
    }

    let position = credit_position(unit, user.id).await?;
    let application = apply_credit(&position, balance);

    if application.applied.is_positive() {
        unit.insert_credit_debit(NewCreditDebit {
            user_id: user.id,
            debit_invoice_id: invoice.id,
            amount: application.applied,
        })
        .await?;
        info!(
            invoice_id = %invoice.id,
            applied = %application.applied,
            closing = %application.closing_credit,
            "Applied prepaid credit"
        );
    }

    Ok(application)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(purchased: rust_decimal::Decimal, used: rust_decimal::Decimal) -> CreditPosition {
        CreditPosition {
            purchased: Money::new(purchased),
            used: Money::new(used),
        }
    }

    #[test]
    fn test_credit_below_balance() {
        let app = apply_credit(&position(dec!(80), dec!(0)), Money::new(dec!(150)));
        assert_eq!(app.applied.amount(), dec!(80));
        assert_eq!(app.amount_payable.amount(), dec!(70));
        assert!(app.closing_credit.is_zero());
    }

    #[test]
    fn test_credit_exceeds_balance() {
        let app = apply_credit(&position(dec!(500), dec!(0)), Money::new(dec!(150)));
        assert_eq!(app.applied.amount(), dec!(150));
        assert!(app.amount_payable.is_zero());
        assert_eq!(app.closing_credit.amount(), dec!(350));
    }

    #[test]
    fn test_no_credit_on_zero_balance() {
        let app = apply_credit(&position(dec!(500), dec!(0)), Money::zero());
        assert!(app.applied.is_zero());
        assert_eq!(app.starting_credit, app.closing_credit);
    }

    #[test]
    fn test_exhausted_credit() {
        let app = apply_credit(&position(dec!(100), dec!(100)), Money::new(dec!(40)));
        assert!(app.applied.is_zero());
        assert_eq!(app.amount_payable.amount(), dec!(40));
    }
}
