//! Issuing prepaid credit invoices

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use core_kernel::{BillingMonth, BillingPeriod};

use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceType, NewInvoice};
use crate::ledger::{InvoiceQuery, LedgerStore};
use crate::lifecycle::AmountRow;
use crate::user::User;

/// A credit invoice created by the issuer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredit {
    pub user: User,
    pub invoice: Invoice,
}

/// Creates credit invoices from `user_email,amount_payable` rows
pub struct CreditInvoiceIssuer {
    store: Arc<dyn LedgerStore>,
    facility_name: String,
    chargeable_account: String,
}

impl CreditInvoiceIssuer {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        facility_name: impl Into<String>,
        chargeable_account: impl Into<String>,
    ) -> Self {
        Self {
            store,
            facility_name: facility_name.into(),
            chargeable_account: chargeable_account.into(),
        }
    }

    /// Reference text printed on a credit invoice
    pub fn reference_text(&self, invoice: &Invoice, user: &User) -> String {
        format!(
            "{} credit; invoice {}; {}",
            self.facility_name,
            invoice.document_number(),
            user.display_name()
        )
    }

    /// Creates one unsent credit invoice per row, dated `now`
    ///
    /// Every row is checked before anything is written.
    ///
    /// # Errors
    ///
    /// - `BillingError::NotFound` if a row names an unknown email
    /// - `BillingError::Validation` for non-positive amounts, repeated rows,
    ///   or an unsent credit invoice with the same email and amount
    pub async fn issue(&self, rows: &[AmountRow], now: DateTime<Utc>) -> Result<Vec<IssuedCredit>, BillingError> {
        let mut unit = self.store.begin().await?;

        let mut users = Vec::with_capacity(rows.len());
        let mut seen = HashSet::new();
        for row in rows {
            let email = row.user_email.trim();
            let amount = row.amount();
            if !amount.is_positive() {
                return Err(BillingError::validation(format!(
                    "credit amount for {} must be positive, got {}",
                    email, amount
                )));
            }
            if !seen.insert((email.to_string(), amount)) {
                return Err(BillingError::validation(format!(
                    "credit of {} for {} is listed twice",
                    amount, email
                )));
            }

            let user = match unit.user_by_email(email).await? {
                Some(user) => user,
                None => {
                    let known: Vec<String> = unit.all_users().await?.into_iter().map(|u| u.email).collect();
                    return Err(BillingError::not_found(format!(
                        "user {} (known users: {})",
                        email,
                        known.join(", ")
                    )));
                }
            };

            let query = InvoiceQuery::by_email_and_amount(email, amount)
                .of_type(InvoiceType::Credit)
                .with_sent(false);
            if let Some(existing) = unit.find_invoices(&query).await?.first() {
                return Err(BillingError::validation(format!(
                    "unsent credit invoice {} of {} for {} already exists",
                    existing.document_number(),
                    amount,
                    email
                )));
            }
            users.push((user, amount));
        }

        let period = BillingPeriod::single(BillingMonth::from_date(now.date_naive())?);
        let mut issued = Vec::with_capacity(users.len());
        for (user, amount) in users {
            let mut invoice = unit
                .insert_invoice(NewInvoice {
                    user_id: user.id,
                    invoice_type: InvoiceType::Credit,
                    period,
                    timestamp: now,
                    chargeable_account: self.chargeable_account.clone(),
                    amount_payable: amount,
                })
                .await?;
            let reference = self.reference_text(&invoice, &user);
            unit.set_reference_text(invoice.id, &reference).await?;
            invoice.reference_text = Some(reference);

            info!(
                invoice = %invoice.document_number(),
                email = %user.email,
                amount = %amount,
                "Created credit invoice"
            );
            issued.push(IssuedCredit { user, invoice });
        }

        unit.commit().await?;
        Ok(issued)
    }
}
