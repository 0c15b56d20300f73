//! Operator commands
//!
//! Each command drives one domain service and hands resulting documents to
//! the renderer. Commands do not parse arguments or read files; the binary
//! does that and passes plain values in.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use domain_billing::{
    credit_document, invoice_document, publish, AmountRow, BillingError, Confirmation,
    CreditInvoiceIssuer, DocumentRenderer, InvoiceOutcome, LedgerStore, LifecycleGuard, NewUser,
    NewUserSource, Question, ReconciliationEngine, RunParameters, RunReport, StatusChange,
    StatusTransition, UsageInput, User,
};

/// Result of `create-invoices`
#[derive(Debug)]
pub struct InvoiceRun {
    pub report: RunReport,
    /// Documents written, in user order
    pub documents: Vec<PathBuf>,
}

impl InvoiceRun {
    pub fn has_failures(&self) -> bool {
        self.report.has_failures()
    }
}

/// Services shared by every command
#[derive(Clone)]
pub struct Invoicing {
    store: Arc<dyn LedgerStore>,
    confirm: Arc<dyn Confirmation>,
    renderer: Arc<dyn DocumentRenderer>,
}

impl Invoicing {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        confirm: Arc<dyn Confirmation>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        Self {
            store,
            confirm,
            renderer,
        }
    }

    /// Reconciles usage and writes a document for every reconciled invoice
    ///
    /// # Errors
    ///
    /// Returns an error if the input is rejected before any user is
    /// reconciled, or a document cannot be written. Per-user failures are
    /// in the returned report.
    pub async fn create_invoices(
        &self,
        usage: &UsageInput,
        params: RunParameters,
        new_users: Arc<dyn NewUserSource>,
    ) -> Result<InvoiceRun, BillingError> {
        let engine = ReconciliationEngine::new(self.store.clone(), self.confirm.clone(), new_users, params);
        let report = engine.run(usage).await?;

        let mut documents = Vec::new();
        for outcome in &report.outcomes {
            match outcome {
                InvoiceOutcome::Reconciled(reconciled) => {
                    let document = invoice_document(reconciled)?;
                    if let Some(path) = publish(self.renderer.as_ref(), self.confirm.as_ref(), &document)? {
                        documents.push(path);
                    }
                }
                InvoiceOutcome::SkippedSent { user, invoice } => {
                    warn!(
                        user = %user.email,
                        invoice = %invoice.document_number(),
                        "Invoice already sent; not regenerated"
                    );
                }
                InvoiceOutcome::SkippedEmpty { last_name } => {
                    warn!(user = %last_name, "Nothing to invoice");
                }
            }
        }
        for failure in &report.failures {
            error!(user = %failure.last_name, error = %failure.error, "Invoice not created");
        }

        Ok(InvoiceRun { report, documents })
    }

    /// Issues credit invoices and writes their documents
    pub async fn create_credit_invoices(
        &self,
        rows: &[AmountRow],
        facility_name: &str,
        chargeable_account: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<PathBuf>, BillingError> {
        let issuer = CreditInvoiceIssuer::new(self.store.clone(), facility_name, chargeable_account);
        let issued = issuer.issue(rows, now).await?;

        let mut documents = Vec::with_capacity(issued.len());
        for credit in &issued {
            let document = credit_document(credit)?;
            if let Some(path) = publish(self.renderer.as_ref(), self.confirm.as_ref(), &document)? {
                documents.push(path);
            }
        }
        info!(issued = issued.len(), "Credit invoices issued");
        Ok(documents)
    }

    /// Marks every listed invoice sent or paid
    pub async fn set_status(
        &self,
        transition: StatusTransition,
        rows: &[AmountRow],
    ) -> Result<Vec<StatusChange>, BillingError> {
        let changes = LifecycleGuard::new(self.store.clone()).apply(transition, rows).await?;
        for change in &changes {
            info!(
                invoice_id = %change.invoice_id,
                user = %change.user_email,
                amount = %change.amount_payable,
                to = %change.to,
                "Invoice status changed"
            );
        }
        Ok(changes)
    }

    /// Validates and stores a new user after operator confirmation
    ///
    /// # Errors
    ///
    /// - `BillingError::Validation` for invalid details
    /// - `BillingError::Declined` if the operator says no
    /// - `BillingError::Port` with a conflict if the email is taken
    pub async fn add_user(&self, user: NewUser) -> Result<User, BillingError> {
        let record = user.into_record()?;
        let question = Question::new(format!("{}\nCreate this user?", record.summary()));
        if !self.confirm.confirm(&question) {
            return Err(BillingError::declined(format!("new user {}", record.email)));
        }

        let mut unit = self.store.begin().await?;
        let user = unit.insert_user(record).await?;
        unit.commit().await?;
        info!(user_id = %user.id, email = %user.email, "User created");
        Ok(user)
    }
}
