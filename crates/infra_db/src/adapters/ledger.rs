//! SQLite Ledger Adapter
//!
//! Implements [`LedgerStore`] over a SQLite pool. Each [`LedgerUnit`] owns
//! one database transaction; dropping the unit without committing rolls it
//! back.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool_from_url, run_migrations, SqliteLedger};
//! use std::sync::Arc;
//!
//! let pool = create_pool_from_url("sqlite://invoicing.db").await?;
//! run_migrations(&pool).await?;
//! let store: Arc<dyn LedgerStore> = Arc::new(SqliteLedger::new(pool));
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, instrument};

use core_kernel::{BillingPeriod, DomainPort, InvoiceId, Money, PortError, ProjectId, StaffChargeId, UserId};
use domain_billing::{
    ConsumableCharge, ConsumableKey, CreditDebit, Invoice, InvoiceQuery, InvoiceType, LedgerStore,
    LedgerUnit, NewConsumableCharge, NewCreditDebit, NewInvoice, NewProject, NewStaffCharge,
    NewUserRecord, Project, ProjectType, StaffCharge, User,
};

use crate::error::DatabaseError;
use crate::repositories::ledger as repo;

/// SQLite-backed ledger store
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl DomainPort for SqliteLedger {}

#[async_trait]
impl LedgerStore for SqliteLedger {
    #[instrument(skip(self))]
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, PortError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_to_port_error(DatabaseError::from(e)))?;
        debug!("Opened ledger transaction");
        Ok(Box::new(SqliteLedgerUnit { tx }))
    }
}

/// One transaction over the ledger
pub struct SqliteLedgerUnit {
    tx: Transaction<'static, Sqlite>,
}

/// Converts a database error to a port error
fn db_to_port_error(e: DatabaseError) -> PortError {
    e.into()
}

#[async_trait]
impl LedgerUnit for SqliteLedgerUnit {
    #[instrument(skip(self), fields(user_id = %id))]
    async fn user_by_id(&mut self, id: UserId) -> Result<Option<User>, PortError> {
        repo::user_by_id(&mut self.tx, id).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self))]
    async fn user_by_email(&mut self, email: &str) -> Result<Option<User>, PortError> {
        repo::user_by_email(&mut self.tx, email).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self))]
    async fn users_by_last_name(&mut self, last_name: &str) -> Result<Vec<User>, PortError> {
        repo::users_by_last_name(&mut self.tx, last_name)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self))]
    async fn all_users(&mut self) -> Result<Vec<User>, PortError> {
        repo::all_users(&mut self.tx).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn insert_user(&mut self, user: NewUserRecord) -> Result<User, PortError> {
        let user = repo::insert_user(&mut self.tx, user).await.map_err(db_to_port_error)?;
        debug!(user_id = %user.id, "Inserted user");
        Ok(user)
    }

    #[instrument(skip(self), fields(project_id = %id))]
    async fn project_by_id(&mut self, id: ProjectId) -> Result<Option<Project>, PortError> {
        repo::project_by_id(&mut self.tx, id).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn find_project(
        &mut self,
        user_id: UserId,
        title: &str,
        project_type: ProjectType,
    ) -> Result<Option<Project>, PortError> {
        repo::find_project(&mut self.tx, user_id, title, project_type)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self, project), fields(title = %project.title))]
    async fn insert_project(&mut self, project: NewProject) -> Result<Project, PortError> {
        repo::insert_project(&mut self.tx, project).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn invoice_by_id(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        repo::invoice_by_id(&mut self.tx, id).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(user_id = %user_id, period = %period))]
    async fn overlapping_invoices(
        &mut self,
        user_id: UserId,
        invoice_type: InvoiceType,
        period: &BillingPeriod,
    ) -> Result<Vec<Invoice>, PortError> {
        repo::overlapping_invoices(&mut self.tx, user_id, invoice_type, period)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self))]
    async fn find_invoices(&mut self, query: &InvoiceQuery) -> Result<Vec<Invoice>, PortError> {
        repo::find_invoices(&mut self.tx, query).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self, invoice), fields(user_id = %invoice.user_id, period = %invoice.period))]
    async fn insert_invoice(&mut self, invoice: NewInvoice) -> Result<Invoice, PortError> {
        let invoice = repo::insert_invoice(&mut self.tx, invoice)
            .await
            .map_err(db_to_port_error)?;
        debug!(invoice_id = %invoice.id, "Inserted invoice");
        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn refresh_invoice(
        &mut self,
        id: InvoiceId,
        timestamp: DateTime<Utc>,
        chargeable_account: &str,
    ) -> Result<(), PortError> {
        repo::refresh_invoice(&mut self.tx, id, timestamp, chargeable_account)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(invoice_id = %id, amount = %amount))]
    async fn set_amount_payable(&mut self, id: InvoiceId, amount: Money) -> Result<(), PortError> {
        repo::set_amount_payable(&mut self.tx, id, amount)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn set_reference_text(&mut self, id: InvoiceId, text: &str) -> Result<(), PortError> {
        repo::set_reference_text(&mut self.tx, id, text)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn set_invoice_flags(&mut self, id: InvoiceId, sent: bool, paid: bool) -> Result<(), PortError> {
        repo::set_invoice_flags(&mut self.tx, id, sent, paid)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn staff_charges_for_invoice(&mut self, invoice_id: InvoiceId) -> Result<Vec<StaffCharge>, PortError> {
        repo::staff_charges_for_invoice(&mut self.tx, invoice_id)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id, project_id = %project_id))]
    async fn staff_charge_for(
        &mut self,
        invoice_id: InvoiceId,
        project_id: ProjectId,
    ) -> Result<Option<StaffCharge>, PortError> {
        repo::staff_charge_for(&mut self.tx, invoice_id, project_id)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self, charge), fields(invoice_id = %charge.invoice_id))]
    async fn insert_staff_charge(&mut self, charge: NewStaffCharge) -> Result<StaffCharge, PortError> {
        repo::insert_staff_charge(&mut self.tx, charge)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self, charge), fields(charge_id = %charge.id))]
    async fn update_staff_charge(&mut self, charge: &StaffCharge) -> Result<(), PortError> {
        repo::update_staff_charge(&mut self.tx, charge)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(charge_id = %id))]
    async fn delete_staff_charge(&mut self, id: StaffChargeId) -> Result<(), PortError> {
        repo::delete_staff_charge(&mut self.tx, id)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn consumable_charges_for_invoice(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<ConsumableCharge>, PortError> {
        repo::consumable_charges_for_invoice(&mut self.tx, invoice_id)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self, key), fields(invoice_id = %key.invoice_id, name = %key.name))]
    async fn find_consumable_charge(
        &mut self,
        key: &ConsumableKey,
    ) -> Result<Option<ConsumableCharge>, PortError> {
        repo::find_consumable_charge(&mut self.tx, key)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self, charge), fields(invoice_id = %charge.key.invoice_id, name = %charge.key.name))]
    async fn insert_consumable_charge(
        &mut self,
        charge: NewConsumableCharge,
    ) -> Result<ConsumableCharge, PortError> {
        repo::insert_consumable_charge(&mut self.tx, charge)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn credit_debits_for_user(&mut self, user_id: UserId) -> Result<Vec<CreditDebit>, PortError> {
        repo::credit_debits_for_user(&mut self.tx, user_id)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id, user_id = %user_id))]
    async fn credit_debits_for(
        &mut self,
        invoice_id: InvoiceId,
        user_id: UserId,
    ) -> Result<Vec<CreditDebit>, PortError> {
        repo::credit_debits_for(&mut self.tx, invoice_id, user_id)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id, user_id = %user_id))]
    async fn delete_credit_debits(&mut self, invoice_id: InvoiceId, user_id: UserId) -> Result<u64, PortError> {
        repo::delete_credit_debits(&mut self.tx, invoice_id, user_id)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self, debit), fields(invoice_id = %debit.debit_invoice_id, amount = %debit.amount))]
    async fn insert_credit_debit(&mut self, debit: NewCreditDebit) -> Result<CreditDebit, PortError> {
        repo::insert_credit_debit(&mut self.tx, debit)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self))]
    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        self.tx
            .commit()
            .await
            .map_err(|e| db_to_port_error(DatabaseError::TransactionFailed(e.to_string())))?;
        debug!("Committed ledger transaction");
        Ok(())
    }
}
