//! Ledger Ports
//!
//! The billing services talk to persistent storage only through these
//! traits. A [`LedgerStore`] hands out [`LedgerUnit`]s; every read and write
//! of one reconciliation happens inside a single unit, which becomes durable
//! on [`LedgerUnit::commit`]. Dropping a unit without committing discards
//! everything written through it.
//!
//! # Adapters
//!
//! - **SQLite**: `infra_db::SqliteLedger`, one database transaction per unit
//! - **In-memory**: [`crate::memory::InMemoryLedger`], a staged copy swapped
//!   in on commit
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut unit = store.begin().await?;
//! let user = unit.user_by_email("ada@example.org").await?;
//! unit.commit().await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{
    BillingPeriod, DomainPort, InvoiceId, Money, PortError, ProjectId, StaffChargeId, UserId,
};

use crate::charge::{ConsumableCharge, ConsumableKey, NewConsumableCharge, NewStaffCharge, StaffCharge};
use crate::credit::{CreditDebit, NewCreditDebit};
use crate::invoice::{Invoice, InvoiceType, NewInvoice};
use crate::project::{NewProject, Project, ProjectType};
use crate::user::{NewUserRecord, User};

/// Query parameters for finding invoices
///
/// Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceQuery {
    /// Filter by owning user
    pub user_id: Option<UserId>,
    /// Filter by the owning user's email
    pub email: Option<String>,
    /// Filter by exact amount payable
    pub amount_payable: Option<Money>,
    /// Filter by invoice type
    pub invoice_type: Option<InvoiceType>,
    /// Filter by sent flag
    pub sent: Option<bool>,
    /// Filter by paid flag
    pub paid: Option<bool>,
}

impl InvoiceQuery {
    /// Creates a query matching a user's email and an exact amount
    pub fn by_email_and_amount(email: impl Into<String>, amount: Money) -> Self {
        Self {
            email: Some(email.into()),
            amount_payable: Some(amount),
            ..Default::default()
        }
    }

    /// Creates a query for a user's paid credit invoices
    pub fn paid_credit_for(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            invoice_type: Some(InvoiceType::Credit),
            sent: Some(true),
            paid: Some(true),
            ..Default::default()
        }
    }

    /// Restricts to the given type
    pub fn of_type(mut self, invoice_type: InvoiceType) -> Self {
        self.invoice_type = Some(invoice_type);
        self
    }

    /// Restricts to the given sent/paid flags
    pub fn with_flags(mut self, sent: bool, paid: bool) -> Self {
        self.sent = Some(sent);
        self.paid = Some(paid);
        self
    }

    /// Restricts the sent flag only
    pub fn with_sent(mut self, sent: bool) -> Self {
        self.sent = Some(sent);
        self
    }

    /// Returns true if the invoice (owned by a user with `email`) matches
    pub fn matches(&self, invoice: &Invoice, email: &str) -> bool {
        self.user_id.map_or(true, |id| invoice.user_id == id)
            && self.email.as_deref().map_or(true, |e| e == email)
            && self.amount_payable.map_or(true, |a| invoice.amount_payable == a)
            && self.invoice_type.map_or(true, |t| invoice.invoice_type == t)
            && self.sent.map_or(true, |s| invoice.sent == s)
            && self.paid.map_or(true, |p| invoice.paid == p)
    }
}

/// Factory for units of work over the ledger
#[async_trait]
pub trait LedgerStore: DomainPort {
    /// Opens a new unit of work
    ///
    /// # Errors
    ///
    /// Returns `PortError::Connection` if the store cannot be reached
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, PortError>;
}

/// One unit of work over the ledger
///
/// All lookups are exact and parameterised. Writes become visible to other
/// units only after [`commit`](LedgerUnit::commit).
#[async_trait]
pub trait LedgerUnit: Send {
    // ========================================================================
    // Users
    // ========================================================================

    async fn user_by_id(&mut self, id: UserId) -> Result<Option<User>, PortError>;

    async fn user_by_email(&mut self, email: &str) -> Result<Option<User>, PortError>;

    /// All users with exactly this last name
    async fn users_by_last_name(&mut self, last_name: &str) -> Result<Vec<User>, PortError>;

    async fn all_users(&mut self) -> Result<Vec<User>, PortError>;

    /// Inserts a user
    ///
    /// # Errors
    ///
    /// Returns `PortError::Conflict` if the email is already taken
    async fn insert_user(&mut self, user: NewUserRecord) -> Result<User, PortError>;

    // ========================================================================
    // Projects
    // ========================================================================

    async fn project_by_id(&mut self, id: ProjectId) -> Result<Option<Project>, PortError>;

    /// The project identified by (title, type, user)
    async fn find_project(
        &mut self,
        user_id: UserId,
        title: &str,
        project_type: ProjectType,
    ) -> Result<Option<Project>, PortError>;

    async fn insert_project(&mut self, project: NewProject) -> Result<Project, PortError>;

    // ========================================================================
    // Invoices
    // ========================================================================

    async fn invoice_by_id(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError>;

    /// A user's invoices of one type whose period overlaps `period`
    async fn overlapping_invoices(
        &mut self,
        user_id: UserId,
        invoice_type: InvoiceType,
        period: &BillingPeriod,
    ) -> Result<Vec<Invoice>, PortError>;

    /// Invoices matching every set field of the query, ordered by id
    async fn find_invoices(&mut self, query: &InvoiceQuery) -> Result<Vec<Invoice>, PortError>;

    async fn insert_invoice(&mut self, invoice: NewInvoice) -> Result<Invoice, PortError>;

    /// Re-stamps a reused invoice and refreshes its chargeable account
    async fn refresh_invoice(
        &mut self,
        id: InvoiceId,
        timestamp: DateTime<Utc>,
        chargeable_account: &str,
    ) -> Result<(), PortError>;

    async fn set_amount_payable(&mut self, id: InvoiceId, amount: Money) -> Result<(), PortError>;

    async fn set_reference_text(&mut self, id: InvoiceId, text: &str) -> Result<(), PortError>;

    async fn set_invoice_flags(&mut self, id: InvoiceId, sent: bool, paid: bool) -> Result<(), PortError>;

    // ========================================================================
    // Staff charges
    // ========================================================================

    async fn staff_charges_for_invoice(&mut self, invoice_id: InvoiceId) -> Result<Vec<StaffCharge>, PortError>;

    /// The staff charge for (invoice, project), if any
    async fn staff_charge_for(
        &mut self,
        invoice_id: InvoiceId,
        project_id: ProjectId,
    ) -> Result<Option<StaffCharge>, PortError>;

    async fn insert_staff_charge(&mut self, charge: NewStaffCharge) -> Result<StaffCharge, PortError>;

    /// Writes hours, rate and subsidy of an existing charge
    async fn update_staff_charge(&mut self, charge: &StaffCharge) -> Result<(), PortError>;

    async fn delete_staff_charge(&mut self, id: StaffChargeId) -> Result<(), PortError>;

    // ========================================================================
    // Consumable charges
    // ========================================================================

    async fn consumable_charges_for_invoice(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<ConsumableCharge>, PortError>;

    /// The consumable charge matching every field of the key, if any
    async fn find_consumable_charge(
        &mut self,
        key: &ConsumableKey,
    ) -> Result<Option<ConsumableCharge>, PortError>;

    async fn insert_consumable_charge(
        &mut self,
        charge: NewConsumableCharge,
    ) -> Result<ConsumableCharge, PortError>;

    // ========================================================================
    // Credit debits
    // ========================================================================

    /// Every debit applied against a user's credit
    async fn credit_debits_for_user(&mut self, user_id: UserId) -> Result<Vec<CreditDebit>, PortError>;

    async fn credit_debits_for(
        &mut self,
        invoice_id: InvoiceId,
        user_id: UserId,
    ) -> Result<Vec<CreditDebit>, PortError>;

    /// Deletes the debits of (invoice, user), returning how many were removed
    async fn delete_credit_debits(&mut self, invoice_id: InvoiceId, user_id: UserId) -> Result<u64, PortError>;

    async fn insert_credit_debit(&mut self, debit: NewCreditDebit) -> Result<CreditDebit, PortError>;

    // ========================================================================
    // Unit lifecycle
    // ========================================================================

    /// Makes every write of this unit durable
    async fn commit(self: Box<Self>) -> Result<(), PortError>;
}
