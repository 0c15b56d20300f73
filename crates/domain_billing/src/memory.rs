//! In-memory ledger adapter
//!
//! Each unit of work operates on a staged copy of the ledger state. Commit
//! swaps the staged copy in; dropping the unit discards it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use core_kernel::{
    BillingPeriod, ConsumableChargeId, CreditDebitId, DomainPort, InvoiceId, Money, PortError,
    ProjectId, StaffChargeId, UserId,
};

use crate::charge::{ConsumableCharge, ConsumableKey, NewConsumableCharge, NewStaffCharge, StaffCharge};
use crate::credit::{CreditDebit, NewCreditDebit};
use crate::invoice::{Invoice, InvoiceType, NewInvoice};
use crate::ledger::{InvoiceQuery, LedgerStore, LedgerUnit};
use crate::project::{NewProject, Project, ProjectType};
use crate::user::{NewUserRecord, User};

/// Full contents of an in-memory ledger
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    pub users: BTreeMap<UserId, User>,
    pub projects: BTreeMap<ProjectId, Project>,
    pub invoices: BTreeMap<InvoiceId, Invoice>,
    pub staff_charges: BTreeMap<StaffChargeId, StaffCharge>,
    pub consumable_charges: BTreeMap<ConsumableChargeId, ConsumableCharge>,
    pub credit_debits: BTreeMap<CreditDebitId, CreditDebit>,
    next_id: i64,
}

impl LedgerState {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn invoice_mut(&mut self, id: InvoiceId) -> Result<&mut Invoice, PortError> {
        self.invoices
            .get_mut(&id)
            .ok_or_else(|| PortError::not_found("Invoice", id))
    }

    fn email_of(&self, user_id: UserId) -> &str {
        self.users.get(&user_id).map(|u| u.email.as_str()).unwrap_or_default()
    }
}

/// Ledger store kept entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates the ledger with users
    pub async fn with_users(users: Vec<NewUserRecord>) -> Result<Self, PortError> {
        let ledger = Self::new();
        let mut unit = ledger.begin().await?;
        for user in users {
            unit.insert_user(user).await?;
        }
        unit.commit().await?;
        Ok(ledger)
    }

    /// Copy of the committed state
    pub async fn snapshot(&self) -> LedgerState {
        self.state.read().await.clone()
    }
}

impl DomainPort for InMemoryLedger {}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, PortError> {
        let staged = self.state.read().await.clone();
        Ok(Box::new(InMemoryUnit {
            target: Arc::clone(&self.state),
            staged,
        }))
    }
}

/// Unit of work over a staged copy
pub struct InMemoryUnit {
    target: Arc<RwLock<LedgerState>>,
    staged: LedgerState,
}

#[async_trait]
impl LedgerUnit for InMemoryUnit {
    async fn user_by_id(&mut self, id: UserId) -> Result<Option<User>, PortError> {
        Ok(self.staged.users.get(&id).cloned())
    }

    async fn user_by_email(&mut self, email: &str) -> Result<Option<User>, PortError> {
        Ok(self.staged.users.values().find(|u| u.email == email).cloned())
    }

    async fn users_by_last_name(&mut self, last_name: &str) -> Result<Vec<User>, PortError> {
        Ok(self
            .staged
            .users
            .values()
            .filter(|u| u.last_name == last_name)
            .cloned()
            .collect())
    }

    async fn all_users(&mut self) -> Result<Vec<User>, PortError> {
        Ok(self.staged.users.values().cloned().collect())
    }

    async fn insert_user(&mut self, user: NewUserRecord) -> Result<User, PortError> {
        if self.staged.users.values().any(|u| u.email == user.email) {
            return Err(PortError::conflict(format!("email {} is already registered", user.email)));
        }
        let user = User {
            id: UserId::new(self.staged.allocate()),
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            staff_subsidy: user.staff_subsidy,
            consumable_subsidy: user.consumable_subsidy,
        };
        self.staged.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn project_by_id(&mut self, id: ProjectId) -> Result<Option<Project>, PortError> {
        Ok(self.staged.projects.get(&id).cloned())
    }

    async fn find_project(
        &mut self,
        user_id: UserId,
        title: &str,
        project_type: ProjectType,
    ) -> Result<Option<Project>, PortError> {
        Ok(self
            .staged
            .projects
            .values()
            .find(|p| p.user_id == user_id && p.title == title && p.project_type == project_type)
            .cloned())
    }

    async fn insert_project(&mut self, project: NewProject) -> Result<Project, PortError> {
        if !self.staged.users.contains_key(&project.user_id) {
            return Err(PortError::not_found("User", project.user_id));
        }
        let project = Project {
            id: ProjectId::new(self.staged.allocate()),
            user_id: project.user_id,
            title: project.title,
            project_type: project.project_type,
        };
        self.staged.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn invoice_by_id(&mut self, id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        Ok(self.staged.invoices.get(&id).cloned())
    }

    async fn overlapping_invoices(
        &mut self,
        user_id: UserId,
        invoice_type: InvoiceType,
        period: &BillingPeriod,
    ) -> Result<Vec<Invoice>, PortError> {
        Ok(self
            .staged
            .invoices
            .values()
            .filter(|i| i.user_id == user_id && i.invoice_type == invoice_type && i.period.overlaps(period))
            .cloned()
            .collect())
    }

    async fn find_invoices(&mut self, query: &InvoiceQuery) -> Result<Vec<Invoice>, PortError> {
        let state = &self.staged;
        Ok(state
            .invoices
            .values()
            .filter(|i| query.matches(i, state.email_of(i.user_id)))
            .cloned()
            .collect())
    }

    async fn insert_invoice(&mut self, invoice: NewInvoice) -> Result<Invoice, PortError> {
        if !self.staged.users.contains_key(&invoice.user_id) {
            return Err(PortError::not_found("User", invoice.user_id));
        }
        let invoice = Invoice {
            id: InvoiceId::new(self.staged.allocate()),
            user_id: invoice.user_id,
            invoice_type: invoice.invoice_type,
            period: invoice.period,
            timestamp: invoice.timestamp,
            chargeable_account: invoice.chargeable_account,
            amount_payable: invoice.amount_payable,
            reference_text: None,
            sent: false,
            paid: false,
        };
        self.staged.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn refresh_invoice(
        &mut self,
        id: InvoiceId,
        timestamp: DateTime<Utc>,
        chargeable_account: &str,
    ) -> Result<(), PortError> {
        let invoice = self.staged.invoice_mut(id)?;
        invoice.timestamp = timestamp;
        invoice.chargeable_account = chargeable_account.to_string();
        Ok(())
    }

    async fn set_amount_payable(&mut self, id: InvoiceId, amount: Money) -> Result<(), PortError> {
        self.staged.invoice_mut(id)?.amount_payable = amount;
        Ok(())
    }

    async fn set_reference_text(&mut self, id: InvoiceId, text: &str) -> Result<(), PortError> {
        self.staged.invoice_mut(id)?.reference_text = Some(text.to_string());
        Ok(())
    }

    async fn set_invoice_flags(&mut self, id: InvoiceId, sent: bool, paid: bool) -> Result<(), PortError> {
        let invoice = self.staged.invoice_mut(id)?;
        invoice.sent = sent;
        invoice.paid = paid;
        Ok(())
    }

    async fn staff_charges_for_invoice(&mut self, invoice_id: InvoiceId) -> Result<Vec<StaffCharge>, PortError> {
        Ok(self
            .staged
            .staff_charges
            .values()
            .filter(|c| c.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn staff_charge_for(
        &mut self,
        invoice_id: InvoiceId,
        project_id: ProjectId,
    ) -> Result<Option<StaffCharge>, PortError> {
        Ok(self
            .staged
            .staff_charges
            .values()
            .find(|c| c.invoice_id == invoice_id && c.project_id == project_id)
            .cloned())
    }

    async fn insert_staff_charge(&mut self, charge: NewStaffCharge) -> Result<StaffCharge, PortError> {
        self.staged.invoice_mut(charge.invoice_id)?;
        let charge = StaffCharge {
            id: StaffChargeId::new(self.staged.allocate()),
            invoice_id: charge.invoice_id,
            project_id: charge.project_id,
            hours: charge.hours,
            hourly_rate: charge.hourly_rate,
            subsidy: charge.subsidy,
        };
        self.staged.staff_charges.insert(charge.id, charge.clone());
        Ok(charge)
    }

    async fn update_staff_charge(&mut self, charge: &StaffCharge) -> Result<(), PortError> {
        let stored = self
            .staged
            .staff_charges
            .get_mut(&charge.id)
            .ok_or_else(|| PortError::not_found("StaffCharge", charge.id))?;
        stored.hours = charge.hours;
        stored.hourly_rate = charge.hourly_rate;
        stored.subsidy = charge.subsidy;
        Ok(())
    }

    async fn delete_staff_charge(&mut self, id: StaffChargeId) -> Result<(), PortError> {
        self.staged
            .staff_charges
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PortError::not_found("StaffCharge", id))
    }

    async fn consumable_charges_for_invoice(
        &mut self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<ConsumableCharge>, PortError> {
        Ok(self
            .staged
            .consumable_charges
            .values()
            .filter(|c| c.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn find_consumable_charge(
        &mut self,
        key: &ConsumableKey,
    ) -> Result<Option<ConsumableCharge>, PortError> {
        Ok(self
            .staged
            .consumable_charges
            .values()
            .find(|c| &c.key() == key)
            .cloned())
    }

    async fn insert_consumable_charge(
        &mut self,
        charge: NewConsumableCharge,
    ) -> Result<ConsumableCharge, PortError> {
        self.staged.invoice_mut(charge.key.invoice_id)?;
        let key = charge.key;
        let charge = ConsumableCharge {
            id: ConsumableChargeId::new(self.staged.allocate()),
            invoice_id: key.invoice_id,
            project_id: key.project_id,
            name: key.name,
            unit_cost: key.unit_cost,
            quantity: key.quantity,
            subsidy: charge.subsidy,
            month: key.month,
            reference: key.reference,
        };
        self.staged.consumable_charges.insert(charge.id, charge.clone());
        Ok(charge)
    }

    async fn credit_debits_for_user(&mut self, user_id: UserId) -> Result<Vec<CreditDebit>, PortError> {
        Ok(self
            .staged
            .credit_debits
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn credit_debits_for(
        &mut self,
        invoice_id: InvoiceId,
        user_id: UserId,
    ) -> Result<Vec<CreditDebit>, PortError> {
        Ok(self
            .staged
            .credit_debits
            .values()
            .filter(|d| d.debit_invoice_id == invoice_id && d.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_credit_debits(&mut self, invoice_id: InvoiceId, user_id: UserId) -> Result<u64, PortError> {
        let before = self.staged.credit_debits.len();
        self.staged
            .credit_debits
            .retain(|_, d| !(d.debit_invoice_id == invoice_id && d.user_id == user_id));
        Ok((before - self.staged.credit_debits.len()) as u64)
    }

    async fn insert_credit_debit(&mut self, debit: NewCreditDebit) -> Result<CreditDebit, PortError> {
        self.staged.invoice_mut(debit.debit_invoice_id)?;
        let debit = CreditDebit {
            id: CreditDebitId::new(self.staged.allocate()),
            user_id: debit.user_id,
            debit_invoice_id: debit.debit_invoice_id,
            amount: debit.amount,
        };
        self.staged.credit_debits.insert(debit.id, debit.clone());
        Ok(debit)
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let InMemoryUnit { target, staged } = *self;
        *target.write().await = staged;
        Ok(())
    }
}
