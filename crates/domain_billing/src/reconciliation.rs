//! Invoice reconciliation engine
//!
//! For every user in the usage input the engine opens one unit of work and:
//!
//! 1. resolves or creates the user (operator-confirmed)
//! 2. resolves or creates the debit invoice for the billing period
//! 3. upserts one staff charge per project and prunes charges not seen
//! 4. inserts consumable charges not already recorded
//! 5. recomputes totals, nets credit, finalises the amount payable
//! 6. commits
//!
//! A failure for one user rolls back that user's unit only; the run goes on
//! with the next user and the failure is reported.

use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use core_kernel::{BillingPeriod, Money, ProjectId, StaffChargeId};

use crate::charge::{
    ChargeChange, ConsumableCharge, ConsumableKey, InvoiceTotals, NewConsumableCharge,
    NewStaffCharge, StaffCharge,
};
use crate::confirm::{Confirmation, Question};
use crate::credit::{resolve_credit, CreditApplication};
use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceType, NewInvoice};
use crate::ledger::{LedgerStore, LedgerUnit};
use crate::lifecycle::LifecycleGuard;
use crate::project::{NewProject, Project};
use crate::usage::{
    check_line_amounts, normalise, similar_names, ConsumableUsage, NormalisedUsage, ProjectHours,
    ProjectIdentity, UsageInput, UserUsage,
};
use crate::user::{NewUserSource, User};

/// Parameters fixed for one billing run
#[derive(Debug, Clone)]
pub struct RunParameters {
    pub period: BillingPeriod,
    pub hourly_rate: Money,
    pub chargeable_account: String,
    /// Owner names containing this (case-insensitive) are facility-internal
    pub facility_name: String,
    /// Restrict the run to these last names
    pub user_filter: Option<Vec<String>>,
}

/// State carried through one user's reconciliation
#[derive(Debug)]
pub struct ReconciliationContext {
    pub user: User,
    pub invoice: Invoice,
    /// Projects resolved so far, by id
    pub projects: BTreeMap<ProjectId, Project>,
    /// Staff charges confirmed by the current input
    pub touched: HashSet<StaffChargeId>,
    pub changes: Vec<ChargeChange>,
    pub totals: InvoiceTotals,
}

impl ReconciliationContext {
    fn new(user: User, invoice: Invoice) -> Self {
        Self {
            user,
            invoice,
            projects: BTreeMap::new(),
            touched: HashSet::new(),
            changes: Vec::new(),
            totals: InvoiceTotals::default(),
        }
    }
}

/// A staff charge with the project it was booked on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffLine {
    pub project: Project,
    pub charge: StaffCharge,
}

/// A debit invoice brought in line with the usage input
#[derive(Debug, Clone)]
pub struct ReconciledInvoice {
    pub user: User,
    pub invoice: Invoice,
    pub staff: Vec<StaffLine>,
    /// Consumable charges, one per exact-match key
    pub consumables: Vec<ConsumableCharge>,
    pub totals: InvoiceTotals,
    pub credit: CreditApplication,
    pub changes: Vec<ChargeChange>,
}

/// What happened to one user's invoice
#[derive(Debug, Clone)]
pub enum InvoiceOutcome {
    Reconciled(Box<ReconciledInvoice>),
    /// The matching invoice was already sent and was left untouched
    SkippedSent { user: User, invoice: Invoice },
    /// Nothing to bill; the unit was rolled back
    SkippedEmpty { last_name: String },
}

/// A user whose reconciliation failed
#[derive(Debug)]
pub struct UserFailure {
    pub last_name: String,
    pub error: BillingError,
}

/// Result of a billing run
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<InvoiceOutcome>,
    pub failures: Vec<UserFailure>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Invoices that were reconciled in this run
    pub fn reconciled(&self) -> impl Iterator<Item = &ReconciledInvoice> {
        self.outcomes.iter().filter_map(|o| match o {
            InvoiceOutcome::Reconciled(r) => Some(r.as_ref()),
            _ => None,
        })
    }
}

enum InvoiceSlot {
    Open(Invoice),
    Frozen(Invoice),
}

/// Reconciles usage input against the ledger
pub struct ReconciliationEngine {
    store: Arc<dyn LedgerStore>,
    confirm: Arc<dyn Confirmation>,
    new_users: Arc<dyn NewUserSource>,
    params: RunParameters,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        confirm: Arc<dyn Confirmation>,
        new_users: Arc<dyn NewUserSource>,
        params: RunParameters,
    ) -> Self {
        Self {
            store,
            confirm,
            new_users,
            params,
        }
    }

    pub fn parameters(&self) -> &RunParameters {
        &self.params
    }

    /// Runs reconciliation for every user in the input
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Validation` if the input is malformed and
    /// `BillingError::Declined` if the operator stops the run at the
    /// similar-names gate. Nothing is written in either case. Failures of
    /// individual users are collected in the report instead.
    pub async fn run(&self, input: &UsageInput) -> Result<RunReport, BillingError> {
        let usage = normalise(
            input,
            self.params.period,
            &self.params.facility_name,
            self.params.user_filter.as_deref(),
        )?;
        check_line_amounts(&usage, self.params.hourly_rate)?;
        self.check_similar_names(&usage)?;

        info!(
            period = %usage.period,
            users = usage.users.len(),
            "Starting invoice reconciliation"
        );

        let mut report = RunReport::default();
        for user_usage in &usage.users {
            match self.reconcile_user(user_usage).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(error) => {
                    warn!(user = %user_usage.last_name, error = %error, "Reconciliation failed");
                    report.failures.push(UserFailure {
                        last_name: user_usage.last_name.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            reconciled = report.reconciled().count(),
            failed = report.failures.len(),
            "Invoice reconciliation finished"
        );
        Ok(report)
    }

    fn check_similar_names(&self, usage: &NormalisedUsage) -> Result<(), BillingError> {
        let users = similar_names(&usage.last_names());
        if !users.is_empty() {
            for (name, matches) in &users {
                warn!(user = %name, similar = ?matches, "Similar user names in input");
            }
            let question = Question::new(format!(
                "Similar user names found: {}. Continue?",
                describe_pairs(&users)
            ));
            if !self.confirm.confirm(&question) {
                return Err(BillingError::declined("similar user names"));
            }
        }

        let projects = similar_names(&usage.project_titles);
        if !projects.is_empty() {
            for (title, matches) in &projects {
                warn!(project = %title, similar = ?matches, "Similar project titles in input");
            }
            let question = Question::always_ask(format!(
                "Similar project titles found: {}. Continue?",
                describe_pairs(&projects)
            ));
            if !self.confirm.confirm(&question) {
                return Err(BillingError::declined("similar project titles"));
            }
        }
        Ok(())
    }

    #[instrument(skip(self, usage), fields(user = %usage.last_name))]
    async fn reconcile_user(&self, usage: &UserUsage) -> Result<InvoiceOutcome, BillingError> {
        let mut unit = self.store.begin().await?;

        let user = self.resolve_user(unit.as_mut(), &usage.last_name).await?;
        let invoice = match self.resolve_invoice(unit.as_mut(), &user).await? {
            InvoiceSlot::Open(invoice) => invoice,
            InvoiceSlot::Frozen(invoice) => {
                warn!(
                    invoice_id = %invoice.id,
                    period = %invoice.period,
                    "Invoice has already been sent; leaving it unchanged"
                );
                unit.commit().await?;
                return Ok(InvoiceOutcome::SkippedSent { user, invoice });
            }
        };

        let mut ctx = ReconciliationContext::new(user, invoice);

        for project in &usage.projects {
            self.upsert_staff_charge(unit.as_mut(), &mut ctx, project).await?;
        }
        prune_staff_charges(unit.as_mut(), &ctx).await?;
        for consumable in &usage.consumables {
            self.ensure_consumable(unit.as_mut(), &mut ctx, consumable).await?;
        }

        let staff = unit.staff_charges_for_invoice(ctx.invoice.id).await?;
        let consumables = unit.consumable_charges_for_invoice(ctx.invoice.id).await?;
        ctx.totals = InvoiceTotals::from_charges(&staff, &consumables);

        if ctx.totals.is_empty() {
            warn!(user = %usage.last_name, "No charges for this period; skipping invoice");
            return Ok(InvoiceOutcome::SkippedEmpty {
                last_name: usage.last_name.clone(),
            });
        }

        let balance = ctx.totals.balance.round_to_cents();
        let credit = resolve_credit(unit.as_mut(), &ctx.user, &ctx.invoice, balance).await?;
        ctx.invoice.amount_payable = credit.amount_payable;
        LifecycleGuard::check_payable(&ctx.invoice)?;
        unit.set_amount_payable(ctx.invoice.id, credit.amount_payable).await?;

        let staff = staff_lines(unit.as_mut(), &ctx.projects, staff).await?;
        unit.commit().await?;

        info!(
            invoice_id = %ctx.invoice.id,
            staff_charges = ctx.totals.staff_charge_count,
            consumables = ctx.totals.consumable_count,
            amount_payable = %credit.amount_payable,
            "Invoice reconciled"
        );

        Ok(InvoiceOutcome::Reconciled(Box::new(ReconciledInvoice {
            user: ctx.user,
            invoice: ctx.invoice,
            staff,
            consumables: dedup_consumables(consumables),
            totals: ctx.totals,
            credit,
            changes: ctx.changes,
        })))
    }

    async fn resolve_user(&self, unit: &mut dyn LedgerUnit, last_name: &str) -> Result<User, BillingError> {
        let mut found = unit.users_by_last_name(last_name).await?;
        match found.len() {
            1 => return Ok(found.remove(0)),
            0 => {}
            _ => {
                let emails: Vec<String> = found.into_iter().map(|u| u.email).collect();
                return Err(BillingError::ambiguous(format!(
                    "several users share the last name {}: {}",
                    last_name,
                    emails.join(", ")
                )));
            }
        }

        let details = self.new_users.details_for(last_name).ok_or_else(|| {
            BillingError::not_found(format!(
                "user {} is not in the ledger and no details were supplied",
                last_name
            ))
        })?;
        let record = details.into_record()?;

        let question = Question::new(format!(
            "User {} is not in the ledger. Create it?\n{}",
            last_name,
            record.summary()
        ));
        if !self.confirm.confirm(&question) {
            return Err(BillingError::declined(format!("creation of user {}", last_name)));
        }

        let user = unit.insert_user(record).await?;
        info!(user_id = %user.id, email = %user.email, "Created user");
        Ok(user)
    }

    async fn resolve_invoice(&self, unit: &mut dyn LedgerUnit, user: &User) -> Result<InvoiceSlot, BillingError> {
        let period = self.params.period;
        let mut existing = unit
            .overlapping_invoices(user.id, InvoiceType::Debit, &period)
            .await?;

        if existing.is_empty() {
            let invoice = unit
                .insert_invoice(NewInvoice::debit(
                    user.id,
                    period,
                    Utc::now(),
                    self.params.chargeable_account.clone(),
                ))
                .await?;
            info!(invoice_id = %invoice.id, period = %period, "Created invoice");
            return Ok(InvoiceSlot::Open(invoice));
        }

        if existing.len() > 1 || existing[0].period != period {
            let periods: Vec<String> = existing.iter().map(|i| i.period.to_string()).collect();
            return Err(BillingError::PeriodOverlap {
                user: user.display_name(),
                requested: period,
                existing: periods.join(", "),
            });
        }

        let mut invoice = existing.remove(0);
        if invoice.is_frozen() {
            return Ok(InvoiceSlot::Frozen(invoice));
        }

        let now = Utc::now();
        unit.refresh_invoice(invoice.id, now, &self.params.chargeable_account)
            .await?;
        invoice.timestamp = now;
        invoice.chargeable_account = self.params.chargeable_account.clone();
        info!(invoice_id = %invoice.id, "Reusing unsent invoice");
        Ok(InvoiceSlot::Open(invoice))
    }

    async fn resolve_project(
        &self,
        unit: &mut dyn LedgerUnit,
        ctx: &mut ReconciliationContext,
        identity: &ProjectIdentity,
    ) -> Result<Project, BillingError> {
        let project = match unit
            .find_project(ctx.user.id, &identity.title, identity.project_type)
            .await?
        {
            Some(project) => project,
            None => {
                let question = Question::new(format!(
                    "Project '{}' ({}) for {} is not in the ledger. Create it?",
                    identity.title,
                    identity.project_type,
                    ctx.user.display_name()
                ));
                if !self.confirm.confirm(&question) {
                    return Err(BillingError::declined(format!(
                        "creation of project '{}'",
                        identity.title
                    )));
                }
                let project = unit
                    .insert_project(NewProject {
                        user_id: ctx.user.id,
                        title: identity.title.clone(),
                        project_type: identity.project_type,
                    })
                    .await?;
                info!(project_id = %project.id, title = %project.title, "Created project");
                project
            }
        };
        ctx.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn upsert_staff_charge(
        &self,
        unit: &mut dyn LedgerUnit,
        ctx: &mut ReconciliationContext,
        usage: &ProjectHours,
    ) -> Result<(), BillingError> {
        let project = self.resolve_project(unit, ctx, &usage.identity).await?;
        let rate = self.params.hourly_rate;
        let subsidy = ctx.user.staff_subsidy;

        match unit.staff_charge_for(ctx.invoice.id, project.id).await? {
            Some(mut charge) => {
                let changes = charge.reconcile_with(usage.hours, rate, subsidy);
                if !changes.is_empty() {
                    for change in &changes {
                        warn!(
                            charge_id = %change.charge_id,
                            field = change.field,
                            old = %change.old,
                            new = %change.new,
                            "Staff charge changed"
                        );
                    }
                    unit.update_staff_charge(&charge).await?;
                    ctx.changes.extend(changes);
                }
                ctx.touched.insert(charge.id);
            }
            None => {
                let charge = unit
                    .insert_staff_charge(NewStaffCharge {
                        invoice_id: ctx.invoice.id,
                        project_id: project.id,
                        hours: usage.hours,
                        hourly_rate: rate,
                        subsidy,
                    })
                    .await?;
                ctx.touched.insert(charge.id);
            }
        }
        Ok(())
    }

    async fn ensure_consumable(
        &self,
        unit: &mut dyn LedgerUnit,
        ctx: &mut ReconciliationContext,
        usage: &ConsumableUsage,
    ) -> Result<(), BillingError> {
        let project = self.resolve_project(unit, ctx, &usage.identity).await?;
        let key = ConsumableKey {
            project_id: project.id,
            invoice_id: ctx.invoice.id,
            name: usage.name.clone(),
            month: usage.month,
            unit_cost: usage.unit_cost,
            quantity: usage.quantity,
            reference: usage.reference.clone(),
        };

        if unit.find_consumable_charge(&key).await?.is_none() {
            unit.insert_consumable_charge(NewConsumableCharge {
                key,
                subsidy: ctx.user.consumable_subsidy,
            })
            .await?;
        }
        Ok(())
    }
}

async fn prune_staff_charges(unit: &mut dyn LedgerUnit, ctx: &ReconciliationContext) -> Result<(), BillingError> {
    for charge in unit.staff_charges_for_invoice(ctx.invoice.id).await? {
        if !ctx.touched.contains(&charge.id) {
            unit.delete_staff_charge(charge.id).await?;
            info!(charge_id = %charge.id, project_id = %charge.project_id, "Deleted stale staff charge");
        }
    }
    Ok(())
}

async fn staff_lines(
    unit: &mut dyn LedgerUnit,
    projects: &BTreeMap<ProjectId, Project>,
    charges: Vec<StaffCharge>,
) -> Result<Vec<StaffLine>, BillingError> {
    let mut lines = Vec::with_capacity(charges.len());
    for charge in charges {
        let project = match projects.get(&charge.project_id) {
            Some(project) => project.clone(),
            None => unit
                .project_by_id(charge.project_id)
                .await?
                .ok_or_else(|| BillingError::not_found(format!("project {}", charge.project_id)))?,
        };
        lines.push(StaffLine { project, charge });
    }
    Ok(lines)
}

fn dedup_consumables(charges: Vec<ConsumableCharge>) -> Vec<ConsumableCharge> {
    let mut seen = HashSet::new();
    charges.into_iter().filter(|c| seen.insert(c.key())).collect()
}

fn describe_pairs(pairs: &[(String, Vec<String>)]) -> String {
    pairs
        .iter()
        .map(|(name, matches)| format!("{} ~ {}", name, matches.join("/")))
        .collect::<Vec<_>>()
        .join("; ")
}
