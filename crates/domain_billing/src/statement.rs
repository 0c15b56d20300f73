//! Invoice documents
//!
//! Builds the flat rendering context for debit and credit invoices and hands
//! it to a [`DocumentRenderer`]. All amounts are formatted with exactly two
//! decimals.

use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use core_kernel::Money;

use crate::charge::ConsumableCharge;
use crate::confirm::{Confirmation, Question};
use crate::credit_invoice::IssuedCredit;
use crate::error::BillingError;
use crate::project::ProjectType;
use crate::reconciliation::{ReconciledInvoice, StaffLine};

pub const INVOICE_TEMPLATE: &str = "invoice";
pub const CREDIT_INVOICE_TEMPLATE: &str = "credit_invoice";

/// A document ready to be rendered
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Template locator understood by the renderer
    pub template: String,
    /// Output file name without extension
    pub file_stem: String,
    pub context: serde_json::Value,
}

/// Persists documents
pub trait DocumentRenderer: Send + Sync {
    /// True if a document with this stem was already produced
    fn exists(&self, file_stem: &str) -> bool;

    /// Writes the document and returns where it went
    fn render(&self, document: &Document) -> Result<PathBuf, BillingError>;
}

/// Renders a document, asking before an existing one is overwritten
///
/// Returns `None` when the operator keeps the existing document.
pub fn publish(
    renderer: &dyn DocumentRenderer,
    confirm: &dyn Confirmation,
    document: &Document,
) -> Result<Option<PathBuf>, BillingError> {
    if renderer.exists(&document.file_stem) {
        let question = Question::new(format!("{} already exists. Overwrite?", document.file_stem));
        if !confirm.confirm(&question) {
            info!(document = %document.file_stem, "Keeping existing document");
            return Ok(None);
        }
    }
    let path = renderer.render(document)?;
    info!(path = %path.display(), "Rendered document");
    Ok(Some(path))
}

#[derive(Debug, Serialize)]
struct ProjectLine {
    project_title: String,
    staff_hours: String,
    staff_hourly_rate_eur: String,
    staff_cost: String,
    subsidy: String,
    subtotal: String,
}

#[derive(Debug, Serialize)]
struct ConsumableLine {
    name: String,
    quantity: String,
    unit_cost: String,
    cost: String,
    subsidy: String,
    subtotal: String,
}

#[derive(Debug, Serialize)]
struct UserBalance {
    starting_available_credit: String,
    applied_available_credit: String,
    closing_available_credit: String,
}

#[derive(Debug, Serialize)]
struct InvoiceContext {
    invoice_id: String,
    invoice_date: String,
    invoice_period: String,
    chargeable_account: String,
    user_name: String,
    user_email: String,
    wetlab_projects: Vec<ProjectLine>,
    bioinf_projects: Vec<ProjectLine>,
    training_projects: Vec<ProjectLine>,
    consumables: Vec<ConsumableLine>,
    total_consumables_cost: String,
    total_consumables_subsidy: String,
    total_consumables_amount_payable: String,
    total_staff_hours: String,
    total_staff_cost: String,
    total_subsidy_amount: String,
    amount_payable_staff: String,
    balance: String,
    amount_payable: String,
    user_balance: UserBalance,
}

#[derive(Debug, Serialize)]
struct CreditContext {
    invoice_date: String,
    user_name: String,
    user_email: String,
    invoice_id: String,
    chargeable_account: String,
    amount: String,
    reference_text: String,
}

fn two_dp(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

fn money(value: Money) -> String {
    value.to_two_dp()
}

fn project_lines(staff: &[StaffLine], project_type: ProjectType) -> Vec<ProjectLine> {
    let mut lines: Vec<&StaffLine> = staff
        .iter()
        .filter(|l| l.project.project_type == project_type)
        .collect();
    lines.sort_by(|a, b| b.charge.hours.cmp(&a.charge.hours));
    lines
        .into_iter()
        .map(|l| ProjectLine {
            project_title: l.project.title.clone(),
            staff_hours: two_dp(l.charge.hours),
            staff_hourly_rate_eur: money(l.charge.hourly_rate),
            staff_cost: money(l.charge.cost()),
            subsidy: money(l.charge.subsidy_amount()),
            subtotal: money(l.charge.subtotal()),
        })
        .collect()
}

fn consumable_lines(consumables: &[ConsumableCharge]) -> Vec<ConsumableLine> {
    let mut sorted: Vec<&ConsumableCharge> = consumables.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
        .into_iter()
        .map(|c| ConsumableLine {
            name: c.name.clone(),
            quantity: two_dp(c.quantity),
            unit_cost: money(c.unit_cost),
            cost: money(c.cost()),
            subsidy: money(c.subsidy_amount()),
            subtotal: money(c.subtotal()),
        })
        .collect()
}

/// Builds the document for a reconciled debit invoice
pub fn invoice_document(reconciled: &ReconciledInvoice) -> Result<Document, BillingError> {
    let invoice = &reconciled.invoice;
    let user = &reconciled.user;
    let totals = &reconciled.totals;
    let credit = &reconciled.credit;

    let context = InvoiceContext {
        invoice_id: invoice.document_number(),
        invoice_date: invoice.timestamp.format("%Y%m%d").to_string(),
        invoice_period: format!("{} inc.", invoice.period),
        chargeable_account: invoice.chargeable_account.clone(),
        user_name: user.display_name(),
        user_email: user.email.clone(),
        wetlab_projects: project_lines(&reconciled.staff, ProjectType::Wetlab),
        bioinf_projects: project_lines(&reconciled.staff, ProjectType::Bioinf),
        training_projects: project_lines(&reconciled.staff, ProjectType::Training),
        consumables: consumable_lines(&reconciled.consumables),
        total_consumables_cost: money(totals.total_consumable_cost),
        total_consumables_subsidy: money(totals.total_consumable_subsidy),
        total_consumables_amount_payable: money(totals.consumable_payable),
        total_staff_hours: two_dp(totals.total_staff_hours),
        total_staff_cost: money(totals.total_staff_cost),
        total_subsidy_amount: money(totals.total_staff_subsidy),
        amount_payable_staff: money(totals.staff_payable),
        balance: money(credit.balance_before),
        amount_payable: money(invoice.amount_payable),
        user_balance: UserBalance {
            starting_available_credit: money(credit.starting_credit),
            applied_available_credit: money(credit.applied),
            closing_available_credit: money(credit.closing_credit),
        },
    };

    Ok(Document {
        template: INVOICE_TEMPLATE.to_string(),
        file_stem: format!(
            "{}_{}_{}_Invoice",
            invoice.period.first(),
            invoice.period.last(),
            user.file_last_name()
        ),
        context: serde_json::to_value(context).map_err(|e| BillingError::Render(e.to_string()))?,
    })
}

/// Builds the document for an issued credit invoice
pub fn credit_document(issued: &IssuedCredit) -> Result<Document, BillingError> {
    let invoice = &issued.invoice;
    let user = &issued.user;
    let date = invoice.timestamp.format("%Y%m%d").to_string();

    let context = CreditContext {
        invoice_date: date.clone(),
        user_name: user.display_name(),
        user_email: user.email.clone(),
        invoice_id: invoice.document_number(),
        chargeable_account: invoice.chargeable_account.clone(),
        amount: money(invoice.amount_payable),
        reference_text: invoice.reference_text.clone().unwrap_or_default(),
    };

    Ok(Document {
        template: CREDIT_INVOICE_TEMPLATE.to_string(),
        file_stem: format!(
            "{}_{}_Credit_Invoice_{}",
            date,
            user.file_last_name(),
            invoice.document_number()
        ),
        context: serde_json::to_value(context).map_err(|e| BillingError::Render(e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_kernel::{
        BillingMonth, BillingPeriod, InvoiceId, ProjectId, StaffChargeId, SubsidyPercent, UserId,
    };
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    use crate::charge::{InvoiceTotals, StaffCharge};
    use crate::confirm::ScriptedConfirmation;
    use crate::credit::{apply_credit, CreditPosition};
    use crate::invoice::{Invoice, InvoiceType};
    use crate::project::Project;
    use crate::user::User;

    fn user() -> User {
        User {
            id: UserId::new(1),
            email: "ada@example.org".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Van der Berg".to_string(),
            staff_subsidy: SubsidyPercent::new(dec!(25)).unwrap(),
            consumable_subsidy: SubsidyPercent::none(),
        }
    }

    fn line(id: i64, title: &str, project_type: ProjectType, hours: Decimal) -> StaffLine {
        StaffLine {
            project: Project {
                id: ProjectId::new(id),
                user_id: UserId::new(1),
                title: title.to_string(),
                project_type,
            },
            charge: StaffCharge {
                id: StaffChargeId::new(id),
                invoice_id: InvoiceId::new(7),
                project_id: ProjectId::new(id),
                hours,
                hourly_rate: Money::new(dec!(20)),
                subsidy: SubsidyPercent::new(dec!(25)).unwrap(),
            },
        }
    }

    fn reconciled() -> ReconciledInvoice {
        let staff = vec![
            line(1, "Atlas", ProjectType::Wetlab, dec!(2)),
            line(2, "Screen", ProjectType::Wetlab, dec!(8)),
        ];
        let charges: Vec<StaffCharge> = staff.iter().map(|l| l.charge.clone()).collect();
        let totals = InvoiceTotals::from_charges(&charges, &[]);
        let credit = apply_credit(&CreditPosition::default(), totals.balance);
        let first = BillingMonth::new(2022, 1).unwrap();
        let last = BillingMonth::new(2022, 3).unwrap();

        ReconciledInvoice {
            user: user(),
            invoice: Invoice {
                id: InvoiceId::new(7),
                user_id: UserId::new(1),
                invoice_type: InvoiceType::Debit,
                period: BillingPeriod::new(first, last).unwrap(),
                timestamp: Utc.with_ymd_and_hms(2022, 4, 2, 9, 0, 0).unwrap(),
                chargeable_account: "1414".to_string(),
                amount_payable: credit.amount_payable,
                reference_text: None,
                sent: false,
                paid: false,
            },
            staff,
            consumables: Vec::new(),
            totals,
            credit,
            changes: Vec::new(),
        }
    }

    #[test]
    fn test_invoice_document_context() {
        let doc = invoice_document(&reconciled()).unwrap();
        assert_eq!(doc.file_stem, "202201_202203_Van_der_Berg_Invoice");
        assert_eq!(doc.context["invoice_date"], "20220402");
        assert_eq!(doc.context["invoice_period"], "202201-202203 inc.");
        assert_eq!(doc.context["user_name"], "Van der Berg, Ada");
        assert_eq!(doc.context["total_staff_hours"], "10.00");
        assert_eq!(doc.context["total_staff_cost"], "200.00");
        assert_eq!(doc.context["amount_payable_staff"], "150.00");
        assert_eq!(doc.context["wetlab_projects"][0]["project_title"], "Screen");
        assert_eq!(doc.context["bioinf_projects"].as_array().unwrap().len(), 0);
        assert_eq!(doc.context["user_balance"]["applied_available_credit"], "0.00");
    }

    struct FakeRenderer {
        existing: bool,
        rendered: Mutex<Vec<String>>,
    }

    impl DocumentRenderer for FakeRenderer {
        fn exists(&self, _file_stem: &str) -> bool {
            self.existing
        }

        fn render(&self, document: &Document) -> Result<PathBuf, BillingError> {
            self.rendered.lock().unwrap().push(document.file_stem.clone());
            Ok(PathBuf::from(&document.file_stem))
        }
    }

    #[test]
    fn test_publish_keeps_existing_when_declined() {
        let renderer = FakeRenderer {
            existing: true,
            rendered: Mutex::new(Vec::new()),
        };
        let doc = invoice_document(&reconciled()).unwrap();

        let kept = publish(&renderer, &ScriptedConfirmation::new([false]), &doc).unwrap();
        assert!(kept.is_none());
        assert!(renderer.rendered.lock().unwrap().is_empty());

        let written = publish(&renderer, &ScriptedConfirmation::new([true]), &doc).unwrap();
        assert!(written.is_some());
    }
}
