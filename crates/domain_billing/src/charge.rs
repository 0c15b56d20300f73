//! Billable line items and invoice totals
//!
//! Both kinds of charge use the same subsidy rule:
//! `subtotal = cost - cost * subsidy_percent / 100`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use core_kernel::{
    BillingMonth, ConsumableChargeId, InvoiceId, Money, ProjectId, StaffChargeId, SubsidyPercent,
};

/// Staff time booked against one project on one invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffCharge {
    pub id: StaffChargeId,
    pub invoice_id: InvoiceId,
    pub project_id: ProjectId,
    pub hours: Decimal,
    pub hourly_rate: Money,
    pub subsidy: SubsidyPercent,
}

impl StaffCharge {
    /// Gross cost: hours × hourly rate
    pub fn cost(&self) -> Money {
        self.hourly_rate.multiply(self.hours)
    }

    pub fn subsidy_amount(&self) -> Money {
        self.subsidy.subsidy_on(self.cost())
    }

    pub fn subtotal(&self) -> Money {
        self.subsidy.subtotal_of(self.cost())
    }
}

/// A staff charge to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStaffCharge {
    pub invoice_id: InvoiceId,
    pub project_id: ProjectId,
    pub hours: Decimal,
    pub hourly_rate: Money,
    pub subsidy: SubsidyPercent,
}

/// A field of a staff charge that reconciliation changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeChange {
    pub charge_id: StaffChargeId,
    pub field: &'static str,
    pub old: String,
    pub new: String,
}

impl StaffCharge {
    /// Brings the charge in line with fresh values, reporting each field
    /// that differed
    pub fn reconcile_with(
        &mut self,
        hours: Decimal,
        hourly_rate: Money,
        subsidy: SubsidyPercent,
    ) -> Vec<ChargeChange> {
        let mut changes = Vec::new();
        if self.hours != hours {
            changes.push(ChargeChange {
                charge_id: self.id,
                field: "staff_hours",
                old: self.hours.to_string(),
                new: hours.to_string(),
            });
            self.hours = hours;
        }
        if self.hourly_rate != hourly_rate {
            changes.push(ChargeChange {
                charge_id: self.id,
                field: "staff_hourly_rate_eur",
                old: self.hourly_rate.to_two_dp(),
                new: hourly_rate.to_two_dp(),
            });
            self.hourly_rate = hourly_rate;
        }
        if self.subsidy != subsidy {
            changes.push(ChargeChange {
                charge_id: self.id,
                field: "subsidy_percent",
                old: self.subsidy.to_string(),
                new: subsidy.to_string(),
            });
            self.subsidy = subsidy;
        }
        changes
    }
}

/// A consumable purchased for one project and billed on one invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumableCharge {
    pub id: ConsumableChargeId,
    pub invoice_id: InvoiceId,
    pub project_id: ProjectId,
    pub name: String,
    pub unit_cost: Money,
    pub quantity: Decimal,
    pub subsidy: SubsidyPercent,
    pub month: BillingMonth,
    /// Reference from the usage source, part of the dedup key
    pub reference: String,
}

impl ConsumableCharge {
    /// Gross cost: unit cost × quantity
    pub fn cost(&self) -> Money {
        self.unit_cost.multiply(self.quantity)
    }

    pub fn subsidy_amount(&self) -> Money {
        self.subsidy.subsidy_on(self.cost())
    }

    pub fn subtotal(&self) -> Money {
        self.subsidy.subtotal_of(self.cost())
    }

    pub fn key(&self) -> ConsumableKey {
        ConsumableKey {
            project_id: self.project_id,
            invoice_id: self.invoice_id,
            name: self.name.clone(),
            month: self.month,
            unit_cost: self.unit_cost,
            quantity: self.quantity,
            reference: self.reference.clone(),
        }
    }
}

/// Exact-match identity of a consumable charge
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumableKey {
    pub project_id: ProjectId,
    pub invoice_id: InvoiceId,
    pub name: String,
    pub month: BillingMonth,
    pub unit_cost: Money,
    pub quantity: Decimal,
    pub reference: String,
}

/// A consumable charge to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConsumableCharge {
    pub key: ConsumableKey,
    pub subsidy: SubsidyPercent,
}

/// Aggregates over an invoice's current charges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvoiceTotals {
    pub staff_charge_count: usize,
    pub total_staff_hours: Decimal,
    pub total_staff_cost: Money,
    pub total_staff_subsidy: Money,
    pub staff_payable: Money,
    pub consumable_count: usize,
    pub total_consumable_cost: Money,
    pub total_consumable_subsidy: Money,
    pub consumable_payable: Money,
    /// Sum of all subtotals, before credit
    pub balance: Money,
}

impl InvoiceTotals {
    /// Computes totals from loaded charges
    ///
    /// Consumables sharing the same exact-match key are counted once.
    pub fn from_charges(staff: &[StaffCharge], consumables: &[ConsumableCharge]) -> Self {
        let mut totals = InvoiceTotals::default();

        for charge in staff {
            totals.staff_charge_count += 1;
            totals.total_staff_hours += charge.hours;
            totals.total_staff_cost += charge.cost();
            totals.total_staff_subsidy += charge.subsidy_amount();
            totals.staff_payable += charge.subtotal();
        }

        let mut seen = HashSet::new();
        for charge in consumables.iter().filter(|c| seen.insert(c.key())) {
            totals.consumable_count += 1;
            totals.total_consumable_cost += charge.cost();
            totals.total_consumable_subsidy += charge.subsidy_amount();
            totals.consumable_payable += charge.subtotal();
        }

        totals.balance = totals.staff_payable + totals.consumable_payable;
        totals
    }

    /// True when the invoice has neither staff nor consumable charges
    pub fn is_empty(&self) -> bool {
        self.staff_charge_count == 0 && self.consumable_count == 0
    }
}
