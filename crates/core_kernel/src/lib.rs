//! Core Kernel - Foundational types for the facility invoicing ledger
//!
//! This crate provides the fundamental building blocks used by the billing
//! domain and its adapters:
//! - Money and subsidy types with precise decimal arithmetic
//! - Billing months and periods in `YYYYMM` form
//! - Integer identifiers for ledger records
//! - Port error types shared by all adapters

pub mod money;
pub mod period;
pub mod identifiers;
pub mod ports;

pub use money::{Money, MoneyError, SubsidyPercent};
pub use period::{BillingMonth, BillingPeriod, PeriodError};
pub use identifiers::{
    UserId, ProjectId, InvoiceId, StaffChargeId, ConsumableChargeId, CreditDebitId,
};
pub use ports::{DomainPort, PortError};
