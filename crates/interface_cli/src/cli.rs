//! Command line arguments

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

use core_kernel::{BillingMonth, BillingPeriod};

use crate::error::CliError;

/// Facility invoicing ledger
#[derive(Debug, Parser)]
#[command(name = "invoicing", version, about)]
pub struct Cli {
    /// SQLite ledger URL
    #[arg(long, global = true, env = "INVOICING_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reconcile usage into debit invoices and write their documents
    CreateInvoices(CreateInvoicesArgs),
    /// Issue credit invoices for prepaid credit
    CreateCreditInvoices(CreateCreditInvoicesArgs),
    /// Mark invoices as sent
    SetInvoicesSent(StatusArgs),
    /// Mark sent invoices as paid
    SetInvoicesPaid(StatusArgs),
    /// Add a user to the ledger
    AddUser(AddUserArgs),
}

#[derive(Debug, Args)]
pub struct CreateInvoicesArgs {
    /// First month of the billing period (YYYYMM)
    #[arg(long, value_parser = parse_month)]
    pub first_month: BillingMonth,

    /// Last month of the billing period (YYYYMM)
    #[arg(long, value_parser = parse_month)]
    pub last_month: BillingMonth,

    /// JSON usage file
    #[arg(long)]
    pub usage: PathBuf,

    /// Only invoice these users, by last name with underscores for spaces
    #[arg(long, value_delimiter = ',')]
    pub users: Option<Vec<String>>,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Staff hourly rate in EUR
    #[arg(long)]
    pub staff_hourly_rate: Option<Decimal>,

    /// Answer yes to every prompt that allows it
    #[arg(long)]
    pub answer_yes: bool,
}

impl CreateInvoicesArgs {
    pub fn period(&self) -> Result<BillingPeriod, CliError> {
        BillingPeriod::new(self.first_month, self.last_month)
            .map_err(|e| CliError::Argument(e.to_string()))
    }

    pub fn user_filter(&self) -> Option<Vec<String>> {
        self.users
            .as_ref()
            .map(|users| users.iter().map(|u| u.trim().to_string()).filter(|u| !u.is_empty()).collect())
    }
}

#[derive(Debug, Args)]
pub struct CreateCreditInvoicesArgs {
    /// `user_email,amount_payable` list
    #[arg(long)]
    pub input: PathBuf,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Directory documents are written to
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Account users transfer payments to
    #[arg(long)]
    pub chargeable_account: Option<String>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// `user_email,amount_payable` list
    #[arg(long)]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct AddUserArgs {
    /// Last name of the user; asked for when omitted
    #[arg(long)]
    pub last_name: Option<String>,
}

fn parse_month(raw: &str) -> Result<BillingMonth, String> {
    raw.trim().parse().map_err(|e| format!("{}", e))
}
