//! Facility Invoicing - Operator Binary
//!
//! # Usage
//!
//! ```bash
//! invoicing create-invoices --first-month 202201 --last-month 202203 --usage usage.json
//! invoicing create-credit-invoices --input credit.csv
//! invoicing set-invoices-sent --input sent.csv
//! invoicing set-invoices-paid --input paid.csv
//! invoicing add-user --last-name Lovelace
//! ```
//!
//! # Environment Variables
//!
//! * `INVOICING_DATABASE_URL` - SQLite ledger (default: sqlite://invoicing.db)
//! * `INVOICING_HOURLY_RATE` - Staff hourly rate in EUR (default: 20)
//! * `INVOICING_CHARGEABLE_ACCOUNT` - Account printed on documents
//! * `INVOICING_FACILITY_NAME` - Facility name (default: SequAna)
//! * `INVOICING_OUTPUT_DIR` - Document directory (default: .)
//! * `INVOICING_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! * `INVOICING_JSON_LOGS` - Emit JSON log lines (default: false)

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::Money;
use domain_billing::{
    AutoConfirm, Confirmation, LedgerStore, PreparedUsers, RunParameters, StatusTransition,
};
use infra_db::{create_pool, run_migrations, DatabaseConfig, SqliteLedger};
use interface_cli::cli::{Cli, Command};
use interface_cli::input::{read_amount_rows, read_usage};
use interface_cli::{Invoicing, InvoicingConfig, JsonRenderer, Prompt, PromptedUsers};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = InvoicingConfig::from_env().context("Invalid INVOICING_* configuration")?;
    if let Some(url) = cli.database_url.clone() {
        config.database_url = url;
    }
    config.json_logs |= cli.json_logs;

    init_tracing(&config.log_level, config.json_logs);

    match run(cli.command, config).await {
        Ok(true) => Ok(ExitCode::SUCCESS),
        Ok(false) => Ok(ExitCode::FAILURE),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            Err(e)
        }
    }
}

/// Initializes the tracing subscriber
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

async fn open_ledger(database_url: &str) -> anyhow::Result<Arc<dyn LedgerStore>> {
    tracing::info!(url = %database_url, "Opening ledger");
    let pool = create_pool(DatabaseConfig::new(database_url))
        .await
        .context("Cannot open the ledger database")?;
    run_migrations(&pool).await.context("Cannot migrate the ledger database")?;
    Ok(Arc::new(SqliteLedger::new(pool)))
}

/// Runs one command; `Ok(false)` means some users failed
async fn run(command: Command, config: InvoicingConfig) -> anyhow::Result<bool> {
    let store = open_ledger(&config.database_url).await?;
    let prompt = Arc::new(Prompt::stdio());

    match command {
        Command::CreateInvoices(args) => {
            let confirm: Arc<dyn Confirmation> = if args.answer_yes {
                Arc::new(AutoConfirm::new(prompt.clone()))
            } else {
                prompt.clone()
            };
            let output_dir = args.output.output_dir.clone().unwrap_or(config.output_dir);
            let app = Invoicing::new(store, confirm, Arc::new(JsonRenderer::new(output_dir)));

            let usage = read_usage(&args.usage)?;
            let params = RunParameters {
                period: args.period()?,
                hourly_rate: Money::new(args.staff_hourly_rate.unwrap_or(config.hourly_rate)),
                chargeable_account: args
                    .output
                    .chargeable_account
                    .clone()
                    .unwrap_or(config.chargeable_account),
                facility_name: config.facility_name,
                user_filter: args.user_filter(),
            };
            let new_users = Arc::new(PromptedUsers::new(PreparedUsers::new(usage.new_users.clone()), prompt));

            let run = app.create_invoices(&usage, params, new_users).await?;
            for path in &run.documents {
                println!("{}", path.display());
            }
            if run.has_failures() {
                eprintln!("{} user(s) could not be invoiced:", run.report.failures.len());
                for failure in &run.report.failures {
                    eprintln!("  {}: {}", failure.last_name, failure.error);
                }
            }
            Ok(!run.has_failures())
        }
        Command::CreateCreditInvoices(args) => {
            let output_dir = args.output.output_dir.clone().unwrap_or(config.output_dir);
            let account = args.output.chargeable_account.clone().unwrap_or(config.chargeable_account);
            let app = Invoicing::new(store, prompt, Arc::new(JsonRenderer::new(output_dir)));

            let rows = read_amount_rows(&args.input)?;
            let documents = app
                .create_credit_invoices(&rows, &config.facility_name, &account, Utc::now())
                .await?;
            for path in &documents {
                println!("{}", path.display());
            }
            Ok(true)
        }
        Command::SetInvoicesSent(args) => {
            let app = Invoicing::new(store, prompt, Arc::new(JsonRenderer::new(config.output_dir)));
            set_status(&app, StatusTransition::MarkSent, &args.input).await
        }
        Command::SetInvoicesPaid(args) => {
            let app = Invoicing::new(store, prompt, Arc::new(JsonRenderer::new(config.output_dir)));
            set_status(&app, StatusTransition::MarkPaid, &args.input).await
        }
        Command::AddUser(args) => {
            let Some(details) = prompt.new_user(args.last_name.as_deref()) else {
                bail!("User details incomplete; nothing was stored");
            };
            let app = Invoicing::new(store, prompt, Arc::new(JsonRenderer::new(config.output_dir)));
            let user = app.add_user(details).await?;
            println!("Created user {} <{}>", user.display_name(), user.email);
            Ok(true)
        }
    }
}

async fn set_status(app: &Invoicing, transition: StatusTransition, input: &Path) -> anyhow::Result<bool> {
    let rows = read_amount_rows(input)?;
    let changes = app.set_status(transition, &rows).await?;
    for change in &changes {
        println!(
            "{} {} {} -> {}",
            change.user_email, change.amount_payable, change.from, change.to
        );
    }
    Ok(true)
}
