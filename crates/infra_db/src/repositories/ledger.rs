//! Ledger repository
//!
//! SQL for every ledger table, run against a single connection so the
//! caller decides the transaction boundary. All statements are
//! parameterised; decimals travel as normalised TEXT.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{Sqlite, SqliteConnection, SqliteQueryResult, SqliteRow};
use sqlx::{QueryBuilder, Row};
use std::str::FromStr;

use core_kernel::{
    BillingMonth, BillingPeriod, ConsumableChargeId, CreditDebitId, InvoiceId, Money, ProjectId,
    StaffChargeId, SubsidyPercent, UserId,
};
use domain_billing::{
    ConsumableCharge, ConsumableKey, CreditDebit, Invoice, InvoiceQuery, InvoiceType,
    NewConsumableCharge, NewCreditDebit, NewInvoice, NewProject, NewStaffCharge, NewUserRecord,
    Project, ProjectType, StaffCharge, User,
};

use crate::error::DatabaseError;

// =============================================================================
// Column codecs
// =============================================================================

fn decimal_text(value: Decimal) -> String {
    value.normalize().to_string()
}

fn money_text(value: Money) -> String {
    decimal_text(value.amount())
}

fn subsidy_text(value: SubsidyPercent) -> String {
    decimal_text(value.percent())
}

fn month_value(month: BillingMonth) -> i64 {
    i64::from(month.as_yyyymm())
}

fn get_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, DatabaseError> {
    let text: String = row.try_get(column)?;
    Decimal::from_str(&text).map_err(|e| DatabaseError::decode(column, e))
}

fn get_money(row: &SqliteRow, column: &str) -> Result<Money, DatabaseError> {
    Ok(Money::new(get_decimal(row, column)?))
}

fn get_subsidy(row: &SqliteRow, column: &str) -> Result<SubsidyPercent, DatabaseError> {
    SubsidyPercent::new(get_decimal(row, column)?).map_err(|e| DatabaseError::decode(column, e))
}

fn get_month(row: &SqliteRow, column: &str) -> Result<BillingMonth, DatabaseError> {
    let value: i64 = row.try_get(column)?;
    let value = u32::try_from(value).map_err(|e| DatabaseError::decode(column, e))?;
    BillingMonth::from_yyyymm(value).map_err(|e| DatabaseError::decode(column, e))
}

// =============================================================================
// Row mapping
// =============================================================================

fn user_from_row(row: &SqliteRow) -> Result<User, DatabaseError> {
    Ok(User {
        id: UserId::new(row.try_get("id")?),
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        staff_subsidy: get_subsidy(row, "staff_subsidy_percent")?,
        consumable_subsidy: get_subsidy(row, "consumable_subsidy_percent")?,
    })
}

fn project_from_row(row: &SqliteRow) -> Result<Project, DatabaseError> {
    let kind: String = row.try_get("project_type")?;
    Ok(Project {
        id: ProjectId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        title: row.try_get("title")?,
        project_type: ProjectType::from_str(&kind).map_err(|e| DatabaseError::decode("project_type", e))?,
    })
}

fn invoice_from_row(row: &SqliteRow) -> Result<Invoice, DatabaseError> {
    let kind: String = row.try_get("invoice_type")?;
    let period = BillingPeriod::new(get_month(row, "first_month")?, get_month(row, "last_month")?)
        .map_err(|e| DatabaseError::decode("last_month", e))?;
    let timestamp: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Invoice {
        id: InvoiceId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        invoice_type: InvoiceType::from_str(&kind).map_err(|e| DatabaseError::decode("invoice_type", e))?,
        period,
        timestamp,
        chargeable_account: row.try_get("chargeable_account")?,
        amount_payable: get_money(row, "amount_payable")?,
        reference_text: row.try_get("reference_text")?,
        sent: row.try_get("sent")?,
        paid: row.try_get("paid")?,
    })
}

fn staff_charge_from_row(row: &SqliteRow) -> Result<StaffCharge, DatabaseError> {
    Ok(StaffCharge {
        id: StaffChargeId::new(row.try_get("id")?),
        invoice_id: InvoiceId::new(row.try_get("invoice_id")?),
        project_id: ProjectId::new(row.try_get("project_id")?),
        hours: get_decimal(row, "staff_hours")?,
        hourly_rate: get_money(row, "staff_hourly_rate")?,
        subsidy: get_subsidy(row, "subsidy_percent")?,
    })
}

fn consumable_from_row(row: &SqliteRow) -> Result<ConsumableCharge, DatabaseError> {
    Ok(ConsumableCharge {
        id: ConsumableChargeId::new(row.try_get("id")?),
        invoice_id: InvoiceId::new(row.try_get("invoice_id")?),
        project_id: ProjectId::new(row.try_get("project_id")?),
        name: row.try_get("name")?,
        unit_cost: get_money(row, "unit_cost")?,
        quantity: get_decimal(row, "quantity")?,
        subsidy: get_subsidy(row, "subsidy_percent")?,
        month: get_month(row, "month")?,
        reference: row.try_get("reference")?,
    })
}

fn credit_debit_from_row(row: &SqliteRow) -> Result<CreditDebit, DatabaseError> {
    Ok(CreditDebit {
        id: CreditDebitId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        debit_invoice_id: InvoiceId::new(row.try_get("debit_invoice_id")?),
        amount: get_money(row, "amount")?,
    })
}

fn map_rows<T>(
    rows: Vec<SqliteRow>,
    map: fn(&SqliteRow) -> Result<T, DatabaseError>,
) -> Result<Vec<T>, DatabaseError> {
    rows.iter().map(map).collect()
}

// =============================================================================
// Users
// =============================================================================

pub async fn user_by_id(conn: &mut SqliteConnection, id: UserId) -> Result<Option<User>, DatabaseError> {
    sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(id.value())
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(user_from_row)
        .transpose()
}

pub async fn user_by_email(conn: &mut SqliteConnection, email: &str) -> Result<Option<User>, DatabaseError> {
    sqlx::query("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(user_from_row)
        .transpose()
}

pub async fn users_by_last_name(conn: &mut SqliteConnection, last_name: &str) -> Result<Vec<User>, DatabaseError> {
    let rows = sqlx::query("SELECT * FROM users WHERE last_name = ? ORDER BY id")
        .bind(last_name)
        .fetch_all(&mut *conn)
        .await?;
    map_rows(rows, user_from_row)
}

pub async fn all_users(conn: &mut SqliteConnection) -> Result<Vec<User>, DatabaseError> {
    let rows = sqlx::query("SELECT * FROM users ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;
    map_rows(rows, user_from_row)
}

pub async fn insert_user(conn: &mut SqliteConnection, user: NewUserRecord) -> Result<User, DatabaseError> {
    let result = sqlx::query(
        "INSERT INTO users (email, first_name, last_name, staff_subsidy_percent, consumable_subsidy_percent) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&user.email)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(subsidy_text(user.staff_subsidy))
    .bind(subsidy_text(user.consumable_subsidy))
    .execute(&mut *conn)
    .await
    .map_err(|e| match DatabaseError::from(e) {
        DatabaseError::DuplicateEntry(_) => {
            DatabaseError::DuplicateEntry(format!("email {} is already registered", user.email))
        }
        other => other,
    })?;

    Ok(User {
        id: UserId::new(result.last_insert_rowid()),
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        staff_subsidy: user.staff_subsidy,
        consumable_subsidy: user.consumable_subsidy,
    })
}

// =============================================================================
// Projects
// =============================================================================

pub async fn project_by_id(conn: &mut SqliteConnection, id: ProjectId) -> Result<Option<Project>, DatabaseError> {
    sqlx::query("SELECT * FROM projects WHERE id = ?")
        .bind(id.value())
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(project_from_row)
        .transpose()
}

pub async fn find_project(
    conn: &mut SqliteConnection,
    user_id: UserId,
    title: &str,
    project_type: ProjectType,
) -> Result<Option<Project>, DatabaseError> {
    sqlx::query("SELECT * FROM projects WHERE user_id = ? AND title = ? AND project_type = ?")
        .bind(user_id.value())
        .bind(title)
        .bind(project_type.as_str())
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(project_from_row)
        .transpose()
}

pub async fn insert_project(conn: &mut SqliteConnection, project: NewProject) -> Result<Project, DatabaseError> {
    let result = sqlx::query("INSERT INTO projects (user_id, title, project_type) VALUES (?, ?, ?)")
        .bind(project.user_id.value())
        .bind(&project.title)
        .bind(project.project_type.as_str())
        .execute(&mut *conn)
        .await?;

    Ok(Project {
        id: ProjectId::new(result.last_insert_rowid()),
        user_id: project.user_id,
        title: project.title,
        project_type: project.project_type,
    })
}

// =============================================================================
// Invoices
// =============================================================================

pub async fn invoice_by_id(conn: &mut SqliteConnection, id: InvoiceId) -> Result<Option<Invoice>, DatabaseError> {
    sqlx::query("SELECT * FROM invoices WHERE id = ?")
        .bind(id.value())
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(invoice_from_row)
        .transpose()
}

pub async fn overlapping_invoices(
    conn: &mut SqliteConnection,
    user_id: UserId,
    invoice_type: InvoiceType,
    period: &BillingPeriod,
) -> Result<Vec<Invoice>, DatabaseError> {
    let rows = sqlx::query(
        "SELECT * FROM invoices \
         WHERE user_id = ? AND invoice_type = ? AND first_month <= ? AND last_month >= ? \
         ORDER BY id",
    )
    .bind(user_id.value())
    .bind(invoice_type.as_str())
    .bind(month_value(period.last()))
    .bind(month_value(period.first()))
    .fetch_all(&mut *conn)
    .await?;
    map_rows(rows, invoice_from_row)
}

pub async fn find_invoices(conn: &mut SqliteConnection, query: &InvoiceQuery) -> Result<Vec<Invoice>, DatabaseError> {
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT i.* FROM invoices i JOIN users u ON u.id = i.user_id WHERE 1 = 1");

    if let Some(user_id) = query.user_id {
        builder.push(" AND i.user_id = ").push_bind(user_id.value());
    }
    if let Some(email) = &query.email {
        builder.push(" AND u.email = ").push_bind(email.clone());
    }
    if let Some(amount) = query.amount_payable {
        builder.push(" AND i.amount_payable = ").push_bind(money_text(amount));
    }
    if let Some(invoice_type) = query.invoice_type {
        builder.push(" AND i.invoice_type = ").push_bind(invoice_type.as_str());
    }
    if let Some(sent) = query.sent {
        builder.push(" AND i.sent = ").push_bind(sent);
    }
    if let Some(paid) = query.paid {
        builder.push(" AND i.paid = ").push_bind(paid);
    }
    builder.push(" ORDER BY i.id");

    let rows = builder.build().fetch_all(&mut *conn).await?;
    map_rows(rows, invoice_from_row)
}

pub async fn insert_invoice(conn: &mut SqliteConnection, invoice: NewInvoice) -> Result<Invoice, DatabaseError> {
    let result = sqlx::query(
        "INSERT INTO invoices \
         (user_id, invoice_type, first_month, last_month, created_at, chargeable_account, amount_payable, sent, paid) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, 0)",
    )
    .bind(invoice.user_id.value())
    .bind(invoice.invoice_type.as_str())
    .bind(month_value(invoice.period.first()))
    .bind(month_value(invoice.period.last()))
    .bind(invoice.timestamp)
    .bind(&invoice.chargeable_account)
    .bind(money_text(invoice.amount_payable))
    .execute(&mut *conn)
    .await?;

    Ok(Invoice {
        id: InvoiceId::new(result.last_insert_rowid()),
        user_id: invoice.user_id,
        invoice_type: invoice.invoice_type,
        period: invoice.period,
        timestamp: invoice.timestamp,
        chargeable_account: invoice.chargeable_account,
        amount_payable: invoice.amount_payable,
        reference_text: None,
        sent: false,
        paid: false,
    })
}

fn expect_one(result: SqliteQueryResult, entity: &str, id: impl std::fmt::Display) -> Result<(), DatabaseError> {
    if result.rows_affected() == 0 {
        return Err(DatabaseError::not_found(entity, id));
    }
    Ok(())
}

pub async fn refresh_invoice(
    conn: &mut SqliteConnection,
    id: InvoiceId,
    timestamp: DateTime<Utc>,
    chargeable_account: &str,
) -> Result<(), DatabaseError> {
    let result = sqlx::query("UPDATE invoices SET created_at = ?, chargeable_account = ? WHERE id = ?")
        .bind(timestamp)
        .bind(chargeable_account)
        .bind(id.value())
        .execute(&mut *conn)
        .await?;
    expect_one(result, "Invoice", id)
}

pub async fn set_amount_payable(conn: &mut SqliteConnection, id: InvoiceId, amount: Money) -> Result<(), DatabaseError> {
    let result = sqlx::query("UPDATE invoices SET amount_payable = ? WHERE id = ?")
        .bind(money_text(amount))
        .bind(id.value())
        .execute(&mut *conn)
        .await?;
    expect_one(result, "Invoice", id)
}

pub async fn set_reference_text(conn: &mut SqliteConnection, id: InvoiceId, text: &str) -> Result<(), DatabaseError> {
    let result = sqlx::query("UPDATE invoices SET reference_text = ? WHERE id = ?")
        .bind(text)
        .bind(id.value())
        .execute(&mut *conn)
        .await?;
    expect_one(result, "Invoice", id)
}

pub async fn set_invoice_flags(
    conn: &mut SqliteConnection,
    id: InvoiceId,
    sent: bool,
    paid: bool,
) -> Result<(), DatabaseError> {
    let result = sqlx::query("UPDATE invoices SET sent = ?, paid = ? WHERE id = ?")
        .bind(sent)
        .bind(paid)
        .bind(id.value())
        .execute(&mut *conn)
        .await?;
    expect_one(result, "Invoice", id)
}

// =============================================================================
// Staff charges
// =============================================================================

pub async fn staff_charges_for_invoice(
    conn: &mut SqliteConnection,
    invoice_id: InvoiceId,
) -> Result<Vec<StaffCharge>, DatabaseError> {
    let rows = sqlx::query("SELECT * FROM staff_time_charges WHERE invoice_id = ? ORDER BY id")
        .bind(invoice_id.value())
        .fetch_all(&mut *conn)
        .await?;
    map_rows(rows, staff_charge_from_row)
}

pub async fn staff_charge_for(
    conn: &mut SqliteConnection,
    invoice_id: InvoiceId,
    project_id: ProjectId,
) -> Result<Option<StaffCharge>, DatabaseError> {
    sqlx::query("SELECT * FROM staff_time_charges WHERE invoice_id = ? AND project_id = ?")
        .bind(invoice_id.value())
        .bind(project_id.value())
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(staff_charge_from_row)
        .transpose()
}

pub async fn insert_staff_charge(
    conn: &mut SqliteConnection,
    charge: NewStaffCharge,
) -> Result<StaffCharge, DatabaseError> {
    let result = sqlx::query(
        "INSERT INTO staff_time_charges (invoice_id, project_id, staff_hours, staff_hourly_rate, subsidy_percent) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(charge.invoice_id.value())
    .bind(charge.project_id.value())
    .bind(decimal_text(charge.hours))
    .bind(money_text(charge.hourly_rate))
    .bind(subsidy_text(charge.subsidy))
    .execute(&mut *conn)
    .await?;

    Ok(StaffCharge {
        id: StaffChargeId::new(result.last_insert_rowid()),
        invoice_id: charge.invoice_id,
        project_id: charge.project_id,
        hours: charge.hours,
        hourly_rate: charge.hourly_rate,
        subsidy: charge.subsidy,
    })
}

pub async fn update_staff_charge(conn: &mut SqliteConnection, charge: &StaffCharge) -> Result<(), DatabaseError> {
    let result = sqlx::query(
        "UPDATE staff_time_charges SET staff_hours = ?, staff_hourly_rate = ?, subsidy_percent = ? WHERE id = ?",
    )
    .bind(decimal_text(charge.hours))
    .bind(money_text(charge.hourly_rate))
    .bind(subsidy_text(charge.subsidy))
    .bind(charge.id.value())
    .execute(&mut *conn)
    .await?;
    expect_one(result, "StaffCharge", charge.id)
}

pub async fn delete_staff_charge(conn: &mut SqliteConnection, id: StaffChargeId) -> Result<(), DatabaseError> {
    let result = sqlx::query("DELETE FROM staff_time_charges WHERE id = ?")
        .bind(id.value())
        .execute(&mut *conn)
        .await?;
    expect_one(result, "StaffCharge", id)
}

// =============================================================================
// Consumable charges
// =============================================================================

pub async fn consumable_charges_for_invoice(
    conn: &mut SqliteConnection,
    invoice_id: InvoiceId,
) -> Result<Vec<ConsumableCharge>, DatabaseError> {
    let rows = sqlx::query("SELECT * FROM consumable_charges WHERE invoice_id = ? ORDER BY id")
        .bind(invoice_id.value())
        .fetch_all(&mut *conn)
        .await?;
    map_rows(rows, consumable_from_row)
}

pub async fn find_consumable_charge(
    conn: &mut SqliteConnection,
    key: &ConsumableKey,
) -> Result<Option<ConsumableCharge>, DatabaseError> {
    sqlx::query(
        "SELECT * FROM consumable_charges \
         WHERE project_id = ? AND invoice_id = ? AND name = ? AND month = ? \
           AND unit_cost = ? AND quantity = ? AND reference = ? \
         ORDER BY id LIMIT 1",
    )
    .bind(key.project_id.value())
    .bind(key.invoice_id.value())
    .bind(&key.name)
    .bind(month_value(key.month))
    .bind(money_text(key.unit_cost))
    .bind(decimal_text(key.quantity))
    .bind(&key.reference)
    .fetch_optional(&mut *conn)
    .await?
    .as_ref()
    .map(consumable_from_row)
    .transpose()
}

pub async fn insert_consumable_charge(
    conn: &mut SqliteConnection,
    charge: NewConsumableCharge,
) -> Result<ConsumableCharge, DatabaseError> {
    let key = charge.key;
    let result = sqlx::query(
        "INSERT INTO consumable_charges \
         (invoice_id, project_id, name, unit_cost, quantity, subsidy_percent, month, reference) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(key.invoice_id.value())
    .bind(key.project_id.value())
    .bind(&key.name)
    .bind(money_text(key.unit_cost))
    .bind(decimal_text(key.quantity))
    .bind(subsidy_text(charge.subsidy))
    .bind(month_value(key.month))
    .bind(&key.reference)
    .execute(&mut *conn)
    .await?;

    Ok(ConsumableCharge {
        id: ConsumableChargeId::new(result.last_insert_rowid()),
        invoice_id: key.invoice_id,
        project_id: key.project_id,
        name: key.name,
        unit_cost: key.unit_cost,
        quantity: key.quantity,
        subsidy: charge.subsidy,
        month: key.month,
        reference: key.reference,
    })
}

// =============================================================================
// Credit debits
// =============================================================================

pub async fn credit_debits_for_user(
    conn: &mut SqliteConnection,
    user_id: UserId,
) -> Result<Vec<CreditDebit>, DatabaseError> {
    let rows = sqlx::query("SELECT * FROM credit_debits WHERE user_id = ? ORDER BY id")
        .bind(user_id.value())
        .fetch_all(&mut *conn)
        .await?;
    map_rows(rows, credit_debit_from_row)
}

pub async fn credit_debits_for(
    conn: &mut SqliteConnection,
    invoice_id: InvoiceId,
    user_id: UserId,
) -> Result<Vec<CreditDebit>, DatabaseError> {
    let rows = sqlx::query("SELECT * FROM credit_debits WHERE debit_invoice_id = ? AND user_id = ? ORDER BY id")
        .bind(invoice_id.value())
        .bind(user_id.value())
        .fetch_all(&mut *conn)
        .await?;
    map_rows(rows, credit_debit_from_row)
}

pub async fn delete_credit_debits(
    conn: &mut SqliteConnection,
    invoice_id: InvoiceId,
    user_id: UserId,
) -> Result<u64, DatabaseError> {
    let result = sqlx::query("DELETE FROM credit_debits WHERE debit_invoice_id = ? AND user_id = ?")
        .bind(invoice_id.value())
        .bind(user_id.value())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn insert_credit_debit(
    conn: &mut SqliteConnection,
    debit: NewCreditDebit,
) -> Result<CreditDebit, DatabaseError> {
    let result = sqlx::query("INSERT INTO credit_debits (user_id, debit_invoice_id, amount) VALUES (?, ?, ?)")
        .bind(debit.user_id.value())
        .bind(debit.debit_invoice_id.value())
        .bind(money_text(debit.amount))
        .execute(&mut *conn)
        .await?;

    Ok(CreditDebit {
        id: CreditDebitId::new(result.last_insert_rowid()),
        user_id: debit.user_id,
        debit_invoice_id: debit.debit_invoice_id,
        amount: debit.amount,
    })
}
