//! End-to-end tests for domain_billing against the in-memory ledger

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use core_kernel::{BillingMonth, BillingPeriod, Money, SubsidyPercent};

use domain_billing::usage::{ConsumableRow, StaffHoursRow};
use domain_billing::{
    AlwaysDecline, AmountRow, AutoConfirm, BillingError, Confirmation, CreditInvoiceIssuer,
    InMemoryLedger, InvoiceOutcome, LedgerStore, LifecycleGuard, NewUser, NewUserRecord,
    PreparedUsers, ReconciledInvoice, ReconciliationEngine, RunParameters, RunReport,
    ScriptedConfirmation, StatusTransition, UsageDate, UsageInput,
};

// ============================================================================
// Fixtures
// ============================================================================

fn month(yyyymm: u32) -> BillingMonth {
    BillingMonth::from_yyyymm(yyyymm).unwrap()
}

fn period(first: u32, last: u32) -> BillingPeriod {
    BillingPeriod::new(month(first), month(last)).unwrap()
}

fn params(first: u32, last: u32) -> RunParameters {
    RunParameters {
        period: period(first, last),
        hourly_rate: Money::new(dec!(20)),
        chargeable_account: "1414 11171 08 2151040901".to_string(),
        facility_name: "SequAna".to_string(),
        user_filter: None,
    }
}

fn user(first: &str, last: &str, email: &str) -> NewUserRecord {
    NewUserRecord {
        email: email.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        staff_subsidy: SubsidyPercent::new(dec!(25)).unwrap(),
        consumable_subsidy: SubsidyPercent::new(dec!(50)).unwrap(),
    }
}

fn ada() -> NewUserRecord {
    user("Ada", "Lovelace", "ada@example.org")
}

fn grace() -> NewUserRecord {
    user("Grace", "Hopper", "grace@example.org")
}

fn hours(project: &str, yyyymm: u32, hours: Decimal) -> StaffHoursRow {
    StaffHoursRow {
        project: project.to_string(),
        month: month(yyyymm),
        hours,
    }
}

fn staff_input(rows: Vec<StaffHoursRow>) -> UsageInput {
    UsageInput {
        staff_hours: rows,
        ..Default::default()
    }
}

/// Ten hours on one wetlab project in January 2022
fn ten_hours() -> UsageInput {
    staff_input(vec![hours("Lovelace_wetlab: Atlas", 202201, dec!(10))])
}

fn engine_with(
    ledger: &InMemoryLedger,
    params: RunParameters,
    confirm: Arc<dyn Confirmation>,
    new_users: PreparedUsers,
) -> ReconciliationEngine {
    let store: Arc<dyn LedgerStore> = Arc::new(ledger.clone());
    ReconciliationEngine::new(store, confirm, Arc::new(new_users), params)
}

fn engine(ledger: &InMemoryLedger, params: RunParameters) -> ReconciliationEngine {
    engine_with(ledger, params, Arc::new(AutoConfirm::new(AlwaysDecline)), PreparedUsers::default())
}

fn guard(ledger: &InMemoryLedger) -> LifecycleGuard {
    LifecycleGuard::new(Arc::new(ledger.clone()))
}

fn only_reconciled(report: &RunReport) -> &ReconciledInvoice {
    assert!(!report.has_failures(), "unexpected failures: {:?}", report.failures);
    let reconciled: Vec<_> = report.reconciled().collect();
    assert_eq!(reconciled.len(), 1);
    reconciled[0]
}

/// Issues and pays a credit invoice for `email`
async fn buy_credit(ledger: &InMemoryLedger, email: &str, amount: Decimal) {
    let issuer = CreditInvoiceIssuer::new(Arc::new(ledger.clone()), "SequAna", "1414");
    let rows = vec![AmountRow::new(email, amount)];
    issuer.issue(&rows, Utc::now()).await.unwrap();
    guard(ledger).apply(StatusTransition::MarkSent, &rows).await.unwrap();
    guard(ledger).apply(StatusTransition::MarkPaid, &rows).await.unwrap();
}

// ============================================================================
// Reconciliation
// ============================================================================

mod reconciliation_tests {
    use super::*;

    #[tokio::test]
    async fn test_subsidised_staff_charge() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let report = engine(&ledger, params(202201, 202201)).run(&ten_hours()).await.unwrap();

        let invoice = only_reconciled(&report);
        assert_eq!(invoice.totals.total_staff_cost, Money::new(dec!(200)));
        assert_eq!(invoice.totals.total_staff_subsidy, Money::new(dec!(50)));
        assert_eq!(invoice.totals.staff_payable, Money::new(dec!(150)));
        assert_eq!(invoice.invoice.amount_payable, Money::new(dec!(150)));
        assert!(!invoice.invoice.sent);
    }

    #[tokio::test]
    async fn test_payable_equal_to_placeholder_value() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let input = staff_input(vec![hours("Lovelace_wetlab: Atlas", 202201, dec!(6666.666))]);
        let report = engine(&ledger, params(202201, 202201)).run(&input).await.unwrap();

        let invoice = only_reconciled(&report);
        assert_eq!(invoice.invoice.amount_payable, Money::new(dec!(99999.99)));
        let stored = ledger.snapshot().await;
        assert_eq!(stored.invoices[&invoice.invoice.id].amount_payable, Money::new(dec!(99999.99)));
    }

    #[tokio::test]
    async fn test_oversized_hours_rejected_before_writing() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let engine = engine(&ledger, params(202201, 202201));

        let huge = staff_input(vec![hours(
            "Lovelace_wetlab: Atlas",
            202201,
            dec!(10000000000000000000000000000),
        )]);
        assert!(engine.run(&huge).await.unwrap_err().is_validation());

        let unsummable = staff_input(vec![
            hours("Lovelace_wetlab: Atlas", 202201, dec!(40000000000000000000000000000)),
            hours("Lovelace_wetlab: Atlas", 202201, dec!(40000000000000000000000000000)),
        ]);
        assert!(engine.run(&unsummable).await.unwrap_err().is_validation());

        let stored = ledger.snapshot().await;
        assert!(stored.invoices.is_empty());
        assert!(stored.staff_charges.is_empty());
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let engine = engine(&ledger, params(202201, 202201));

        let first = engine.run(&ten_hours()).await.unwrap();
        let before = ledger.snapshot().await;
        let second = engine.run(&ten_hours()).await.unwrap();
        let after = ledger.snapshot().await;

        assert_eq!(before.invoices.len(), 1);
        assert_eq!(after.invoices.len(), 1);
        assert_eq!(
            before.staff_charges.values().collect::<Vec<_>>(),
            after.staff_charges.values().collect::<Vec<_>>()
        );
        assert_eq!(only_reconciled(&first).totals, only_reconciled(&second).totals);
        assert!(only_reconciled(&second).changes.is_empty());
    }

    #[tokio::test]
    async fn test_hours_summed_over_period_and_changes_reported() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let engine = engine(&ledger, params(202201, 202203));
        let input = |march: Decimal| {
            staff_input(vec![
                hours("Lovelace_wetlab: Atlas", 202201, dec!(4)),
                hours("Lovelace_wetlab: Atlas", 202202, dec!(0)),
                hours("Lovelace_wetlab: Atlas", 202203, march),
                hours("Lovelace_wetlab: Atlas", 202204, dec!(100)),
            ])
        };

        let report = engine.run(&input(dec!(6))).await.unwrap();
        assert_eq!(only_reconciled(&report).totals.total_staff_hours, dec!(10));

        let report = engine.run(&input(dec!(8))).await.unwrap();
        let invoice = only_reconciled(&report);
        assert_eq!(invoice.totals.total_staff_hours, dec!(12));
        assert_eq!(invoice.changes.len(), 1);
        assert_eq!(invoice.changes[0].field, "staff_hours");
    }

    #[tokio::test]
    async fn test_stale_staff_charges_are_pruned() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let engine = engine(&ledger, params(202201, 202201));

        let both = staff_input(vec![
            hours("Lovelace_wetlab: Atlas", 202201, dec!(10)),
            hours("Lovelace_bioinf: Variant calling", 202201, dec!(5)),
        ]);
        engine.run(&both).await.unwrap();
        assert_eq!(ledger.snapshot().await.staff_charges.len(), 2);

        let report = engine.run(&ten_hours()).await.unwrap();
        let state = ledger.snapshot().await;
        assert_eq!(state.staff_charges.len(), 1);
        assert_eq!(state.projects.len(), 2);
        assert_eq!(only_reconciled(&report).staff[0].project.title, "Atlas");
    }

    #[tokio::test]
    async fn test_zero_hour_projects_are_not_charged() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let input = staff_input(vec![
            hours("Lovelace_wetlab: Atlas", 202201, dec!(10)),
            hours("Lovelace_training: Course", 202201, dec!(0)),
        ]);
        engine(&ledger, params(202201, 202201)).run(&input).await.unwrap();

        let state = ledger.snapshot().await;
        assert_eq!(state.projects.len(), 1);
        assert_eq!(state.staff_charges.len(), 1);
    }

    #[tokio::test]
    async fn test_internal_projects_are_ignored() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let mut input = ten_hours();
        input
            .staff_hours
            .push(hours("SequAna_training: Onboarding", 202201, dec!(30)));

        let report = engine(&ledger, params(202201, 202201)).run(&input).await.unwrap();
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(ledger.snapshot().await.users.len(), 1);
    }

    #[tokio::test]
    async fn test_consumables_are_deduplicated_across_runs() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let engine = engine(&ledger, params(202201, 202201));
        let mut input = ten_hours();
        input.consumables = vec![
            ConsumableRow {
                project: "Lovelace_wetlab: Atlas".to_string(),
                name: "Flow cell".to_string(),
                unit_price: dec!(100),
                quantity: dec!(2),
                reference: "PO-17".to_string(),
                date: UsageDate::Stamp("17/01/2022 10:30".to_string()),
            },
            ConsumableRow {
                project: "Lovelace_wetlab: Atlas".to_string(),
                name: "Reagent kit".to_string(),
                unit_price: dec!(40),
                quantity: dec!(1),
                reference: "PO-18".to_string(),
                date: UsageDate::Month(month(202202)),
            },
        ];

        engine.run(&input).await.unwrap();
        let report = engine.run(&input).await.unwrap();

        let invoice = only_reconciled(&report);
        assert_eq!(ledger.snapshot().await.consumable_charges.len(), 1);
        assert_eq!(invoice.totals.total_consumable_cost, Money::new(dec!(200)));
        assert_eq!(invoice.totals.consumable_payable, Money::new(dec!(100)));
        assert_eq!(invoice.invoice.amount_payable, Money::new(dec!(250)));
    }

    #[tokio::test]
    async fn test_consumables_alone_make_a_user_billable() {
        let ledger = InMemoryLedger::with_users(vec![ada(), grace()]).await.unwrap();
        let mut input = ten_hours();
        input.consumables = vec![ConsumableRow {
            project: "Hopper_bioinf: Pipeline".to_string(),
            name: "Storage".to_string(),
            unit_price: dec!(10),
            quantity: dec!(3),
            reference: "S-1".to_string(),
            date: UsageDate::Month(month(202201)),
        }];

        let report = engine(&ledger, params(202201, 202201)).run(&input).await.unwrap();
        assert_eq!(report.reconciled().count(), 2);
        let hopper = report
            .reconciled()
            .find(|r| r.user.last_name == "Hopper")
            .unwrap();
        assert_eq!(hopper.totals.staff_charge_count, 0);
        assert_eq!(hopper.invoice.amount_payable, Money::new(dec!(15)));
    }

    #[tokio::test]
    async fn test_missing_month_is_rejected_before_any_write() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let input = staff_input(vec![
            hours("Lovelace_wetlab: Atlas", 202201, dec!(10)),
            hours("Lovelace_wetlab: Atlas", 202203, dec!(10)),
        ]);

        let err = engine(&ledger, params(202201, 202203)).run(&input).await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("202202"));
        assert!(ledger.snapshot().await.invoices.is_empty());
    }

    #[tokio::test]
    async fn test_user_filter() {
        let ledger = InMemoryLedger::with_users(vec![ada(), grace()]).await.unwrap();
        let mut input = ten_hours();
        input
            .staff_hours
            .push(hours("Hopper_bioinf: Pipeline", 202201, dec!(3)));

        let mut filtered = params(202201, 202201);
        filtered.user_filter = Some(vec!["Hopper".to_string()]);
        let report = engine(&ledger, filtered).run(&input).await.unwrap();
        assert_eq!(only_reconciled(&report).user.last_name, "Hopper");

        let mut unknown = params(202201, 202201);
        unknown.user_filter = Some(vec!["Babbage".to_string()]);
        let err = engine(&ledger, unknown).run(&input).await.unwrap_err();
        assert!(err.is_validation());
    }
}

// ============================================================================
// Invoice periods and immutability
// ============================================================================

mod invoice_period_tests {
    use super::*;

    #[tokio::test]
    async fn test_sent_invoice_is_left_unchanged() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let engine = engine(&ledger, params(202201, 202201));
        engine.run(&ten_hours()).await.unwrap();
        guard(&ledger)
            .apply(StatusTransition::MarkSent, &[AmountRow::new("ada@example.org", dec!(150))])
            .await
            .unwrap();
        let before = ledger.snapshot().await;

        let more = staff_input(vec![hours("Lovelace_wetlab: Atlas", 202201, dec!(12))]);
        let report = engine.run(&more).await.unwrap();

        assert!(matches!(report.outcomes[0], InvoiceOutcome::SkippedSent { .. }));
        let after = ledger.snapshot().await;
        assert_eq!(
            before.staff_charges.values().collect::<Vec<_>>(),
            after.staff_charges.values().collect::<Vec<_>>()
        );
        let invoice = after.invoices.values().next().unwrap();
        assert_eq!(invoice.amount_payable, Money::new(dec!(150)));
        assert!(invoice.sent);
    }

    #[tokio::test]
    async fn test_overlapping_period_is_an_error() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let q1 = staff_input(
            [202201, 202202, 202203, 202204]
                .into_iter()
                .map(|m| hours("Lovelace_wetlab: Atlas", m, dec!(1)))
                .collect(),
        );
        engine(&ledger, params(202201, 202203)).run(&q1).await.unwrap();
        let before = ledger.snapshot().await;

        let report = engine(&ledger, params(202202, 202204)).run(&q1).await.unwrap();

        assert!(report.has_failures());
        assert!(matches!(report.failures[0].error, BillingError::PeriodOverlap { .. }));
        let after = ledger.snapshot().await;
        assert_eq!(after.invoices, before.invoices);
        assert_eq!(after.staff_charges, before.staff_charges);
    }

    #[tokio::test]
    async fn test_adjacent_periods_get_separate_invoices() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let input = staff_input(vec![
            hours("Lovelace_wetlab: Atlas", 202201, dec!(10)),
            hours("Lovelace_wetlab: Atlas", 202202, dec!(10)),
        ]);
        engine(&ledger, params(202201, 202201)).run(&input).await.unwrap();
        engine(&ledger, params(202202, 202202)).run(&input).await.unwrap();

        assert_eq!(ledger.snapshot().await.invoices.len(), 2);
    }
}

// ============================================================================
// Prepaid credit
// ============================================================================

mod credit_tests {
    use super::*;

    #[tokio::test]
    async fn test_credit_below_balance() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        buy_credit(&ledger, "ada@example.org", dec!(80)).await;

        let report = engine(&ledger, params(202201, 202201)).run(&ten_hours()).await.unwrap();
        let invoice = only_reconciled(&report);

        assert_eq!(invoice.credit.starting_credit, Money::new(dec!(80)));
        assert_eq!(invoice.credit.applied, Money::new(dec!(80)));
        assert_eq!(invoice.invoice.amount_payable, Money::new(dec!(70)));

        let debits: Vec<_> = ledger.snapshot().await.credit_debits.into_values().collect();
        assert_eq!(debits.len(), 1);
        assert_eq!(debits[0].amount, Money::new(dec!(80)));
    }

    #[tokio::test]
    async fn test_credit_exceeds_balance() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        buy_credit(&ledger, "ada@example.org", dec!(500)).await;

        let report = engine(&ledger, params(202201, 202201)).run(&ten_hours()).await.unwrap();
        let invoice = only_reconciled(&report);

        assert_eq!(invoice.credit.applied, Money::new(dec!(150)));
        assert!(invoice.invoice.amount_payable.is_zero());
        assert_eq!(invoice.credit.closing_credit, Money::new(dec!(350)));
    }

    #[tokio::test]
    async fn test_credit_rerun_keeps_one_debit() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        buy_credit(&ledger, "ada@example.org", dec!(80)).await;
        let engine = engine(&ledger, params(202201, 202201));

        engine.run(&ten_hours()).await.unwrap();
        let report = engine.run(&ten_hours()).await.unwrap();

        let invoice = only_reconciled(&report);
        assert_eq!(invoice.credit.starting_credit, Money::new(dec!(80)));
        assert_eq!(invoice.invoice.amount_payable, Money::new(dec!(70)));
        assert_eq!(ledger.snapshot().await.credit_debits.len(), 1);
    }

    #[tokio::test]
    async fn test_unpaid_credit_is_not_available() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let issuer = CreditInvoiceIssuer::new(Arc::new(ledger.clone()), "SequAna", "1414");
        issuer
            .issue(&[AmountRow::new("ada@example.org", dec!(80))], Utc::now())
            .await
            .unwrap();

        let report = engine(&ledger, params(202201, 202201)).run(&ten_hours()).await.unwrap();
        assert!(only_reconciled(&report).credit.applied.is_zero());
    }

    #[tokio::test]
    async fn test_credit_spent_on_earlier_invoice() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        buy_credit(&ledger, "ada@example.org", dec!(200)).await;
        let input = staff_input(vec![
            hours("Lovelace_wetlab: Atlas", 202201, dec!(10)),
            hours("Lovelace_wetlab: Atlas", 202202, dec!(10)),
        ]);

        engine(&ledger, params(202201, 202201)).run(&input).await.unwrap();
        let report = engine(&ledger, params(202202, 202202)).run(&input).await.unwrap();

        let february = only_reconciled(&report);
        assert_eq!(february.credit.starting_credit, Money::new(dec!(50)));
        assert_eq!(february.invoice.amount_payable, Money::new(dec!(100)));
    }
}

// ============================================================================
// Credit invoices
// ============================================================================

mod credit_invoice_tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_credit_invoice() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let issuer = CreditInvoiceIssuer::new(Arc::new(ledger.clone()), "SequAna", "1414");
        let now = Utc.with_ymd_and_hms(2022, 5, 3, 12, 0, 0).unwrap();

        let issued = issuer
            .issue(&[AmountRow::new("ada@example.org", dec!(500))], now)
            .await
            .unwrap();

        let invoice = &issued[0].invoice;
        assert!(invoice.is_credit());
        assert!(!invoice.sent && !invoice.paid);
        assert_eq!(invoice.period, BillingPeriod::single(month(202205)));
        assert_eq!(invoice.amount_payable, Money::new(dec!(500)));
        assert_eq!(
            invoice.reference_text.as_deref(),
            Some(format!("SequAna credit; invoice C{}; Lovelace, Ada", invoice.id.value()).as_str())
        );
    }

    #[tokio::test]
    async fn test_duplicate_unsent_credit_is_refused() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let issuer = CreditInvoiceIssuer::new(Arc::new(ledger.clone()), "SequAna", "1414");
        let rows = [AmountRow::new("ada@example.org", dec!(500))];

        issuer.issue(&rows, Utc::now()).await.unwrap();
        let err = issuer.issue(&rows, Utc::now()).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(ledger.snapshot().await.invoices.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_user_is_refused() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let issuer = CreditInvoiceIssuer::new(Arc::new(ledger.clone()), "SequAna", "1414");
        let rows = [
            AmountRow::new("ada@example.org", dec!(100)),
            AmountRow::new("nobody@example.org", dec!(100)),
        ];

        let err = issuer.issue(&rows, Utc::now()).await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound(ref m) if m.contains("ada@example.org")));
        assert!(ledger.snapshot().await.invoices.is_empty());
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle_tests {
    use super::*;

    async fn two_users_same_amount() -> InMemoryLedger {
        let ledger = InMemoryLedger::with_users(vec![ada(), grace()]).await.unwrap();
        let input = staff_input(vec![
            hours("Lovelace_wetlab: Atlas", 202201, dec!(10)),
            hours("Hopper_bioinf: Pipeline", 202201, dec!(10)),
        ]);
        engine(&ledger, params(202201, 202201)).run(&input).await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_email_is_part_of_the_match() {
        let ledger = two_users_same_amount().await;
        let changes = guard(&ledger)
            .apply(StatusTransition::MarkSent, &[AmountRow::new("ada@example.org", dec!(150))])
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);

        let state = ledger.snapshot().await;
        let sent: Vec<_> = state.invoices.values().filter(|i| i.sent).collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(state.users[&sent[0].user_id].email, "ada@example.org");
    }

    #[tokio::test]
    async fn test_mark_paid_requires_sent() {
        let ledger = two_users_same_amount().await;
        let rows = [AmountRow::new("ada@example.org", dec!(150))];

        let err = guard(&ledger).apply(StatusTransition::MarkPaid, &rows).await.unwrap_err();
        assert!(matches!(err, BillingError::NoMatchingInvoice { .. }));

        guard(&ledger).apply(StatusTransition::MarkSent, &rows).await.unwrap();
        guard(&ledger).apply(StatusTransition::MarkPaid, &rows).await.unwrap();
        let err = guard(&ledger).apply(StatusTransition::MarkSent, &rows).await.unwrap_err();
        assert!(matches!(err, BillingError::NoMatchingInvoice { .. }));
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let ledger = two_users_same_amount().await;
        let rows = [
            AmountRow::new("ada@example.org", dec!(150)),
            AmountRow::new("grace@example.org", dec!(151)),
        ];

        assert!(guard(&ledger).apply(StatusTransition::MarkSent, &rows).await.is_err());
        assert!(ledger.snapshot().await.invoices.values().all(|i| !i.sent));
    }

    #[tokio::test]
    async fn test_ambiguous_rows_are_refused() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let input = staff_input(vec![
            hours("Lovelace_wetlab: Atlas", 202201, dec!(10)),
            hours("Lovelace_wetlab: Atlas", 202202, dec!(10)),
        ]);
        engine(&ledger, params(202201, 202201)).run(&input).await.unwrap();
        engine(&ledger, params(202202, 202202)).run(&input).await.unwrap();

        let err = guard(&ledger)
            .apply(StatusTransition::MarkSent, &[AmountRow::new("ada@example.org", dec!(150))])
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Ambiguous(_)));
    }

    #[tokio::test]
    async fn test_repeated_row_is_refused() {
        let ledger = two_users_same_amount().await;
        let row = AmountRow::new("ada@example.org", dec!(150));

        let err = guard(&ledger)
            .apply(StatusTransition::MarkSent, &[row.clone(), row])
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Ambiguous(_)));
    }
}

// ============================================================================
// Operator confirmation
// ============================================================================

mod confirmation_tests {
    use super::*;

    fn hopper_details() -> PreparedUsers {
        PreparedUsers::new(vec![NewUser {
            email: "grace@example.org".to_string(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            staff_subsidy_fraction: dec!(0.5),
            consumable_subsidy_fraction: dec!(0),
        }])
    }

    fn hopper_input() -> UsageInput {
        staff_input(vec![hours("Hopper_bioinf: Pipeline", 202201, dec!(10))])
    }

    #[tokio::test]
    async fn test_new_user_created_when_confirmed() {
        let ledger = InMemoryLedger::new();
        let engine = engine_with(
            &ledger,
            params(202201, 202201),
            Arc::new(AutoConfirm::new(AlwaysDecline)),
            hopper_details(),
        );

        let report = engine.run(&hopper_input()).await.unwrap();
        let invoice = only_reconciled(&report);
        assert_eq!(invoice.user.staff_subsidy.percent(), dec!(50));
        assert_eq!(invoice.invoice.amount_payable, Money::new(dec!(100)));
    }

    #[tokio::test]
    async fn test_declined_user_creation_is_a_user_failure() {
        let ledger = InMemoryLedger::new();
        let engine = engine_with(
            &ledger,
            params(202201, 202201),
            Arc::new(ScriptedConfirmation::new([false])),
            hopper_details(),
        );

        let report = engine.run(&hopper_input()).await.unwrap();
        assert!(report.failures[0].error.is_decline());
        assert!(ledger.snapshot().await.users.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_without_details() {
        let ledger = InMemoryLedger::new();
        let report = engine(&ledger, params(202201, 202201))
            .run(&hopper_input())
            .await
            .unwrap();
        assert!(matches!(report.failures[0].error, BillingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_similar_project_titles_always_ask() {
        let ledger = InMemoryLedger::with_users(vec![ada()]).await.unwrap();
        let input = staff_input(vec![
            hours("Lovelace_wetlab: Genome assembly", 202201, dec!(10)),
            hours("Lovelace_bioinf: Genome assembly 2", 202201, dec!(10)),
        ]);
        let scripted = Arc::new(ScriptedConfirmation::new([false]));
        let engine = engine_with(
            &ledger,
            params(202201, 202201),
            Arc::new(AutoConfirm::new(Arc::clone(&scripted))),
            PreparedUsers::default(),
        );

        let err = engine.run(&input).await.unwrap_err();
        assert!(err.is_decline());
        assert_eq!(scripted.asked().len(), 1);
        assert!(!scripted.asked()[0].may_auto_answer);
        assert!(ledger.snapshot().await.invoices.is_empty());
    }

    #[tokio::test]
    async fn test_similar_user_names_may_be_auto_confirmed() {
        let ledger = InMemoryLedger::with_users(vec![
            user("John", "Smith", "john@example.org"),
            user("Jane", "Smiths", "jane@example.org"),
        ])
        .await
        .unwrap();
        let input = staff_input(vec![
            hours("Smith_wetlab: Atlas", 202201, dec!(1)),
            hours("Smiths_training: Course", 202201, dec!(1)),
        ]);

        let report = engine(&ledger, params(202201, 202201)).run(&input).await.unwrap();
        assert_eq!(report.reconciled().count(), 2);
    }
}
