//! Usage input and its normalisation
//!
//! Usage arrives as monthly staff hours per project and optional consumable
//! purchases. Projects are named by an identity string:
//!
//! ```text
//! <Last_Name>_<type>: <title>
//! Van_der_Berg_wetlab: Single-cell atlas
//! ```
//!
//! The owner's last name is everything before the final underscore of the
//! part before the first colon, with underscores read as spaces.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use strsim::normalized_levenshtein;

use core_kernel::{BillingMonth, BillingPeriod, Money};

use crate::error::BillingError;
use crate::project::ProjectType;
use crate::user::NewUser;

/// Similarity at or above which two names are reported as near-duplicates
///
/// Measured with `strsim::normalized_levenshtein`: one minus the edit
/// distance divided by the longer name's length. At 0.8, two ten-letter
/// names match when they differ by at most two edits.
pub const SIMILARITY_CUTOFF: f64 = 0.8;

/// Largest gross amount a single staff or consumable line may reach
pub const MAX_LINE_AMOUNT: Decimal = dec!(1000000000000);

/// Raw usage for one billing run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageInput {
    #[serde(default)]
    pub staff_hours: Vec<StaffHoursRow>,
    #[serde(default)]
    pub consumables: Vec<ConsumableRow>,
    /// Details for users that may need to be created during the run
    #[serde(default)]
    pub new_users: Vec<NewUser>,
}

/// Hours booked on one project in one month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffHoursRow {
    pub project: String,
    pub month: BillingMonth,
    pub hours: Decimal,
}

/// One consumable purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumableRow {
    pub project: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: Decimal,
    pub reference: String,
    pub date: UsageDate,
}

/// When a consumable was completed
///
/// Either a `YYYYMM` month or a facility export stamp `DD/MM/YYYY[ HH:MM]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UsageDate {
    Month(BillingMonth),
    Stamp(String),
}

impl UsageDate {
    /// The billing month the date falls in
    pub fn month(&self) -> Result<BillingMonth, BillingError> {
        match self {
            UsageDate::Month(month) => Ok(*month),
            UsageDate::Stamp(stamp) => {
                let day = stamp.split_whitespace().next().unwrap_or_default();
                let date = NaiveDate::parse_from_str(day, "%d/%m/%Y").map_err(|_| {
                    BillingError::validation(format!(
                        "consumable date '{}' is not in DD/MM/YYYY format",
                        stamp
                    ))
                })?;
                Ok(BillingMonth::from_date(date)?)
            }
        }
    }
}

/// Parsed form of a project identity string
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ProjectIdentity {
    pub last_name: String,
    pub project_type: ProjectType,
    pub title: String,
}

impl FromStr for ProjectIdentity {
    type Err = BillingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (head, title) = raw.split_once(':').ok_or_else(|| {
            BillingError::validation(format!("project '{}' has no ':' before its title", raw))
        })?;
        let (owner, kind) = head.trim().rsplit_once('_').ok_or_else(|| {
            BillingError::validation(format!("project '{}' has no '_<type>' after the owner", raw))
        })?;
        let title = title.trim();
        if owner.is_empty() || title.is_empty() {
            return Err(BillingError::validation(format!(
                "project '{}' must name an owner and a title",
                raw
            )));
        }

        Ok(Self {
            last_name: owner.replace('_', " "),
            project_type: kind.parse()?,
            title: title.to_string(),
        })
    }
}

/// True if the identity's owner part marks a facility-internal project
pub fn is_internal(raw: &str, marker: &str) -> bool {
    let head = raw.split(':').next().unwrap_or_default();
    head.to_lowercase().contains(&marker.to_lowercase())
}

/// Staff hours for one project summed over the billing period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectHours {
    pub identity: ProjectIdentity,
    pub hours: Decimal,
}

/// A consumable purchase within the billing period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumableUsage {
    pub identity: ProjectIdentity,
    pub name: String,
    pub unit_cost: Money,
    pub quantity: Decimal,
    pub reference: String,
    pub month: BillingMonth,
}

/// Everything one user is billed for in the period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUsage {
    pub last_name: String,
    pub projects: Vec<ProjectHours>,
    pub consumables: Vec<ConsumableUsage>,
}

/// Validated usage grouped by user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalisedUsage {
    pub period: BillingPeriod,
    /// Users to invoice, ordered by last name
    pub users: Vec<UserUsage>,
    /// Distinct project titles seen in the staff hours
    pub project_titles: Vec<String>,
}

impl NormalisedUsage {
    pub fn last_names(&self) -> Vec<String> {
        self.users.iter().map(|u| u.last_name.clone()).collect()
    }
}

/// Validates raw usage and groups it by user
///
/// Facility-internal rows (owner containing `internal_marker`) are dropped.
/// Every month of the period must appear in the staff hours; projects with
/// no hours in the period are left out. When `user_filter` is given, only
/// the named users are kept (underscores read as spaces) and each must be
/// present in the input.
///
/// # Errors
///
/// Returns `BillingError::Validation` for malformed identities or dates,
/// negative quantities, hours that cannot be summed, missing months, or
/// filtered users absent from the input.
pub fn normalise(
    input: &UsageInput,
    period: BillingPeriod,
    internal_marker: &str,
    user_filter: Option<&[String]>,
) -> Result<NormalisedUsage, BillingError> {
    let staff_rows: Vec<&StaffHoursRow> = input
        .staff_hours
        .iter()
        .filter(|row| !is_internal(&row.project, internal_marker))
        .collect();

    let present: BTreeSet<BillingMonth> = staff_rows.iter().map(|row| row.month).collect();
    let missing: Vec<String> = period
        .months()
        .into_iter()
        .filter(|m| !present.contains(m))
        .map(|m| m.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(BillingError::validation(format!(
            "the following months are missing from the staff hours input: {}",
            missing.join(", ")
        )));
    }

    let mut hours: BTreeMap<ProjectIdentity, Decimal> = BTreeMap::new();
    let mut titles = BTreeSet::new();
    for row in &staff_rows {
        if row.hours.is_sign_negative() && !row.hours.is_zero() {
            return Err(BillingError::validation(format!(
                "negative hours {} for '{}' in {}",
                row.hours, row.project, row.month
            )));
        }
        let identity: ProjectIdentity = row.project.parse()?;
        titles.insert(identity.title.clone());
        let total = hours.entry(identity).or_insert(Decimal::ZERO);
        if period.contains(row.month) {
            *total = total.checked_add(row.hours).ok_or_else(|| {
                BillingError::validation(format!(
                    "hours for '{}' in {} are too large to add up",
                    row.project, row.month
                ))
            })?;
        }
    }

    let mut consumables = Vec::new();
    for row in &input.consumables {
        if is_internal(&row.project, internal_marker) {
            continue;
        }
        let month = row.date.month()?;
        if !period.contains(month) {
            continue;
        }
        if row.unit_price.is_sign_negative() || row.quantity.is_sign_negative() {
            return Err(BillingError::validation(format!(
                "consumable '{}' ({}) has a negative price or quantity",
                row.name, row.reference
            )));
        }
        consumables.push(ConsumableUsage {
            identity: row.project.parse()?,
            name: row.name.clone(),
            unit_cost: Money::new(row.unit_price),
            quantity: row.quantity,
            reference: row.reference.clone(),
            month,
        });
    }

    let mut by_user: BTreeMap<String, UserUsage> = BTreeMap::new();
    for (identity, total) in hours.into_iter().filter(|(_, h)| !h.is_zero()) {
        user_entry(&mut by_user, &identity.last_name)
            .projects
            .push(ProjectHours { identity, hours: total });
    }
    for consumable in consumables {
        user_entry(&mut by_user, &consumable.identity.last_name)
            .consumables
            .push(consumable);
    }

    if let Some(filter) = user_filter {
        let wanted: BTreeSet<String> = filter.iter().map(|n| n.trim().replace('_', " ")).collect();
        let absent: Vec<&String> = wanted.iter().filter(|n| !by_user.contains_key(*n)).collect();
        if !absent.is_empty() {
            return Err(BillingError::validation(format!(
                "the following users were not found in the usage input: {:?}",
                absent
            )));
        }
        by_user.retain(|name, _| wanted.contains(name));
    }

    Ok(NormalisedUsage {
        period,
        users: by_user.into_values().collect(),
        project_titles: titles.into_iter().collect(),
    })
}

/// Checks that every line's gross amount stays within [`MAX_LINE_AMOUNT`]
///
/// # Errors
///
/// Returns `BillingError::Validation` naming the first project or
/// consumable whose hours at `hourly_rate`, or quantity at unit cost,
/// exceed the bound.
pub fn check_line_amounts(usage: &NormalisedUsage, hourly_rate: Money) -> Result<(), BillingError> {
    let within = |gross: Option<Money>| gross.map_or(false, |g| g.amount() <= MAX_LINE_AMOUNT);

    for user in &usage.users {
        for project in &user.projects {
            if !within(hourly_rate.checked_multiply(project.hours)) {
                return Err(BillingError::validation(format!(
                    "{} hours on '{}' of {} at {} exceed the largest chargeable amount",
                    project.hours, project.identity.title, user.last_name, hourly_rate
                )));
            }
        }
        for consumable in &user.consumables {
            if !within(consumable.unit_cost.checked_multiply(consumable.quantity)) {
                return Err(BillingError::validation(format!(
                    "consumable '{}' ({}) of {}: {} at {} exceeds the largest chargeable amount",
                    consumable.name, consumable.reference, user.last_name, consumable.quantity, consumable.unit_cost
                )));
            }
        }
    }
    Ok(())
}

fn user_entry<'a>(by_user: &'a mut BTreeMap<String, UserUsage>, last_name: &str) -> &'a mut UserUsage {
    by_user
        .entry(last_name.to_string())
        .or_insert_with(|| UserUsage {
            last_name: last_name.to_string(),
            projects: Vec::new(),
            consumables: Vec::new(),
        })
}

/// Names in `candidates` (other than `name` itself) similar to `name`
pub fn close_matches(name: &str, candidates: &[String], cutoff: f64) -> Vec<String> {
    candidates
        .iter()
        .filter(|c| c.as_str() != name)
        .filter(|c| normalized_levenshtein(name, c) >= cutoff)
        .cloned()
        .collect()
}

/// Every name that has near-duplicates, with its matches
pub fn similar_names(names: &[String]) -> Vec<(String, Vec<String>)> {
    names
        .iter()
        .filter_map(|name| {
            let matches = close_matches(name, names, SIMILARITY_CUTOFF);
            (!matches.is_empty()).then(|| (name.clone(), matches))
        })
        .collect()
}
