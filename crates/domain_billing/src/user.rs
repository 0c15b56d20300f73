//! Facility users
//!
//! A user is the person invoices are addressed to. Each user carries two
//! subsidy rates: one for staff time and one for consumables.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use core_kernel::{SubsidyPercent, UserId};

use crate::error::BillingError;

/// A user stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Subsidy on staff-time charges
    pub staff_subsidy: SubsidyPercent,
    /// Subsidy on consumable charges
    pub consumable_subsidy: SubsidyPercent,
}

impl User {
    /// Name as printed on documents: `Last, First`
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }

    /// Last name with spaces replaced for use in file names
    pub fn file_last_name(&self) -> String {
        self.last_name.replace(' ', "_")
    }
}

/// Operator-supplied details for a user that is not yet in the ledger
///
/// Subsidies are entered as fractions (0.5 = 50%) and stored as percentages.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewUser {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub last_name: String,
    #[validate(custom(function = "validate_fraction"))]
    pub staff_subsidy_fraction: Decimal,
    #[validate(custom(function = "validate_fraction"))]
    pub consumable_subsidy_fraction: Decimal,
}

fn validate_fraction(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE {
        let mut error = ValidationError::new("fraction");
        error.message = Some("must be between 0 and 1".into());
        return Err(error);
    }
    Ok(())
}

impl NewUser {
    /// Validates the request and converts it into a storable record
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Validation` listing every failing field.
    pub fn into_record(self) -> Result<NewUserRecord, BillingError> {
        self.validate()
            .map_err(|e| BillingError::validation(format!("new user {}: {}", self.last_name, e)))?;

        Ok(NewUserRecord {
            staff_subsidy: SubsidyPercent::from_fraction(self.staff_subsidy_fraction)?,
            consumable_subsidy: SubsidyPercent::from_fraction(self.consumable_subsidy_fraction)?,
            email: self.email.trim().to_string(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
        })
    }
}

/// A validated user ready to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUserRecord {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub staff_subsidy: SubsidyPercent,
    pub consumable_subsidy: SubsidyPercent,
}

impl NewUserRecord {
    /// Summary shown to the operator before the user is created
    pub fn summary(&self) -> String {
        format!(
            "First name: {}\nLast name: {}\nEmail: {}\nStaff cost subsidy: {}\nConsumable cost subsidy: {}",
            self.first_name, self.last_name, self.email, self.staff_subsidy, self.consumable_subsidy
        )
    }
}

/// Source of details for users that must be created during a run
pub trait NewUserSource: Send + Sync {
    /// Returns details for a user with the given last name, or `None` if
    /// the operator cannot supply them
    fn details_for(&self, last_name: &str) -> Option<NewUser>;
}

/// A fixed set of prepared user details, keyed by last name
#[derive(Debug, Clone, Default)]
pub struct PreparedUsers {
    users: Vec<NewUser>,
}

impl PreparedUsers {
    pub fn new(users: Vec<NewUser>) -> Self {
        Self { users }
    }
}

impl NewUserSource for PreparedUsers {
    fn details_for(&self, last_name: &str) -> Option<NewUser> {
        self.users
            .iter()
            .find(|u| u.last_name.trim() == last_name)
            .cloned()
    }
}
