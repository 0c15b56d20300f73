//! Strongly-typed identifiers for ledger records
//!
//! Ledger rows are keyed by store-assigned integers. Wrapping them in
//! newtypes prevents accidentally passing a project id where an invoice id
//! is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a store-assigned row id
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the underlying row id
            pub const fn value(&self) -> i64 {
                self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(raw.parse()?))
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

define_id!(UserId, "USR");
define_id!(ProjectId, "PRJ");
define_id!(InvoiceId, "INV");
define_id!(StaffChargeId, "CHG");
define_id!(ConsumableChargeId, "CON");
define_id!(CreditDebitId, "CRD");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_id_display() {
        let id = InvoiceId::new(42);
        assert_eq!(id.to_string(), "INV-42");
    }

    #[test]
    fn test_id_parsing() {
        let original = UserId::new(7);
        let parsed: UserId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);

        let bare: UserId = "7".parse().unwrap();
        assert_eq!(bare, original);
    }

    #[test]
    fn test_i64_conversion() {
        let id = ProjectId::from(13);
        let back: i64 = id.into();
        assert_eq!(back, 13);
    }
}
