//! Unit tests for the Money module
//!
//! Tests cover money creation, arithmetic, rounding for documents
//! and subsidy percentages.

use core_kernel::{Money, MoneyError, SubsidyPercent};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

mod creation {
    use super::*;

    #[test]
    fn test_new_rounds_to_four_decimal_places() {
        let m = Money::new(dec!(100.123456789));
        assert_eq!(m.amount(), dec!(100.1235));
    }

    #[test]
    fn test_zero_creates_zero_amount() {
        assert!(Money::zero().is_zero());
        assert_eq!(Money::default(), Money::zero());
    }

    #[test]
    fn test_negative_amount_creation() {
        let m = Money::new(dec!(-12.50));
        assert!(m.is_negative());
        assert!(!m.is_positive());
    }
}

mod arithmetic {
    use super::*;

    #[test]
    fn test_sum_of_line_items() {
        let items = vec![
            Money::new(dec!(150.00)),
            Money::new(dec!(37.50)),
            Money::new(dec!(12.25)),
        ];
        let total: Money = items.iter().sum();
        assert_eq!(total.amount(), dec!(199.75));
    }

    #[test]
    fn test_checked_multiply_overflow() {
        let rate = Money::new(dec!(20));
        assert_eq!(rate.checked_multiply(dec!(10)), Some(Money::new(dec!(200))));
        assert_eq!(rate.checked_multiply(Decimal::MAX), None);
    }

    #[test]
    fn test_multiply_by_hours() {
        let rate = Money::new(dec!(20));
        assert_eq!((rate * dec!(10)).amount(), dec!(200));
        assert_eq!(rate.multiply(dec!(2.5)).amount(), dec!(50));
    }

    #[test]
    fn test_sub_assign_reduces_balance() {
        let mut balance = Money::new(dec!(150));
        balance -= Money::new(dec!(80));
        assert_eq!(balance.amount(), dec!(70));
    }

    #[test]
    fn test_min_picks_smaller() {
        let credit = Money::new(dec!(500));
        let balance = Money::new(dec!(150));
        assert_eq!(credit.min(balance), balance);
        assert_eq!(balance.min(credit), balance);
    }
}

mod formatting {
    use super::*;

    #[test]
    fn test_two_dp_pads_and_rounds() {
        assert_eq!(Money::new(dec!(70)).to_two_dp(), "70.00");
        assert_eq!(Money::new(dec!(1.005)).to_two_dp(), "1.01");
        assert_eq!(Money::new(dec!(-0.5)).to_two_dp(), "-0.50");
    }

    #[test]
    fn test_display_includes_euro_sign() {
        assert_eq!(Money::new(dec!(12.3)).to_string(), "€ 12.30");
    }

    #[test]
    fn test_serializes_as_plain_decimal() {
        let json = serde_json::to_string(&Money::new(dec!(12.5))).unwrap();
        assert_eq!(json, "\"12.5\"");
    }
}

mod subsidy {
    use super::*;

    #[test]
    fn test_fraction_is_stored_as_percentage() {
        let s = SubsidyPercent::from_fraction(dec!(0.5)).unwrap();
        assert_eq!(s.percent(), dec!(50));
        assert_eq!(s.to_string(), "50.00");
    }

    #[test]
    fn test_fraction_out_of_range_rejected() {
        assert_eq!(
            SubsidyPercent::from_fraction(dec!(1.01)),
            Err(MoneyError::InvalidFraction(dec!(1.01)))
        );
        assert!(SubsidyPercent::from_fraction(dec!(-0.1)).is_err());
    }

    #[test]
    fn test_percentage_bounds() {
        assert!(SubsidyPercent::new(dec!(0)).is_ok());
        assert!(SubsidyPercent::new(dec!(100)).is_ok());
        assert!(matches!(
            SubsidyPercent::new(dec!(100.01)),
            Err(MoneyError::InvalidPercentage(_))
        ));
    }

    #[test]
    fn test_staff_charge_example() {
        // 10 hours at 20/hour with a 25% subsidy
        let gross = Money::new(dec!(20)).multiply(dec!(10));
        let subsidy = SubsidyPercent::new(dec!(25)).unwrap();

        assert_eq!(gross.amount(), dec!(200));
        assert_eq!(subsidy.subsidy_on(gross).amount(), dec!(50));
        assert_eq!(subsidy.subtotal_of(gross).amount(), dec!(150));
    }

    #[test]
    fn test_full_subsidy_leaves_nothing_payable() {
        let subsidy = SubsidyPercent::new(dec!(100)).unwrap();
        assert!(subsidy.subtotal_of(Money::new(dec!(99.99))).is_zero());
    }

    #[test]
    fn test_deserialize_rejects_out_of_range() {
        let ok: SubsidyPercent = serde_json::from_str("\"30\"").unwrap();
        assert_eq!(ok.percent(), Decimal::from(30));
        assert!(serde_json::from_str::<SubsidyPercent>("\"130\"").is_err());
    }
}
