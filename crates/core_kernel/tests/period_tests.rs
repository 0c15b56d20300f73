//! Unit tests for billing months and periods

use chrono::NaiveDate;
use core_kernel::{BillingMonth, BillingPeriod, PeriodError};

fn month(v: u32) -> BillingMonth {
    BillingMonth::from_yyyymm(v).unwrap()
}

mod billing_month {
    use super::*;

    #[test]
    fn test_from_date() {
        let date = NaiveDate::from_ymd_opt(2022, 3, 17).unwrap();
        assert_eq!(BillingMonth::from_date(date).unwrap(), month(202203));
    }

    #[test]
    fn test_display_is_zero_padded() {
        assert_eq!(BillingMonth::new(2023, 1).unwrap().to_string(), "202301");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            "20221".parse::<BillingMonth>(),
            Err(PeriodError::InvalidFormat(_))
        ));
        assert_eq!(
            "202200".parse::<BillingMonth>(),
            Err(PeriodError::InvalidMonth(0))
        );
        assert_eq!(
            BillingMonth::new(1999, 5),
            Err(PeriodError::YearTooEarly(1999))
        );
    }

    #[test]
    fn test_serde_uses_integer_form() {
        let json = serde_json::to_string(&month(202207)).unwrap();
        assert_eq!(json, "202207");
        let back: BillingMonth = serde_json::from_str("202207").unwrap();
        assert_eq!(back, month(202207));
        assert!(serde_json::from_str::<BillingMonth>("202214").is_err());
    }
}

mod billing_period {
    use super::*;

    #[test]
    fn test_single_month_period() {
        let period = BillingPeriod::single(month(202205));
        assert_eq!(period.months(), vec![month(202205)]);
        assert_eq!(period.to_string(), "202205-202205");
    }

    #[test]
    fn test_contains() {
        let period = BillingPeriod::new(month(202201), month(202203)).unwrap();
        assert!(period.contains(month(202201)));
        assert!(period.contains(month(202203)));
        assert!(!period.contains(month(202204)));
        assert!(!period.contains(month(202112)));
    }

    #[test]
    fn test_overlap_is_interval_overlap() {
        let existing = BillingPeriod::new(month(202202), month(202204)).unwrap();
        // starts before the existing period and ends inside it
        let earlier = BillingPeriod::new(month(202201), month(202202)).unwrap();
        // fully inside
        let inner = BillingPeriod::single(month(202203));
        let disjoint = BillingPeriod::new(month(202205), month(202212)).unwrap();

        assert!(existing.overlaps(&earlier));
        assert!(existing.overlaps(&inner));
        assert!(!existing.overlaps(&disjoint));
    }

    #[test]
    fn test_reversed_period_error() {
        let err = BillingPeriod::new(month(202204), month(202201)).unwrap_err();
        assert!(matches!(err, PeriodError::Reversed { .. }));
    }
}
