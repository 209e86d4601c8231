//! Reservation pricing
//!
//! Pure functions, no I/O. A window is billed in whole hours, rounded up, at
//! each locker's unit rate: its explicit price when set, otherwise the size
//! multiplier.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Locker;

const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Hours billed for `[start, end)`.
///
/// Any started hour counts in full; an empty or inverted window is 0.
pub fn billable_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let millis = (end - start).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    (millis + MILLIS_PER_HOUR - 1) / MILLIS_PER_HOUR
}

/// Per-hour rate of a locker
pub fn unit_rate(locker: &Locker) -> f64 {
    locker
        .price
        .unwrap_or_else(|| f64::from(locker.size.rate_multiplier()))
}

/// Price of one locker over `[start, end)`
pub fn locker_price(locker: &Locker, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    round_money(billable_hours(start, end) as f64 * unit_rate(locker))
}

/// Sum of every locker's price over the same window
pub fn total_price(lockers: &[Locker], start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    round_money(lockers.iter().map(|l| locker_price(l, start, end)).sum())
}

/// One line of a quote
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteLine {
    pub locker_id: i64,
    pub number: i64,
    pub unit_rate: f64,
    pub price: f64,
}

/// Price breakdown for a set of lockers over one window
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub hours: i64,
    pub lines: Vec<QuoteLine>,
    pub total_price: f64,
}

pub fn quote(lockers: &[Locker], start: DateTime<Utc>, end: DateTime<Utc>) -> Quote {
    let lines: Vec<QuoteLine> = lockers
        .iter()
        .map(|l| QuoteLine {
            locker_id: l.id,
            number: l.number,
            unit_rate: unit_rate(l),
            price: locker_price(l, start, end),
        })
        .collect();

    Quote {
        hours: billable_hours(start, end),
        total_price: round_money(lines.iter().map(|l| l.price).sum()),
        lines,
    }
}

/// Round to cents
pub fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LockerSize;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 5, 1, h, m, s).unwrap()
    }

    fn locker(id: i64, number: i64, size: LockerSize, price: Option<f64>) -> Locker {
        let mut l = Locker::new(number, size, price);
        l.id = id;
        l
    }

    #[test]
    fn test_billable_hours_rounds_up() {
        let start = at(10, 0, 0);
        assert_eq!(billable_hours(start, at(11, 0, 0)), 1);
        assert_eq!(billable_hours(start, at(11, 0, 1)), 2);
        assert_eq!(billable_hours(start, at(10, 0, 1)), 1);
        assert_eq!(billable_hours(start, start + Duration::milliseconds(1)), 1);
    }

    #[test]
    fn test_empty_or_inverted_window_is_free() {
        let start = at(10, 0, 0);
        assert_eq!(billable_hours(start, start), 0);
        assert_eq!(billable_hours(start, at(9, 0, 0)), 0);

        let l = locker(1, 1, LockerSize::Large, None);
        assert_eq!(locker_price(&l, start, start), 0.0);
    }

    #[test]
    fn test_medium_locker_three_hours_ten_minutes() {
        let l = locker(1, 12, LockerSize::Medium, None);
        let start = at(8, 0, 0);
        let end = start + Duration::hours(3) + Duration::minutes(10);

        assert_eq!(billable_hours(start, end), 4);
        assert_eq!(locker_price(&l, start, end), 8.0);
    }

    #[test]
    fn test_two_lockers_two_hours() {
        let lockers = vec![
            locker(1, 1, LockerSize::Small, None),
            locker(2, 2, LockerSize::Large, None),
        ];
        let start = at(8, 0, 0);
        let end = start + Duration::hours(2);

        assert_eq!(total_price(&lockers, start, end), 8.0);
    }

    #[test]
    fn test_explicit_price_overrides_size() {
        let l = locker(1, 3, LockerSize::Large, Some(2.25));
        let start = at(8, 0, 0);

        assert_eq!(unit_rate(&l), 2.25);
        assert_eq!(locker_price(&l, start, start + Duration::minutes(90)), 4.5);
    }

    #[test]
    fn test_quote_breakdown() {
        let lockers = vec![
            locker(10, 1, LockerSize::Small, None),
            locker(11, 2, LockerSize::Medium, Some(0.1)),
        ];
        let start = at(8, 0, 0);
        let q = quote(&lockers, start, start + Duration::hours(3));

        assert_eq!(q.hours, 3);
        assert_eq!(q.lines.len(), 2);
        assert_eq!(q.lines[0].locker_id, 10);
        assert_eq!(q.lines[0].price, 3.0);
        assert_eq!(q.lines[1].price, 0.3);
        assert_eq!(q.total_price, 3.3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Billed hours cover the window and never by a whole extra hour.
        #[test]
        fn billable_hours_is_tight_ceiling(secs in 1i64..(7 * 24 * 3600)) {
            let start = at(0, 0, 0);
            let hours = billable_hours(start, start + Duration::seconds(secs));

            prop_assert!(hours * 3600 >= secs);
            prop_assert!((hours - 1) * 3600 < secs);
        }

        /// Extending the window never lowers the total.
        #[test]
        fn total_is_monotonic_in_end(
            first in 1i64..(7 * 24 * 3600),
            extra in 0i64..(24 * 3600),
            explicit in proptest::option::of(0.0f64..50.0),
        ) {
            let start = at(0, 0, 0);
            let lockers = vec![
                locker(1, 1, LockerSize::Small, None),
                locker(2, 2, LockerSize::Large, explicit),
            ];
            let shorter = total_price(&lockers, start, start + Duration::seconds(first));
            let longer = total_price(&lockers, start, start + Duration::seconds(first + extra));

            prop_assert!(longer >= shorter);
        }
    }
}
