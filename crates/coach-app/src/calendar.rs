// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use time::{Date, Duration};

pub const WEEK_DAYS: u32 = 7;
pub const MAX_HORIZON_DAYS: u32 = 31;

/// How many consecutive days a templated batch of tasks covers, starting today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    Week,
    UntilSunday,
    Days(u32),
}

impl Horizon {
    pub fn days(self, today: Date) -> u32 {
        match self {
            Self::Week => WEEK_DAYS,
            Self::UntilSunday => days_until_sunday(today) + 1,
            Self::Days(days) => days.clamp(1, MAX_HORIZON_DAYS),
        }
    }

    pub fn dates(self, today: Date) -> Vec<Date> {
        (0..self.days(today))
            .map(|offset| today + Duration::days(i64::from(offset)))
            .collect()
    }
}

/// Days left after `today` in its Monday-based week; 0 on Sunday.
pub fn days_until_sunday(today: Date) -> u32 {
    let weekday = i32::from(today.weekday().number_days_from_monday());
    (6 - weekday).rem_euclid(7) as u32
}

/// First and last day (Monday, Sunday) of the week containing `today`.
pub fn week_bounds(today: Date) -> (Date, Date) {
    let start = today - Duration::days(i64::from(today.weekday().number_days_from_monday()));
    (start, start + Duration::days(6))
}

#[cfg(test)]
mod tests {
    use super::{Horizon, days_until_sunday, week_bounds};
    use time::{Date, Month, Weekday};

    fn date(day: u8) -> Date {
        // October 2026: the 14th is a Wednesday, the 18th a Sunday.
        Date::from_calendar_date(2026, Month::October, day).expect("valid date")
    }

    #[test]
    fn until_sunday_counts_today() {
        assert_eq!(date(14).weekday(), Weekday::Wednesday);
        assert_eq!(days_until_sunday(date(14)), 4);
        assert_eq!(Horizon::UntilSunday.days(date(14)), 5);

        assert_eq!(date(18).weekday(), Weekday::Sunday);
        assert_eq!(Horizon::UntilSunday.days(date(18)), 1);

        assert_eq!(Horizon::UntilSunday.days(date(12)), 7);
    }

    #[test]
    fn horizon_dates_are_consecutive_from_today() {
        let dates = Horizon::UntilSunday.dates(date(14));
        assert_eq!(
            dates,
            vec![date(14), date(15), date(16), date(17), date(18)]
        );
        assert_eq!(Horizon::Week.dates(date(18)).len(), 7);
    }

    #[test]
    fn explicit_day_counts_are_clamped() {
        assert_eq!(Horizon::Days(0).days(date(14)), 1);
        assert_eq!(Horizon::Days(400).days(date(14)), 31);
    }

    #[test]
    fn week_bounds_start_on_monday() {
        assert_eq!(week_bounds(date(14)), (date(12), date(18)));
        assert_eq!(week_bounds(date(12)), (date(12), date(18)));
        assert_eq!(week_bounds(date(18)), (date(12), date(18)));
    }
}
