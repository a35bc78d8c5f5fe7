// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use time::Date;
use time::macros::format_description;

use crate::{CoachError, CoachResult};

pub const DATE_LAYOUT: &str = "YYYY-MM-DD";

pub fn parse_required_date(field: &str, input: &str) -> CoachResult<Date> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CoachError::validation(format!("{field} is required")));
    }
    parse_date(trimmed).ok_or_else(|| {
        CoachError::validation(format!("{field} must be a date like {DATE_LAYOUT}"))
    })
}

pub fn parse_optional_date(field: &str, input: &str) -> CoachResult<Option<Date>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    parse_required_date(field, trimmed).map(Some)
}

pub fn format_date(value: Date) -> String {
    value
        .format(&format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| value.to_string())
}

fn parse_date(input: &str) -> Option<Date> {
    Date::parse(input, &format_description!("[year]-[month]-[day]")).ok()
}

/// Serializes a [`Date`] as `YYYY-MM-DD`.
pub mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use time::Date;

    pub fn serialize<S>(value: &Date, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_date(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Date, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(raw.trim())
            .ok_or_else(|| de::Error::custom(format!("invalid date {raw:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::{format_date, parse_optional_date, parse_required_date};
    use time::{Date, Month};

    #[test]
    fn parse_required_date_trims_input() {
        let cases = [("2025-06-11", "2025-06-11"), (" 2025-06-11 ", "2025-06-11")];
        for (input, expected) in cases {
            let got = parse_required_date("due date", input).expect("date should parse");
            assert_eq!(format_date(got), expected, "input={input}");
        }
    }

    #[test]
    fn parse_required_date_rejects_blank_and_garbage() {
        for input in ["", "   ", "06/11/2025", "2025-13-01"] {
            assert!(
                parse_required_date("due date", input).is_err(),
                "input={input:?}"
            );
        }
    }

    #[test]
    fn parse_optional_date_allows_blank() {
        assert_eq!(parse_optional_date("target date", "  ").expect("blank ok"), None);
        assert_eq!(
            parse_optional_date("target date", "2026-03-01").expect("valid date"),
            Some(Date::from_calendar_date(2026, Month::March, 1).expect("valid date"))
        );
    }
}
