//! Cron expression parser
//!
//! Supports standard 5-field cron syntax:
//! ```text
//! ┌───────────── minute (0-59)
//! │ ┌───────────── hour (0-23)
//! │ │ ┌───────────── day of month (1-31)
//! │ │ │ ┌───────────── month (1-12)
//! │ │ │ │ ┌───────────── day of week (0-6, 0=Sunday)
//! │ │ │ │ │
//! * * * * *
//! ```
//!
//! plus `*`, `,`, `-`, `/` and the descriptors `@yearly`, `@annually`,
//! `@monthly`, `@weekly`, `@daily`, `@midnight`, `@hourly`.
//!
//! Months and weekdays also accept case-insensitive names (`JAN`, `mon-fri`),
//! and `?` stands in for `*` in both day fields. When day-of-month and
//! day-of-week are both restricted, a time matches if either one does.

use crate::error::{BotError, Result};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use std::collections::BTreeSet;

/// A parsed cron schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    expression: String,
    minutes: BTreeSet<u32>,
    hours: BTreeSet<u32>,
    days: BTreeSet<u32>,
    months: BTreeSet<u32>,
    weekdays: BTreeSet<u32>,
    days_any: bool,
    weekdays_any: bool,
}

const MONTH_NAMES: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Bounds and accepted spellings of one cron field
struct Field {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    allow_question: bool,
}

const MINUTE: Field = Field {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    allow_question: false,
};
const HOUR: Field = Field {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    allow_question: false,
};
const DAY: Field = Field {
    name: "day",
    min: 1,
    max: 31,
    names: &[],
    allow_question: true,
};
const MONTH: Field = Field {
    name: "month",
    min: 1,
    max: 12,
    names: MONTH_NAMES,
    allow_question: false,
};
const WEEKDAY: Field = Field {
    name: "weekday",
    min: 0,
    max: 6,
    names: WEEKDAY_NAMES,
    allow_question: true,
};

/// Longest month length, counting February as 29 days
fn max_days_in_month(month: u32) -> u32 {
    match month {
        2 => 29,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn expand_descriptor(expression: &str) -> Option<&'static str> {
    match expression {
        "@yearly" | "@annually" => Some("0 0 1 1 *"),
        "@monthly" => Some("0 0 1 * *"),
        "@weekly" => Some("0 0 * * 0"),
        "@daily" | "@midnight" => Some("0 0 * * *"),
        "@hourly" => Some("0 * * * *"),
        _ => None,
    }
}

impl CronExpression {
    /// Parse a cron expression
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let fields = if trimmed.starts_with('@') {
            expand_descriptor(trimmed).ok_or_else(|| {
                BotError::InvalidCron(format!("unknown descriptor '{}'", trimmed))
            })?
        } else {
            trimmed
        };

        let parts: Vec<&str> = fields.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(BotError::InvalidCron(format!(
                "expected 5 fields in '{}', got {}",
                expression,
                parts.len()
            )));
        }

        let (minutes, _) = parse_field(parts[0], &MINUTE)?;
        let (hours, _) = parse_field(parts[1], &HOUR)?;
        let (days, days_any) = parse_field(parts[2], &DAY)?;
        let (months, _) = parse_field(parts[3], &MONTH)?;
        let (weekdays, weekdays_any) = parse_field(parts[4], &WEEKDAY)?;

        // With a restricted weekday the two day fields are OR'd, so the
        // weekday alone can still fire
        if weekdays_any
            && !days
                .iter()
                .any(|day| months.iter().any(|month| *day <= max_days_in_month(*month)))
        {
            return Err(BotError::InvalidCron(format!(
                "day-of-month never occurs in the listed months in '{}'",
                expression
            )));
        }

        Ok(Self {
            expression: expression.to_string(),
            minutes,
            hours,
            days,
            months,
            weekdays,
            days_any,
            weekdays_any,
        })
    }

    /// The expression as written
    pub fn as_str(&self) -> &str {
        &self.expression
    }

    /// First matching minute strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let next = after + Duration::minutes(1);
        let mut current = Utc
            .with_ymd_and_hms(
                next.year(),
                next.month(),
                next.day(),
                next.hour(),
                next.minute(),
                0,
            )
            .single()?;

        // Four years covers every combination, leap days included
        let max_iterations = 4 * 366 * 24 * 60;
        for _ in 0..max_iterations {
            if self.matches(&current) {
                return Some(current);
            }
            current += Duration::minutes(1);
        }
        None
    }

    pub fn matches(&self, dt: &DateTime<Utc>) -> bool {
        let day = self.days.contains(&dt.day());
        let weekday = self.weekdays.contains(&dt.weekday().num_days_from_sunday());
        let day_matches = if self.days_any || self.weekdays_any {
            day && weekday
        } else {
            day || weekday
        };

        self.minutes.contains(&dt.minute())
            && self.hours.contains(&dt.hour())
            && self.months.contains(&dt.month())
            && day_matches
    }
}

fn parse_number(value: &str, name: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| BotError::InvalidCron(format!("invalid value '{}' in {}", value, name)))
}

fn parse_value(value: &str, field: &Field) -> Result<u32> {
    match field
        .names
        .iter()
        .position(|known| known.eq_ignore_ascii_case(value))
    {
        Some(index) => Ok(field.min + index as u32),
        None => parse_number(value, field.name),
    }
}

/// Expand one field into its values, and whether any part was `*` or `?`
fn parse_field(raw: &str, field: &Field) -> Result<(BTreeSet<u32>, bool)> {
    let mut values = BTreeSet::new();
    let mut any = false;

    for part in raw.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step = parse_number(step, field.name)?;
                if step == 0 {
                    return Err(BotError::InvalidCron(format!(
                        "step cannot be 0 in {}",
                        field.name
                    )));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" || (field.allow_question && range == "?") {
            any = true;
            (field.min, field.max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (parse_value(lo, field)?, parse_value(hi, field)?)
        } else {
            let value = parse_value(range, field)?;
            (value, value)
        };

        if start < field.min || end > field.max || start > end {
            return Err(BotError::InvalidCron(format!(
                "range {}-{} outside {}-{} in {}",
                start, end, field.min, field.max, field.name
            )));
        }

        values.extend((start..=end).step_by(step as usize));
    }

    Ok((values, any))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_minute() {
        let expr = CronExpression::parse("* * * * *").unwrap();
        assert_eq!(expr.minutes.len(), 60);
        assert_eq!(expr.weekdays.len(), 7);
    }

    #[test]
    fn test_parse_step_range_list() {
        let expr = CronExpression::parse("0-30/10 9-11 * * 1,3,5").unwrap();
        assert_eq!(expr.minutes, BTreeSet::from([0, 10, 20, 30]));
        assert_eq!(expr.hours, BTreeSet::from([9, 10, 11]));
        assert_eq!(expr.weekdays, BTreeSet::from([1, 3, 5]));
    }

    #[test]
    fn test_parse_descriptor() {
        let expr = CronExpression::parse("@hourly").unwrap();
        assert_eq!(expr.minutes, BTreeSet::from([0]));
        assert_eq!(expr.hours.len(), 24);
        assert_eq!(expr.as_str(), "@hourly");
        assert!(CronExpression::parse("@fortnightly").is_err());
    }

    #[test]
    fn test_parse_invalid() {
        for bad in [
            "* * *",
            "60 * * * *",
            "30-10 * * * *",
            "*/0 * * * *",
            "a * * * *",
            "",
            "1,,2 * * * *",
            "? * * * *",
            "0 8 * JANUARY *",
            "0 8 * * MON-XYZ",
        ] {
            assert!(
                matches!(CronExpression::parse(bad), Err(BotError::InvalidCron(_))),
                "expected '{}' to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_next_after() {
        let expr = CronExpression::parse("30 14 * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 2, 5, 10, 0, 0).unwrap();
        let next = expr.next_after(now).unwrap();
        assert_eq!((next.day(), next.hour(), next.minute()), (5, 14, 30));

        let now = Utc.with_ymd_and_hms(2026, 2, 5, 15, 0, 0).unwrap();
        let next = expr.next_after(now).unwrap();
        assert_eq!((next.day(), next.hour(), next.minute()), (6, 14, 30));
    }

    #[test]
    fn test_matches_weekday() {
        let expr = CronExpression::parse("30 14 * * 1").unwrap();
        // Feb 2, 2026 is a Monday
        assert!(expr.matches(&Utc.with_ymd_and_hms(2026, 2, 2, 14, 30, 0).unwrap()));
        assert!(!expr.matches(&Utc.with_ymd_and_hms(2026, 2, 3, 14, 30, 0).unwrap()));
    }

    #[test]
    fn test_parse_names() {
        let expr = CronExpression::parse("0 8 * * MON-FRI").unwrap();
        assert_eq!(expr.weekdays, BTreeSet::from([1, 2, 3, 4, 5]));

        let expr = CronExpression::parse("0 8 1 JAN *").unwrap();
        assert_eq!(expr.months, BTreeSet::from([1]));

        let expr = CronExpression::parse("0 8 * jan,Dec sat,sun").unwrap();
        assert_eq!(expr.months, BTreeSet::from([1, 12]));
        assert_eq!(expr.weekdays, BTreeSet::from([0, 6]));
    }

    #[test]
    fn test_weekday_names_fire_on_weekdays() {
        let expr = CronExpression::parse("0 8 * * MON-FRI").unwrap();
        // Friday Feb 6 -> Monday Feb 9, 2026
        let friday = Utc.with_ymd_and_hms(2026, 2, 6, 9, 0, 0).unwrap();
        let next = expr.next_after(friday).unwrap();
        assert_eq!((next.day(), next.hour(), next.minute()), (9, 8, 0));
    }

    #[test]
    fn test_question_mark_in_day_fields() {
        let expr = CronExpression::parse("0 8 ? * 1").unwrap();
        assert_eq!(expr.days.len(), 31);
        assert!(expr.matches(&Utc.with_ymd_and_hms(2026, 2, 2, 8, 0, 0).unwrap()));
        assert!(!expr.matches(&Utc.with_ymd_and_hms(2026, 2, 3, 8, 0, 0).unwrap()));

        let expr = CronExpression::parse("0 8 15 * ?").unwrap();
        assert!(expr.matches(&Utc.with_ymd_and_hms(2026, 2, 15, 8, 0, 0).unwrap()));
        assert!(!expr.matches(&Utc.with_ymd_and_hms(2026, 2, 16, 8, 0, 0).unwrap()));
    }

    #[test]
    fn test_restricted_day_fields_match_either() {
        let expr = CronExpression::parse("0 8 1 * 1").unwrap();
        // Monday, not the 1st
        assert!(expr.matches(&Utc.with_ymd_and_hms(2026, 2, 2, 8, 0, 0).unwrap()));
        // The 1st, a Sunday
        assert!(expr.matches(&Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()));
        // Tuesday the 3rd
        assert!(!expr.matches(&Utc.with_ymd_and_hms(2026, 2, 3, 8, 0, 0).unwrap()));
    }

    #[test]
    fn test_star_day_field_keeps_both_required() {
        let expr = CronExpression::parse("0 8 */2 * 1").unwrap();
        // Monday Feb 2 is an even day, Monday Feb 9 is odd
        assert!(!expr.matches(&Utc.with_ymd_and_hms(2026, 2, 2, 8, 0, 0).unwrap()));
        assert!(expr.matches(&Utc.with_ymd_and_hms(2026, 2, 9, 8, 0, 0).unwrap()));
        // Odd day, not a Monday
        assert!(!expr.matches(&Utc.with_ymd_and_hms(2026, 2, 3, 8, 0, 0).unwrap()));
    }

    #[test]
    fn test_rejects_days_missing_from_every_month() {
        for bad in ["0 0 31 2 *", "0 0 30 2 *", "0 0 31 4,6 *", "0 0 30,31 FEB ?"] {
            assert!(
                matches!(CronExpression::parse(bad), Err(BotError::InvalidCron(_))),
                "expected '{}' to be rejected",
                bad
            );
        }

        // Leap day, one listed day that fits, or a weekday that can still fire
        for good in ["0 0 29 2 *", "0 0 30,31 2,4 *", "0 0 31 2 1"] {
            assert!(CronExpression::parse(good).is_ok(), "expected '{}' to parse", good);
        }
        let next = CronExpression::parse("0 0 30,31 2,4 *")
            .unwrap()
            .next_after(Utc.with_ymd_and_hms(2026, 2, 5, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!((next.month(), next.day()), (4, 30));
    }
}
