use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tickd_core::{SchedulerError, SchedulerResult};
use tickd_domain::TimeBucket;

/// Parsed cron expression answering "does this fire at minute M?".
///
/// Standard 5-field expressions (minute, hour, day-of-month, month,
/// day-of-week) are normalized by prepending a zero seconds field;
/// 6/7-field expressions pass through unchanged.
pub struct CronMatcher {
    schedule: Schedule,
}

impl CronMatcher {
    pub fn new(expr: &str) -> SchedulerResult<Self> {
        let normalized = normalize(expr)?;
        let schedule = Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
            expr: expr.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { schedule })
    }

    /// Whether the expression fires in the given minute bucket. Pure and
    /// deterministic.
    pub fn matches(&self, bucket: &TimeBucket) -> bool {
        bucket
            .as_datetime()
            .map(|at| self.schedule.includes(at))
            .unwrap_or(false)
    }

    /// The next firing instant strictly after `from`.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }
}

fn normalize(expr: &str) -> SchedulerResult<String> {
    let trimmed = expr.trim();
    match trimmed.split_whitespace().count() {
        5 => Ok(format!("0 {trimmed}")),
        6 | 7 => Ok(trimmed.to_string()),
        n => Err(SchedulerError::InvalidCron {
            expr: expr.to_string(),
            message: format!("expected 5 to 7 fields, found {n}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tickd_domain::TimeBucket;

    use super::*;

    fn bucket(hour: u32, minute: u32) -> TimeBucket {
        TimeBucket::from_datetime(Utc.with_ymd_and_hms(2026, 6, 15, hour, minute, 30).unwrap())
    }

    #[test]
    fn every_minute_matches_any_bucket() {
        let matcher = CronMatcher::new("* * * * *").unwrap();
        assert!(matcher.matches(&bucket(0, 0)));
        assert!(matcher.matches(&bucket(13, 37)));
    }

    #[test]
    fn fixed_minute_only_matches_that_minute() {
        let matcher = CronMatcher::new("30 4 * * *").unwrap();
        assert!(matcher.matches(&bucket(4, 30)));
        assert!(!matcher.matches(&bucket(4, 31)));
        assert!(!matcher.matches(&bucket(5, 30)));
    }

    #[test]
    fn steps_ranges_and_lists_are_supported() {
        let steps = CronMatcher::new("*/15 * * * *").unwrap();
        assert!(steps.matches(&bucket(9, 0)));
        assert!(steps.matches(&bucket(9, 45)));
        assert!(!steps.matches(&bucket(9, 10)));

        let range = CronMatcher::new("0 9-17 * * *").unwrap();
        assert!(range.matches(&bucket(9, 0)));
        assert!(range.matches(&bucket(17, 0)));
        assert!(!range.matches(&bucket(18, 0)));

        let list = CronMatcher::new("5,35 * * * *").unwrap();
        assert!(list.matches(&bucket(2, 5)));
        assert!(list.matches(&bucket(2, 35)));
        assert!(!list.matches(&bucket(2, 20)));
    }

    #[test]
    fn six_field_expressions_pass_through() {
        let matcher = CronMatcher::new("0 */5 * * * *").unwrap();
        assert!(matcher.matches(&bucket(1, 0)));
        assert!(matcher.matches(&bucket(1, 55)));
        assert!(!matcher.matches(&bucket(1, 3)));
    }

    #[test]
    fn malformed_expressions_are_configuration_errors() {
        for expr in ["", "not a cron", "* * *", "99 * * * *", "* * * * * * * *"] {
            let result = CronMatcher::new(expr);
            assert!(
                matches!(result, Err(SchedulerError::InvalidCron { .. })),
                "expected InvalidCron for {expr:?}"
            );
        }
    }

    #[test]
    fn matches_is_idempotent() {
        let matcher = CronMatcher::new("*/10 * * * *").unwrap();
        let b = bucket(8, 20);
        let first = matcher.matches(&b);
        assert_eq!(matcher.matches(&b), first);
        assert_eq!(matcher.matches(&b), first);
    }

    #[test]
    fn next_after_advances_past_the_given_instant() {
        let matcher = CronMatcher::new("0 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 6, 15, 10, 30, 0).unwrap();
        let next = matcher.next_after(from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 6, 15, 11, 0, 0).unwrap());
    }
}
