//! Job schedule expressions.
//!
//! Accepted syntax:
//! - `@every <n><unit>` with unit `ms`, `s`, `m`, `h` (e.g. `@every 5m`)
//! - descriptors `@yearly`, `@monthly`, `@weekly`, `@daily`, `@hourly`
//! - cron expressions with 5 fields (minute precision) or 6-7 fields
//!   (leading seconds, optional trailing year)
//!
//! Parsing is eager so a malformed schedule is rejected at registration.
//! Intervals are capped at [`MAX_INTERVAL`].

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::SchedulerError;

/// Longest accepted `@every` interval (366 days).
pub const MAX_INTERVAL: Duration = Duration::from_secs(366 * 24 * 3600);

/// A parsed, validated schedule.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Fixed interval between fires.
    Every(Duration),
    /// Calendar schedule.
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    /// Parse and validate an expression.
    ///
    /// # Errors
    /// Returns [`SchedulerError::InvalidSchedule`] for malformed input.
    pub fn parse(expression: &str) -> Result<Self, SchedulerError> {
        let expr = expression.trim();
        let invalid = |reason: String| SchedulerError::InvalidSchedule {
            expression: expression.to_string(),
            reason,
        };

        if let Some(rest) = expr.strip_prefix("@every") {
            let interval = parse_interval(rest.trim()).map_err(invalid)?;
            return Ok(Self::Every(interval));
        }

        let cron_expr = match expr {
            "@yearly" | "@annually" => "0 0 0 1 1 *".to_string(),
            "@monthly" => "0 0 0 1 * *".to_string(),
            "@weekly" => "0 0 0 * * Sun".to_string(),
            "@daily" | "@midnight" => "0 0 0 * * *".to_string(),
            "@hourly" => "0 0 * * * *".to_string(),
            other if other.starts_with('@') => {
                return Err(invalid(format!("unknown descriptor '{other}'")));
            }
            other => match other.split_whitespace().count() {
                5 => format!("0 {other}"),
                6 | 7 => other.to_string(),
                n => return Err(invalid(format!("expected 5-7 fields, got {n}"))),
            },
        };

        cron::Schedule::from_str(&cron_expr)
            .map(|s| Self::Cron(Box::new(s)))
            .map_err(|e| invalid(e.to_string()))
    }

    /// Next fire time strictly after `after`, `None` when it falls outside
    /// the representable calendar.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Every(interval) => chrono::Duration::from_std(*interval)
                .ok()
                .and_then(|step| after.checked_add_signed(step)),
            Self::Cron(schedule) => schedule.after(&after).next(),
        }
    }
}

fn parse_interval(raw: &str) -> Result<Duration, String> {
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("interval '{raw}' is missing a unit"))?;
    let (amount, unit) = raw.split_at(split);
    let amount: u64 = amount
        .parse()
        .map_err(|_| format!("interval '{raw}' must start with a number"))?;
    if amount == 0 {
        return Err("interval must be greater than zero".to_string());
    }
    let millis_per_unit: u64 = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        other => return Err(format!("unknown interval unit '{other}'")),
    };
    amount
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .filter(|interval| *interval <= MAX_INTERVAL)
        .ok_or_else(|| {
            let max_days = MAX_INTERVAL.as_secs() / 86_400;
            format!("interval '{raw}' exceeds the {max_days} day maximum")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_every_intervals() {
        assert!(matches!(Schedule::parse("@every 5m"), Ok(Schedule::Every(d)) if d == Duration::from_secs(300)));
        assert!(matches!(Schedule::parse("@every 250ms"), Ok(Schedule::Every(d)) if d == Duration::from_millis(250)));
        assert!(Schedule::parse("@every 0s").is_err());
        assert!(Schedule::parse("@every 5").is_err());
        assert!(Schedule::parse("@every fast").is_err());
        assert!(Schedule::parse("@every 3d").is_err());
    }

    #[test]
    fn test_oversized_intervals_rejected() {
        assert!(Schedule::parse("@every 18446744073709551615m").is_err());
        assert!(Schedule::parse("@every 18446744073709551615ms").is_err());
        assert!(Schedule::parse("@every 1000000000000h").is_err());
        assert!(Schedule::parse("@every 8785h").is_err());
        assert!(matches!(Schedule::parse("@every 8784h"), Ok(Schedule::Every(d)) if d == MAX_INTERVAL));
    }

    #[test]
    fn test_next_after_out_of_calendar_is_none() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let far = Schedule::Every(Duration::from_secs(1_000_000_000_000 * 3600));
        assert_eq!(far.next_after(start), None);
        assert_eq!(Schedule::Every(Duration::MAX).next_after(start), None);
    }

    #[test]
    fn test_five_field_cron_gets_seconds() {
        let schedule = Schedule::parse("*/15 * * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 7, 30).unwrap();
        let next = schedule.next_after(start).unwrap();
        assert_eq!((next.hour(), next.minute(), next.second()), (10, 15, 0));
    }

    #[test]
    fn test_descriptors() {
        let schedule = Schedule::parse("@hourly").unwrap();
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 7, 30).unwrap();
        assert_eq!(schedule.next_after(start).unwrap().hour(), 11);
        assert!(Schedule::parse("@sometimes").is_err());
    }

    #[test]
    fn test_malformed_cron_rejected() {
        assert!(Schedule::parse("not a schedule").is_err());
        assert!(Schedule::parse("61 * * * *").is_err());
        assert!(Schedule::parse("").is_err());
    }

    #[test]
    fn test_every_next_after() {
        let schedule = Schedule::parse("@every 30s").unwrap();
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(start).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 30).unwrap()
        );
    }
}
