//! Recurrences for the two lifecycle tasks, expressed as cron schedules (UTC).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use thiserror::Error;

pub const DEFAULT_SWEEP_MINUTES: u32 = 30;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("unknown weekday `{0}` (expected Sun|Mon|Tue|Wed|Thu|Fri|Sat)")]
    UnknownWeekday(String),
    #[error("at least one weekday is required")]
    NoWeekdays,
    #[error("hour {0} is outside 0..=23")]
    InvalidHour(u32),
    #[error("invalid cron expression `{expression}`: {reason}")]
    InvalidExpression { expression: String, reason: String },
}

#[derive(Clone, Debug)]
pub struct Recurrence {
    expression: String,
    schedule: Schedule,
}

impl Recurrence {
    fn parse(expression: String) -> Result<Self, ScheduleError> {
        let schedule = Schedule::from_str(&expression).map_err(|error| {
            ScheduleError::InvalidExpression {
                expression: expression.clone(),
                reason: error.to_string(),
            }
        })?;
        Ok(Self { expression, schedule })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First firing strictly after `from`.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }
}

/// Weekly refresh on the listed days (comma separated, e.g. `Sun,Tue,Thu,Sat`)
/// at the top of `hour`.
pub fn token_refresh_recurrence(days: &str, hour: u32) -> Result<Recurrence, ScheduleError> {
    if hour > 23 {
        return Err(ScheduleError::InvalidHour(hour));
    }

    let mut normalized = Vec::new();
    for raw in days.split(',').map(str::trim).filter(|day| !day.is_empty()) {
        let day = WEEKDAYS
            .iter()
            .find(|known| known.eq_ignore_ascii_case(raw))
            .ok_or_else(|| ScheduleError::UnknownWeekday(raw.to_owned()))?;
        if !normalized.contains(day) {
            normalized.push(*day);
        }
    }
    if normalized.is_empty() {
        return Err(ScheduleError::NoWeekdays);
    }

    Recurrence::parse(format!("0 0 {hour} * * {}", normalized.join(",")))
}

pub fn suppression_sweep_recurrence(minutes: u32) -> Result<Recurrence, ScheduleError> {
    Recurrence::parse(format!("0 */{minutes} * * * *"))
}

/// Interval for the suppression sweep: 1..=59 minutes, anything else falls back
/// to [`DEFAULT_SWEEP_MINUTES`].
pub fn clamp_sweep_minutes(raw: &str) -> u32 {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|minutes| (1..=59).contains(minutes))
        .unwrap_or(DEFAULT_SWEEP_MINUTES)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{
        clamp_sweep_minutes, suppression_sweep_recurrence, token_refresh_recurrence,
        ScheduleError, DEFAULT_SWEEP_MINUTES,
    };

    #[test]
    fn sweep_interval_is_clamped_or_defaulted() {
        assert_eq!(clamp_sweep_minutes("15"), 15);
        assert_eq!(clamp_sweep_minutes(" 1 "), 1);
        assert_eq!(clamp_sweep_minutes("59"), 59);
        assert_eq!(clamp_sweep_minutes("0"), DEFAULT_SWEEP_MINUTES);
        assert_eq!(clamp_sweep_minutes("60"), DEFAULT_SWEEP_MINUTES);
        assert_eq!(clamp_sweep_minutes("-3"), DEFAULT_SWEEP_MINUTES);
        assert_eq!(clamp_sweep_minutes("half-hour"), DEFAULT_SWEEP_MINUTES);
        assert_eq!(clamp_sweep_minutes(""), DEFAULT_SWEEP_MINUTES);
    }

    #[test]
    fn token_refresh_fires_on_next_listed_day_at_noon() {
        let recurrence = token_refresh_recurrence("Sun,Tue,Thu,Sat", 12).expect("recurrence");
        assert_eq!(recurrence.expression(), "0 0 12 * * Sun,Tue,Thu,Sat");

        // 2026-03-02 is a Monday.
        let monday = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("timestamp");
        let next = recurrence.next_after(monday).expect("next firing");
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).single().expect("timestamp"));

        let sunday_morning = Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).single().expect("timestamp");
        let next = recurrence.next_after(sunday_morning).expect("next firing");
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("timestamp"));
    }

    #[test]
    fn token_refresh_rejects_unknown_days_and_hours() {
        assert_eq!(
            token_refresh_recurrence("Sun,Funday", 12).map(|_| ()),
            Err(ScheduleError::UnknownWeekday("Funday".to_owned()))
        );
        assert_eq!(token_refresh_recurrence(" , ", 12).map(|_| ()), Err(ScheduleError::NoWeekdays));
        assert_eq!(token_refresh_recurrence("Sun", 24).map(|_| ()), Err(ScheduleError::InvalidHour(24)));
    }

    #[test]
    fn sweep_recurrence_fires_on_minute_multiples() {
        let recurrence = suppression_sweep_recurrence(30).expect("recurrence");
        let from = Utc.with_ymd_and_hms(2026, 3, 2, 9, 7, 0).single().expect("timestamp");

        let first = recurrence.next_after(from).expect("next firing");
        assert_eq!(first, Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).single().expect("timestamp"));
        let second = recurrence.next_after(first).expect("next firing");
        assert_eq!(second, Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).single().expect("timestamp"));
    }
}
