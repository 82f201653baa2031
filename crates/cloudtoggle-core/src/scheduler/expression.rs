//! Schedule spec parsing.
//!
//! A spec is either a six-field cron expression (`sec min hour dom mon dow`)
//! or an `H:M` wall-clock time, which is shorthand for a daily expression.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::error::{Result, ToggleError};

const CRON_FIELDS: usize = 6;

/// Translate `H:M` into `"0 {M} {H} * * ?"`. Components are not zero-padded
/// in the output: `"09:05"` becomes `"0 5 9 * * ?"`.
pub fn time_to_cron(time: &str) -> Result<String> {
    let invalid = |why: &str| ToggleError::Validation(format!("invalid time '{time}': {why}"));

    let parts: Vec<&str> = time.trim().split(':').collect();
    if parts.len() != 2 {
        return Err(invalid("expected HH:MM"));
    }
    let number = |part: &str| -> Result<u32> {
        if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("hour and minute must be numeric"));
        }
        part.parse::<u32>()
            .map_err(|_| invalid("hour and minute must be numeric"))
    };
    let hour = number(parts[0])?;
    let minute = number(parts[1])?;
    if hour > 23 {
        return Err(invalid("hour must be 0-23"));
    }
    if minute > 59 {
        return Err(invalid("minute must be 0-59"));
    }
    Ok(format!("0 {minute} {hour} * * ?"))
}

/// A validated schedule spec.
#[derive(Debug, Clone)]
pub struct CronSpec {
    expression: String,
    schedule: Schedule,
}

impl CronSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let expression = if spec.contains(char::is_whitespace) {
            spec.split_whitespace().collect::<Vec<_>>().join(" ")
        } else {
            time_to_cron(spec)?
        };

        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != CRON_FIELDS {
            return Err(ToggleError::Validation(format!(
                "cron expression '{expression}' must have 6 fields (sec min hour dom mon dow)"
            )));
        }
        // `?` means "no specific value"; for evaluation that is the same as `*`.
        let normalized = fields
            .iter()
            .map(|f| if *f == "?" { "*" } else { f })
            .collect::<Vec<_>>()
            .join(" ");
        let schedule = Schedule::from_str(&normalized).map_err(|e| {
            ToggleError::Validation(format!("invalid cron expression '{expression}': {e}"))
        })?;

        Ok(Self {
            expression,
            schedule,
        })
    }

    /// The expression as registered (after `H:M` translation).
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`, evaluated in `tz`.
    pub fn next_after(&self, after: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&tz))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Parse an IANA timezone name such as `Europe/Berlin`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| ToggleError::Validation(format!("unknown timezone: {name}")))
}
