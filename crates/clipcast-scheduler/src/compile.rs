//! Schedule compilation: posting times → concrete fire specifications.

use chrono::{DateTime, Datelike, LocalResult, TimeZone, Utc};
use chrono_tz::Tz;
use clipcast_core::types::Account;

/// One compiled recurring trigger: a local time of day in an account's
/// timezone, optionally constrained to a weekday subset (0 = Sunday).
#[derive(Debug, Clone)]
pub struct FireSpec {
    pub account_id: String,
    pub hour: u32,
    pub minute: u32,
    pub weekdays: Option<Vec<u8>>,
    pub tz: Tz,
}

impl FireSpec {
    /// Human-readable form for logs and the registry listing.
    pub fn describe(&self) -> String {
        let days = match &self.weekdays {
            None => "daily".to_string(),
            Some(d) => format!("days {d:?}"),
        };
        format!("{:02}:{:02} {} ({})", self.hour, self.minute, self.tz, days)
    }

    fn day_allowed(&self, weekday: chrono::Weekday) -> bool {
        match &self.weekdays {
            None => true,
            Some(days) => days.contains(&(weekday.num_days_from_sunday() as u8)),
        }
    }

    /// Next UTC instant strictly after `after` at which this spec fires.
    /// Scans day by day in the account's timezone; a local time that
    /// does not exist (DST gap) skips to the next allowed day.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut day = after.with_timezone(&self.tz).date_naive();
        // 8 days covers any weekday subset.
        for _ in 0..8 {
            if self.day_allowed(day.weekday()) {
                let local = day.and_hms_opt(self.hour, self.minute, 0)?;
                let resolved = match self.tz.from_local_datetime(&local) {
                    LocalResult::Single(dt) => Some(dt),
                    LocalResult::Ambiguous(earliest, _) => Some(earliest),
                    LocalResult::None => None,
                };
                if let Some(dt) = resolved {
                    let utc = dt.with_timezone(&Utc);
                    if utc > after {
                        return Some(utc);
                    }
                }
            }
            day = day.succ_opt()?;
        }
        None
    }
}

/// Parse an "HH:MM" posting time.
fn parse_time(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

/// Compile one account's posting schedule. Malformed time entries are
/// logged and skipped without aborting the rest; an unknown timezone
/// drops the whole account's schedule (nothing sane to bind times to).
pub fn compile_schedule(account: &Account) -> Vec<FireSpec> {
    let schedule = &account.posting_schedule;

    let tz: Tz = match schedule.timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(
                "Account '{}': unknown timezone '{}', skipping schedule",
                account.slug,
                schedule.timezone
            );
            return Vec::new();
        }
    };

    let weekdays = schedule.active_days.as_ref().map(|days| {
        let valid: Vec<u8> = days.iter().copied().filter(|d| *d <= 6).collect();
        if valid.len() != days.len() {
            tracing::warn!("Account '{}': dropping out-of-range active days", account.slug);
        }
        valid
    });
    if weekdays.as_ref().is_some_and(|d| d.is_empty()) {
        tracing::warn!("Account '{}': empty active-day set, schedule never fires", account.slug);
    }

    let mut specs = Vec::new();
    for entry in &schedule.posting_times {
        match parse_time(entry) {
            Some((hour, minute)) => specs.push(FireSpec {
                account_id: account.id.clone(),
                hour,
                minute,
                weekdays: weekdays.clone(),
                tz,
            }),
            None => {
                tracing::warn!(
                    "Account '{}': malformed posting time '{}', skipped",
                    account.slug,
                    entry
                );
            }
        }
    }
    specs
}

/// UTC instant of the most recent local midnight in `tz`. Quota counts
/// reset here. The rare DST gap at midnight falls forward hour by hour.
pub fn local_day_start(tz: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.with_timezone(&tz).date_naive();
    for hour in 0..3 {
        if let Some(local) = date.and_hms_opt(hour, 0, 0) {
            if let Some(dt) = tz.from_local_datetime(&local).earliest() {
                return dt.with_timezone(&Utc);
            }
        }
    }
    // Unreachable for real timezones; fall back to a UTC day.
    now - chrono::Duration::hours(24)
}
