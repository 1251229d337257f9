//! Snooze durations and the pure math around them.
//!
//! Snooze length and friction countdown length are looked up from the same
//! table but are independent columns; the countdown is never derived from
//! the snooze length.

use chrono::{DateTime, Days, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::XtabError;

/// Countdown before a permanent disable is committed.
pub const PERMANENT_DISABLE_COUNTDOWN_SECS: u64 = 5;

/// Local hour at which an "until tomorrow" snooze ends.
pub const MORNING_HOUR: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnoozeDuration {
    FifteenMinutes,
    OneHour,
    FourHours,
    UntilTomorrow,
}

#[derive(Debug, Clone, Copy)]
struct SnoozeOption {
    code: &'static str,
    /// `None` means "next morning".
    minutes: Option<i64>,
    countdown_secs: u64,
    label: &'static str,
}

const FIFTEEN_MINUTES: SnoozeOption = SnoozeOption {
    code: "15",
    minutes: Some(15),
    countdown_secs: 15,
    label: "15 minutes",
};
const ONE_HOUR: SnoozeOption = SnoozeOption {
    code: "60",
    minutes: Some(60),
    countdown_secs: 60,
    label: "1 hour",
};
const FOUR_HOURS: SnoozeOption = SnoozeOption {
    code: "240",
    minutes: Some(240),
    countdown_secs: 240,
    label: "4 hours",
};
const UNTIL_TOMORROW: SnoozeOption = SnoozeOption {
    code: "tomorrow",
    minutes: None,
    countdown_secs: 300,
    label: "until tomorrow",
};

impl SnoozeDuration {
    pub const ALL: [SnoozeDuration; 4] = [
        SnoozeDuration::FifteenMinutes,
        SnoozeDuration::OneHour,
        SnoozeDuration::FourHours,
        SnoozeDuration::UntilTomorrow,
    ];

    fn option(self) -> &'static SnoozeOption {
        match self {
            SnoozeDuration::FifteenMinutes => &FIFTEEN_MINUTES,
            SnoozeDuration::OneHour => &ONE_HOUR,
            SnoozeDuration::FourHours => &FOUR_HOURS,
            SnoozeDuration::UntilTomorrow => &UNTIL_TOMORROW,
        }
    }

    /// Wire/storage code: `"15"`, `"60"`, `"240"` or `"tomorrow"`.
    pub fn code(self) -> &'static str {
        self.option().code
    }

    pub fn label(self) -> &'static str {
        self.option().label
    }

    /// Length of the friction countdown shown before this snooze is applied.
    pub fn countdown_secs(self) -> u64 {
        self.option().countdown_secs
    }

    /// Absolute instant at which a snooze started at `now` ends.
    pub fn end_time(self, now: &DateTime<FixedOffset>) -> DateTime<Utc> {
        match self.option().minutes {
            Some(minutes) => (*now + Duration::minutes(minutes)).with_timezone(&Utc),
            None => next_morning(now).with_timezone(&Utc),
        }
    }
}

impl fmt::Display for SnoozeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SnoozeDuration {
    type Err = XtabError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        SnoozeDuration::ALL
            .into_iter()
            .find(|duration| duration.code() == value)
            .ok_or_else(|| XtabError::UnknownSnoozeDuration(value.to_string()))
    }
}

/// 09:00 local on the calendar day after `now`.
///
/// Always the next day, even when `now` is before 09:00.
pub fn next_morning(now: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let morning = NaiveTime::from_hms_opt(MORNING_HOUR, 0, 0).unwrap_or(NaiveTime::MIN);
    now.date_naive()
        .checked_add_days(Days::new(1))
        .map(|tomorrow| tomorrow.and_time(morning))
        .and_then(|naive| now.offset().from_local_datetime(&naive).single())
        .unwrap_or_else(|| *now + Duration::days(1))
}

/// Human-readable remaining snooze time for the status indicator.
pub fn format_remaining(remaining: Duration) -> String {
    let total_minutes = remaining.num_minutes().max(0);
    let total_hours = total_minutes / 60;
    let days = total_hours / 24;

    if days > 0 {
        let hours = total_hours % 24;
        if hours > 0 {
            return format!("{}d {}h", days, hours);
        }
        return format!("{} day{}", days, plural(days));
    }
    if total_hours > 0 {
        let minutes = total_minutes % 60;
        if minutes > 0 {
            return format!("{}h {}m", total_hours, minutes);
        }
        return format!("{} hour{}", total_hours, plural(total_hours));
    }
    if total_minutes > 0 {
        return format!("{} minute{}", total_minutes, plural(total_minutes));
    }
    "less than a minute".to_string()
}

fn plural(count: i64) -> &'static str {
    if count > 1 {
        "s"
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    #[test]
    fn four_hour_snooze_is_exact_and_pairs_with_240_second_countdown() {
        let now = at("2024-03-05T13:20:00+00:00");
        let duration: SnoozeDuration = "240".parse().unwrap();

        assert_eq!(duration.end_time(&now), now + Duration::hours(4));
        assert_eq!(duration.countdown_secs(), 240);
    }

    #[test]
    fn tomorrow_before_nine_is_never_same_day() {
        let now = at("2024-03-05T08:00:00+01:00");
        let end = SnoozeDuration::UntilTomorrow.end_time(&now);

        assert_eq!(end, at("2024-03-06T09:00:00+01:00"));
        assert!(end - now.with_timezone(&Utc) >= Duration::hours(25));
    }

    #[test]
    fn tomorrow_after_nine_is_next_day() {
        let now = at("2024-03-05T22:30:00-05:00");
        assert_eq!(next_morning(&now), at("2024-03-06T09:00:00-05:00"));
    }

    #[test]
    fn tomorrow_crosses_month_boundary() {
        let now = at("2024-02-29T10:00:00+09:00");
        assert_eq!(next_morning(&now), at("2024-03-01T09:00:00+09:00"));
    }

    #[test]
    fn countdown_table_is_not_derived_from_length() {
        assert_eq!(SnoozeDuration::FifteenMinutes.countdown_secs(), 15);
        assert_eq!(SnoozeDuration::OneHour.countdown_secs(), 60);
        assert_eq!(SnoozeDuration::UntilTomorrow.countdown_secs(), 300);
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!("30".parse::<SnoozeDuration>().is_err());
        assert_eq!(
            "tomorrow".parse::<SnoozeDuration>().unwrap(),
            SnoozeDuration::UntilTomorrow
        );
    }

    #[test]
    fn formats_remaining_time_like_the_indicator() {
        assert_eq!(format_remaining(Duration::seconds(30)), "less than a minute");
        assert_eq!(format_remaining(Duration::minutes(1)), "1 minute");
        assert_eq!(format_remaining(Duration::minutes(14)), "14 minutes");
        assert_eq!(format_remaining(Duration::hours(1)), "1 hour");
        assert_eq!(format_remaining(Duration::minutes(150)), "2h 30m");
        assert_eq!(format_remaining(Duration::hours(24)), "1 day");
        assert_eq!(format_remaining(Duration::hours(49)), "2d 1h");
        assert_eq!(format_remaining(Duration::hours(48)), "2 days");
    }
}
