//! crates/reminders_core/src/recurrence.rs
//!
//! Calendar arithmetic for recurring reminders.

use crate::domain::{Frequency, RecurrenceRule};
use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};

/// What completing an overdue recurring reminder does with the missed periods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CatchUp {
    /// Advance exactly one period from the stored due date, even if the result is
    /// still in the past.
    #[default]
    OnePeriod,
    /// Keep advancing until the due date is strictly after "now".
    SkipMissed,
}

impl std::str::FromStr for CatchUp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one-period" | "one_period" => Ok(Self::OnePeriod),
            "skip-missed" | "skip_missed" => Ok(Self::SkipMissed),
            other => Err(format!("'{}' is not one of one-period, skip-missed", other)),
        }
    }
}

/// Adds one period of `rule` to `current`.
///
/// Months and years are calendar increments: a day-of-month that does not exist
/// in the target month is clamped to that month's last day. Returns `None` only
/// when the result is outside chrono's representable range.
pub fn next_occurrence(current: DateTime<Utc>, rule: &RecurrenceRule) -> Option<DateTime<Utc>> {
    let n = rule.interval.get();
    match rule.frequency {
        Frequency::Daily => current.checked_add_days(Days::new(u64::from(n))),
        Frequency::Weekly => current.checked_add_days(Days::new(7 * u64::from(n))),
        Frequency::Monthly => current.checked_add_months(Months::new(n)),
        Frequency::Yearly => current.checked_add_months(Months::new(n.checked_mul(12)?)),
    }
}

/// Computes the due date a recurring reminder moves to when it is completed.
pub fn advance(
    due_at: DateTime<Utc>,
    rule: &RecurrenceRule,
    catch_up: CatchUp,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let mut next = next_occurrence(due_at, rule)?;
    if catch_up == CatchUp::SkipMissed {
        while next <= now {
            next = next_occurrence(next, rule)?;
        }
    }
    Some(next)
}
