use chrono::{DateTime, Days, NaiveDateTime, Utc};

use crate::model::{Frequency, RepeatEvery};

/// Notification backends refuse cadences shorter than a minute.
pub const MIN_REPEAT_SECS: u64 = 60;

const DAYS_PER_WEEK: u32 = 7;

/// When a reminder fires next and how often it repeats afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPlan {
    pub next_trigger_at: DateTime<Utc>,
    pub repeat_every_secs: u64,
}

/// Length of one watering cycle in days. A weekly rule with seven or more
/// waterings collapses to a daily cycle.
pub fn cycle_days(frequency: &Frequency) -> u32 {
    match frequency.repeat_every {
        RepeatEvery::Day => 1,
        RepeatEvery::Week => (DAYS_PER_WEEK / frequency.times.max(1)).max(1),
    }
}

/// Absolute time of the next reminder.
///
/// Weekly rules land `cycle_days` after today at the chosen time of day.
/// Daily rules fire the day after the chosen moment at the same time,
/// whatever `times` says. Either way the result is strictly after `now`.
///
/// Returns `None` when the result falls outside the representable calendar.
pub fn compute_next_trigger(
    now: DateTime<Utc>,
    chosen_time_of_day: DateTime<Utc>,
    frequency: &Frequency,
) -> Option<DateTime<Utc>> {
    let time_of_day = chosen_time_of_day.time();
    let anchor = match frequency.repeat_every {
        RepeatEvery::Week => now
            .date_naive()
            .checked_add_days(Days::new(u64::from(cycle_days(frequency))))?,
        RepeatEvery::Day => {
            // A chosen moment already in the past still yields tomorrow.
            let day = chosen_time_of_day.date_naive().max(now.date_naive());
            day.checked_add_days(Days::new(1))?
        }
    };
    Some(NaiveDateTime::new(anchor, time_of_day).and_utc())
}

/// Seconds between `now` and `next`, never less than [`MIN_REPEAT_SECS`].
pub fn repeat_interval_secs(now: DateTime<Utc>, next: DateTime<Utc>) -> u64 {
    let secs = (next - now).num_seconds().unsigned_abs();
    secs.max(MIN_REPEAT_SECS)
}

pub fn plan_trigger(
    now: DateTime<Utc>,
    chosen_time_of_day: DateTime<Utc>,
    frequency: &Frequency,
) -> Option<TriggerPlan> {
    let next_trigger_at = compute_next_trigger(now, chosen_time_of_day, frequency)?;
    Some(TriggerPlan {
        next_trigger_at,
        repeat_every_secs: repeat_interval_secs(now, next_trigger_at),
    })
}
