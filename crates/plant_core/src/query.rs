use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{PlantId, PlantRecord};
use crate::store::StoreEntry;

/// Pseudo-environment that matches every plant.
pub const ALL_ENVIRONMENTS: &str = "all";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlantView {
    pub record: PlantRecord,
    /// `HH:MM` of the next reminder.
    pub hour: String,
}

/// Summary line for the plant that is due first.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Headline {
    pub plant_id: PlantId,
    pub plant_name: String,
    pub relative: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PlantList {
    pub plants: Vec<PlantView>,
    pub headline: Option<Headline>,
}

impl PlantList {
    pub fn is_empty(&self) -> bool {
        self.plants.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &PlantRecord> {
        self.plants.iter().map(|view| &view.record)
    }
}

/// Earliest due first; ties fall back to the id.
pub fn due_order(a: &PlantRecord, b: &PlantRecord) -> Ordering {
    a.next_trigger_at
        .cmp(&b.next_trigger_at)
        .then_with(|| a.id().cmp(b.id()))
}

pub fn project(entries: Vec<StoreEntry>, now: DateTime<Utc>, environment: Option<&str>) -> PlantList {
    let mut records: Vec<PlantRecord> = entries
        .into_iter()
        .map(|entry| entry.record)
        .filter(|record| match environment {
            None | Some(ALL_ENVIRONMENTS) => true,
            Some(env) => record.plant.in_environment(env),
        })
        .collect();
    records.sort_by(due_order);

    let headline = records.first().map(|first| {
        let relative = format_relative(first.next_trigger_at, now);
        Headline {
            plant_id: first.id().clone(),
            plant_name: first.name().to_string(),
            message: format!("Don't forget to water the {} {}", first.name(), relative),
            relative,
        }
    });

    let plants = records
        .into_iter()
        .map(|record| PlantView {
            hour: record.next_trigger_at.format("%H:%M").to_string(),
            record,
        })
        .collect();

    PlantList { plants, headline }
}

/// Human label for how far `due` is from `now`, e.g. `in 3 hours`.
pub fn format_relative(due: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (due - now).num_seconds();
    let distance = describe_distance(secs.unsigned_abs());
    if secs >= 0 {
        format!("in {distance}")
    } else {
        format!("{distance} ago")
    }
}

fn describe_distance(secs: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;
    const MONTH: u64 = 30 * DAY;
    const YEAR: u64 = 365 * DAY;

    if secs < MINUTE {
        return "less than a minute".to_string();
    }
    // The unit is chosen after rounding, so 59.5 minutes reads as an hour.
    let steps = [
        (MINUTE, "minute", 60),
        (HOUR, "hour", 24),
        (DAY, "day", 30),
        (MONTH, "month", 12),
    ];
    let (amount, unit) = steps
        .into_iter()
        .map(|(size, unit, next_after)| (rounded(secs, size), unit, next_after))
        .find(|&(amount, _, next_after)| amount < next_after)
        .map(|(amount, unit, _)| (amount, unit))
        .unwrap_or_else(|| (rounded(secs, YEAR), "year"));
    if amount == 1 {
        format!("1 {unit}")
    } else {
        format!("{amount} {unit}s")
    }
}

fn rounded(secs: u64, unit: u64) -> u64 {
    ((secs + unit / 2) / unit).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Frequency, Plant};
    use crate::notifications::NotificationHandle;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap()
    }

    fn entry(id: &str, due: DateTime<Utc>, environments: &[&str]) -> StoreEntry {
        StoreEntry {
            record: PlantRecord::new(
                Plant {
                    id: PlantId::new(id),
                    name: format!("Plant {id}"),
                    about: String::new(),
                    water_tips: String::new(),
                    photo: String::new(),
                    environments: environments.iter().map(|e| e.to_string()).collect(),
                    frequency: Frequency::weekly(1),
                },
                due,
            ),
            notification_handle: NotificationHandle::new(format!("h-{id}")),
        }
    }

    #[test]
    fn sorts_by_due_time_then_id() {
        let now = base();
        let entries = vec![
            entry("a", now + Duration::hours(1), &[]),
            entry("c", now + Duration::hours(3), &[]),
            entry("b", now + Duration::hours(2), &[]),
            entry("0", now + Duration::hours(2), &[]),
        ];
        let list = project(entries, now, None);
        let ids: Vec<&str> = list.records().map(|r| r.id().as_str()).collect();
        assert_eq!(ids, vec!["a", "0", "b", "c"]);
    }

    #[test]
    fn headline_names_earliest_plant() {
        let now = base();
        let entries = vec![
            entry("late", now + Duration::days(2), &[]),
            entry("soon", now + Duration::hours(3), &[]),
        ];
        let list = project(entries, now, None);
        let headline = list.headline.expect("headline present");
        assert_eq!(headline.plant_id.as_str(), "soon");
        assert_eq!(headline.relative, "in 3 hours");
        assert_eq!(headline.message, "Don't forget to water the Plant soon in 3 hours");
        assert_eq!(list.plants[0].hour, "11:00");
    }

    #[test]
    fn empty_store_has_no_headline() {
        let list = project(Vec::new(), base(), None);
        assert!(list.is_empty());
        assert!(list.headline.is_none());
    }

    #[test]
    fn filters_by_environment() {
        let now = base();
        let entries = vec![
            entry("1", now + Duration::hours(1), &["kitchen"]),
            entry("2", now + Duration::hours(2), &["bedroom", "kitchen"]),
            entry("3", now + Duration::hours(3), &["bedroom"]),
        ];
        let bedroom = project(entries.clone(), now, Some("bedroom"));
        let ids: Vec<&str> = bedroom.records().map(|r| r.id().as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert_eq!(
            bedroom.headline.map(|h| h.plant_id),
            Some(PlantId::new("2"))
        );

        assert_eq!(project(entries, now, Some(ALL_ENVIRONMENTS)).plants.len(), 3);
    }

    #[test]
    fn relative_labels() {
        let now = base();
        let cases = [
            (Duration::seconds(20), "in less than a minute"),
            (Duration::minutes(1), "in 1 minute"),
            (Duration::minutes(44), "in 44 minutes"),
            (Duration::minutes(90), "in 2 hours"),
            (Duration::hours(3), "in 3 hours"),
            (Duration::days(1), "in 1 day"),
            (Duration::days(6), "in 6 days"),
            (Duration::days(60), "in 2 months"),
            (Duration::days(400), "in 1 year"),
            (Duration::hours(-5), "5 hours ago"),
            (Duration::minutes(59) + Duration::seconds(30), "in 1 hour"),
            (Duration::hours(23) + Duration::minutes(45), "in 1 day"),
            (Duration::days(29) + Duration::hours(20), "in 1 month"),
            (Duration::days(364), "in 1 year"),
        ];
        for (offset, expected) in cases {
            assert_eq!(format_relative(now + offset, now), expected);
        }
    }
}
