use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;

pub const VISIBLE_BUCKETS: u32 = 3;
const DAY_KEY_FORMAT: &str = "%a %b %d %Y";

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Zone whose calendar days define bucket boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayZone {
    #[default]
    Local,
    Named(Tz),
}

impl DayZone {
    pub fn parse(name: Option<&str>) -> Result<Self, String> {
        match name.map(str::trim).filter(|value| !value.is_empty()) {
            None => Ok(Self::Local),
            Some(value) if value.eq_ignore_ascii_case("local") => Ok(Self::Local),
            Some(value) => value
                .parse::<Tz>()
                .map(Self::Named)
                .map_err(|error| format!("unknown timezone '{value}': {error}")),
        }
    }

    fn calendar_date(self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Local => instant.with_timezone(&Local).date_naive(),
            Self::Named(tz) => instant.with_timezone(&tz).date_naive(),
        }
    }
}

/// Canonical key of the calendar day `offset_days` after `now` in `zone`.
pub fn day_key_at(now: DateTime<Utc>, zone: DayZone, offset_days: u32) -> String {
    let date = zone.calendar_date(now);
    let shifted = date
        .checked_add_days(Days::new(u64::from(offset_days)))
        .unwrap_or(date);
    format_day_key(shifted)
}

/// Key of the calendar day `offset_days` from now in the system zone.
pub fn day_key(offset_days: u32) -> String {
    day_key_at(Utc::now(), DayZone::Local, offset_days)
}

pub fn format_day_key(date: NaiveDate) -> String {
    date.format(DAY_KEY_FORMAT).to_string()
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DayBucket {
    pub offset: u32,
    pub label: String,
    pub key: String,
}

#[derive(Clone)]
pub struct DayScheduler {
    zone: DayZone,
    now_provider: NowProvider,
}

impl std::fmt::Debug for DayScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DayScheduler").field("zone", &self.zone).finish()
    }
}

impl DayScheduler {
    pub fn new(zone: DayZone) -> Self {
        Self {
            zone,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn day_key(&self, offset_days: u32) -> String {
        day_key_at((self.now_provider)(), self.zone, offset_days)
    }

    pub fn today(&self) -> String {
        self.day_key(0)
    }

    pub fn visible_buckets(&self) -> Vec<DayBucket> {
        let now = (self.now_provider)();
        let today = self.zone.calendar_date(now);
        (0..VISIBLE_BUCKETS)
            .map(|offset| {
                let date = today
                    .checked_add_days(Days::new(u64::from(offset)))
                    .unwrap_or(today);
                let label = match offset {
                    0 => "Today".to_string(),
                    1 => "Tomorrow".to_string(),
                    _ => date.format("%A").to_string(),
                };
                DayBucket {
                    offset,
                    label,
                    key: format_day_key(date),
                }
            })
            .collect()
    }
}

impl Default for DayScheduler {
    fn default() -> Self {
        Self::new(DayZone::Local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn fixed_scheduler(value: &'static str, zone: DayZone) -> DayScheduler {
        DayScheduler::new(zone).with_now_provider(Arc::new(move || fixed_time(value)))
    }

    #[test]
    fn day_key_matches_widget_date_string() {
        let key = day_key_at(fixed_time("2026-02-16T09:00:00Z"), DayZone::Named(Tz::UTC), 0);
        assert_eq!(key, "Mon Feb 16 2026");
        let padded = day_key_at(fixed_time("2026-03-05T09:00:00Z"), DayZone::Named(Tz::UTC), 0);
        assert_eq!(padded, "Thu Mar 05 2026");
    }

    #[test]
    fn keys_for_three_offsets_are_distinct() {
        let scheduler = fixed_scheduler("2026-02-27T23:30:00Z", DayZone::Named(Tz::UTC));
        let keys = (0..3).map(|offset| scheduler.day_key(offset)).collect::<Vec<_>>();
        assert_eq!(keys, vec!["Fri Feb 27 2026", "Sat Feb 28 2026", "Sun Mar 01 2026"]);
    }

    #[test]
    fn key_is_stable_across_the_same_calendar_day() {
        let zone = DayZone::Named(Tz::UTC);
        let morning = day_key_at(fixed_time("2026-02-16T00:00:00Z"), zone, 1);
        let night = day_key_at(fixed_time("2026-02-16T23:59:59Z"), zone, 1);
        assert_eq!(morning, night);
        assert_ne!(morning, day_key_at(fixed_time("2026-02-17T00:00:00Z"), zone, 1));
    }

    #[test]
    fn named_zone_moves_the_day_boundary() {
        let instant = fixed_time("2026-02-16T20:00:00Z");
        let tokyo = DayZone::parse(Some("Asia/Tokyo")).expect("valid zone");
        assert_eq!(day_key_at(instant, tokyo, 0), "Tue Feb 17 2026");
        assert_eq!(day_key_at(instant, DayZone::Named(Tz::UTC), 0), "Mon Feb 16 2026");
    }

    #[test]
    fn parse_zone_handles_local_and_unknown_names() {
        assert_eq!(DayZone::parse(None), Ok(DayZone::Local));
        assert_eq!(DayZone::parse(Some("  ")), Ok(DayZone::Local));
        assert_eq!(DayZone::parse(Some("local")), Ok(DayZone::Local));
        assert!(DayZone::parse(Some("Mars/Olympus")).is_err());
    }

    #[test]
    fn visible_buckets_label_third_day_by_weekday() {
        let scheduler = fixed_scheduler("2026-02-19T12:00:00Z", DayZone::Named(Tz::UTC));
        let buckets = scheduler.visible_buckets();
        let labels = buckets.iter().map(|bucket| bucket.label.as_str()).collect::<Vec<_>>();
        assert_eq!(labels, vec!["Today", "Tomorrow", "Saturday"]);
        assert_eq!(buckets[0].key, scheduler.today());
        assert_eq!(buckets[2].key, scheduler.day_key(2));
    }

    #[test]
    fn system_zone_keys_are_repeatable() {
        assert_eq!(day_key(0), day_key(0));
        assert_ne!(day_key(0), day_key(1));
        assert_ne!(day_key(1), day_key(2));
    }
}
