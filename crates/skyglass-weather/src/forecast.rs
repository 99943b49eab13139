//! Collapse sub-daily forecast entries into one entry per calendar day.

use std::collections::HashSet;

use crate::types::{ForecastEntry, RawForecastEntry};

impl From<RawForecastEntry> for ForecastEntry {
    fn from(raw: RawForecastEntry) -> Self {
        Self {
            date: raw.timestamp.date(),
            temperature: raw.temperature,
            high: raw.temp_max,
            low: raw.temp_min,
            condition: raw.condition,
        }
    }
}

/// Keep the first entry seen for each date, in input order.
///
/// Later entries for a date already kept are dropped, even when they fall
/// closer to midday.
pub fn reduce(raw: impl IntoIterator<Item = RawForecastEntry>) -> Vec<ForecastEntry> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|entry| seen.insert(entry.timestamp.date()))
        .map(ForecastEntry::from)
        .collect()
}
