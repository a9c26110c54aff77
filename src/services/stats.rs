//! Per-sensor statistics, always computed from the current store contents.

use crate::store::{ReadingStore, ReadingSummary};
use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Averages {
    pub temperature: f64,
    pub pressure: f64,
    pub humidity: f64,
    pub gas_composition: f64,
    pub noise_level: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimeRange {
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Stats {
    pub averages: Averages,
    pub total_records: u64,
    pub time_range: TimeRange,
}

impl From<ReadingSummary> for Stats {
    fn from(s: ReadingSummary) -> Self {
        Stats {
            averages: Averages {
                temperature: s.temperature.unwrap_or(0.0),
                pressure: s.pressure.unwrap_or(0.0),
                humidity: s.humidity.unwrap_or(0.0),
                gas_composition: s.gas_composition.unwrap_or(0.0),
                noise_level: s.noise_level.unwrap_or(0.0),
            },
            total_records: s.total_records,
            time_range: TimeRange {
                first: s.first,
                last: s.last,
            },
        }
    }
}

/// Never fails: unknown sensors and read errors both give the zeroed shape.
pub fn statistics(store: &dyn ReadingStore, sensor_id: i32) -> Stats {
    match store.summarize(sensor_id) {
        Ok(summary) => Stats::from(summary),
        Err(e) => {
            warn!("Statistics for sensor {} unavailable: {}", sensor_id, e);
            Stats::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Measurements;
    use crate::store::memory::MemoryStore;
    use chrono::Duration;

    fn reading(t: f64, noise: f64) -> Measurements {
        Measurements {
            temperature: t,
            pressure: 100.0,
            humidity: 40.0,
            gas_composition: 500.0,
            noise_level: noise,
        }
    }

    #[test]
    fn unknown_sensor_yields_zeroed_stats() {
        let store = MemoryStore::new();
        let stats = statistics(&store, 42);
        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.averages, Averages::default());
        assert_eq!(stats.time_range, TimeRange { first: None, last: None });
    }

    #[test]
    fn averages_and_range_cover_all_rows_of_the_sensor() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let early = now - Duration::days(40);
        store.append(2, early, &reading(18.0, 30.0)).unwrap();
        store.append(2, now, &reading(22.0, 50.0)).unwrap();
        store.append(3, now, &reading(99.0, 99.0)).unwrap();

        let stats = statistics(&store, 2);
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.averages.temperature, 20.0);
        assert_eq!(stats.averages.noise_level, 40.0);
        assert_eq!(stats.averages.pressure, 100.0);
        assert_eq!(stats.time_range.first, Some(early));
        assert_eq!(stats.time_range.last, Some(now));
    }

    #[test]
    fn reflects_store_state_at_call_time() {
        let store = MemoryStore::new();
        store.append(1, Utc::now(), &reading(20.0, 10.0)).unwrap();
        assert_eq!(statistics(&store, 1).total_records, 1);
        store.delete_all().unwrap();
        assert_eq!(statistics(&store, 1), Stats::default());
    }

    #[test]
    fn read_failure_degrades_to_zeroed_stats() {
        let store = MemoryStore::new();
        store.append(1, Utc::now(), &reading(20.0, 10.0)).unwrap();
        store.set_unavailable(true);
        assert_eq!(statistics(&store, 1), Stats::default());
    }
}
