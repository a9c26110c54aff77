//! Operations consumed by the dashboard: series, latest values, statistics,
//! generator runs and the three clear variants. Every result serializes to the
//! JSON shape the front end polls for.

use crate::config::Config;
use crate::db::models::{Reading, ReadingId};
use crate::sensors::{MeasurementKind, SENSOR_LOCATIONS, SensorKind};
use crate::services::generator::{self, GenerateOptions};
use crate::services::ingest::{self, IngestError, RawReading};
use crate::services::stats::{self, Averages};
use crate::store::ReadingStore;
use crate::utils::{format_chart_time, format_full_time};
use chrono::{Duration, FixedOffset};
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

const NO_DATA: &str = "no data";
const ACTIVE_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesData {
    pub kind: MeasurementKind,
    pub label: &'static str,
    pub unit: &'static str,
    /// Index-aligned with `Series::timestamps`.
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    /// Oldest first.
    pub timestamps: Vec<String>,
    pub series: Vec<SeriesData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SeriesResponse {
    Series(Series),
    NoData { error: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Normal,
    Attention,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestReading {
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
    pub gas_composition: Option<f64>,
    pub noise_level: Option<f64>,
    pub timestamp: String,
    pub status: Status,
    /// Kinds whose value lies outside the normal range.
    pub out_of_range: Vec<MeasurementKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedTimeRange {
    pub first_record: Option<String>,
    pub last_record: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsResponse {
    pub averages: Averages,
    pub total_records: u64,
    pub time_range: FormattedTimeRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    pub total_records: u64,
    pub active_sensors: u64,
    pub total_configured_sensors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppendResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ReadingId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub records_added: usize,
    /// Rows skipped because their insert failed.
    pub failed_rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_records_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClearResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_records_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_live_records: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Dashboard {
    store: Arc<dyn ReadingStore>,
    cfg: Config,
}

impl Dashboard {
    pub fn new(store: Arc<dyn ReadingStore>, cfg: Config) -> Self {
        Dashboard { store, cfg }
    }

    fn offset(&self) -> FixedOffset {
        self.cfg.display_offset
    }

    pub fn append_reading(&self, raw: &RawReading) -> Result<ReadingId, IngestError> {
        ingest::append_reading(self.store.as_ref(), raw)
    }

    pub fn append_response(&self, raw: &RawReading) -> AppendResponse {
        match self.append_reading(raw) {
            Ok(id) => AppendResponse {
                success: true,
                id: Some(id),
                error: None,
            },
            Err(e) => AppendResponse {
                success: false,
                id: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Chart series for the last `hours`. The live device only ever shows its
    /// most recent reading.
    pub fn get_series(&self, sensor_id: i32, hours: u32) -> SeriesResponse {
        let newest_first = match SensorKind::classify(sensor_id, self.cfg.live_sensor_id) {
            SensorKind::LiveDevice => self
                .store
                .query_latest(sensor_id)
                .map(|row| row.into_iter().collect::<Vec<_>>()),
            SensorKind::Virtual(id) => self.store.query_range(id, Duration::hours(i64::from(hours))),
        };

        match newest_first {
            Ok(rows) if !rows.is_empty() => SeriesResponse::Series(chart_series(rows, self.offset())),
            Ok(_) => SeriesResponse::NoData { error: NO_DATA },
            Err(e) => {
                warn!("Series for sensor {} unavailable: {}", sensor_id, e);
                SeriesResponse::NoData { error: NO_DATA }
            }
        }
    }

    pub fn get_latest(&self) -> BTreeMap<i32, LatestReading> {
        let rows = match self.store.query_latest_per_sensor() {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Latest readings unavailable: {}", e);
                return BTreeMap::new();
            }
        };
        rows.into_iter()
            .map(|r| (r.sensor_id, latest_reading(&r, self.offset())))
            .collect()
    }

    pub fn get_statistics(&self, sensor_id: i32) -> StatsResponse {
        let s = stats::statistics(self.store.as_ref(), sensor_id);
        StatsResponse {
            averages: s.averages,
            total_records: s.total_records,
            time_range: FormattedTimeRange {
                first_record: s.time_range.first.map(|t| format_full_time(t, self.offset())),
                last_record: s.time_range.last.map(|t| format_full_time(t, self.offset())),
            },
        }
    }

    pub fn get_system_stats(&self) -> SystemStats {
        let total_records = self.store.count().unwrap_or_else(|e| {
            warn!("Record count unavailable: {}", e);
            0
        });
        let active_sensors = self
            .store
            .count_active_since(Duration::hours(ACTIVE_WINDOW_HOURS))
            .unwrap_or_else(|e| {
                warn!("Active sensor count unavailable: {}", e);
                0
            });
        SystemStats {
            total_records,
            active_sensors,
            total_configured_sensors: SENSOR_LOCATIONS.len(),
        }
    }

    fn total_records(&self) -> Option<u64> {
        self.store
            .count()
            .inspect_err(|e| warn!("Record count unavailable: {}", e))
            .ok()
    }

    pub fn run_generator(&self, days: Option<u32>) -> GenerateResponse {
        let opts = GenerateOptions::from_config(&self.cfg, days);
        let perturbation = generator::perturbation_for(self.cfg.generator_profile, self.offset());
        let result = generator::run(self.store.as_ref(), &SENSOR_LOCATIONS, &opts, perturbation.as_ref());
        let total_records_after = self.total_records();
        match result {
            Ok(report) => GenerateResponse {
                success: true,
                records_added: report.records_added,
                failed_rows: report.failed_rows,
                total_records_after,
                error: None,
            },
            Err(e) => {
                warn!("Generator run failed: {}", e);
                GenerateResponse {
                    success: false,
                    records_added: 0,
                    failed_rows: 0,
                    total_records_after,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Removes everything except the live device's readings.
    pub fn clear_test_data(&self) -> ClearResponse {
        match self.store.delete_except(self.cfg.live_sensor_id) {
            Ok(remaining) => {
                info!("Cleared test data ({} record(s) remain)", remaining);
                cleared(Some(remaining), None)
            }
            Err(e) => failed_clear(e.to_string(), self.total_records()),
        }
    }

    /// Removes only the live device's readings.
    pub fn clear_live_data(&self) -> ClearResponse {
        match self.store.delete_only(self.cfg.live_sensor_id) {
            Ok(remaining) => {
                info!("Cleared live data ({} live record(s) remain)", remaining);
                cleared(None, Some(remaining))
            }
            Err(e) => failed_clear(e.to_string(), self.total_records()),
        }
    }

    pub fn clear_all(&self) -> ClearResponse {
        match self.store.delete_all() {
            Ok(()) => {
                info!("Cleared all readings");
                cleared(self.total_records(), None)
            }
            Err(e) => failed_clear(e.to_string(), self.total_records()),
        }
    }
}

fn cleared(total_records_after: Option<u64>, remaining_live_records: Option<u64>) -> ClearResponse {
    ClearResponse {
        success: true,
        total_records_after,
        remaining_live_records,
        error: None,
    }
}

fn failed_clear(error: String, total_records_after: Option<u64>) -> ClearResponse {
    warn!("Clear failed: {}", error);
    ClearResponse {
        success: false,
        total_records_after,
        remaining_live_records: None,
        error: Some(error),
    }
}

/// The single place where store order (newest first) becomes chart order.
fn chart_series(mut rows: Vec<Reading>, offset: FixedOffset) -> Series {
    rows.reverse();
    let timestamps = rows.iter().map(|r| format_chart_time(r.timestamp, offset)).collect();
    let series = MeasurementKind::ALL
        .iter()
        .map(|&kind| {
            let spec = kind.spec();
            SeriesData {
                kind,
                label: spec.label,
                unit: spec.unit,
                values: rows.iter().map(|r| r.value(kind)).collect(),
            }
        })
        .collect();
    Series { timestamps, series }
}

fn latest_reading(r: &Reading, offset: FixedOffset) -> LatestReading {
    let out_of_range: Vec<MeasurementKind> = MeasurementKind::ALL
        .into_iter()
        .filter(|&kind| r.value(kind).is_some_and(|v| !kind.spec().is_normal(v)))
        .collect();
    LatestReading {
        temperature: r.temperature,
        pressure: r.pressure,
        humidity: r.humidity,
        gas_composition: r.gas_composition,
        noise_level: r.noise_level,
        timestamp: format_full_time(r.timestamp, offset),
        status: if out_of_range.is_empty() {
            Status::Normal
        } else {
            Status::Attention
        },
        out_of_range,
    }
}
