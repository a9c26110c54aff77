//! Append-only reading store.
//!
//! Every operation runs in its own transaction on a connection that is held
//! only for the duration of the call.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use crate::db::models::{Measurements, NewReading, Reading, ReadingId};
use chrono::{DateTime, Duration, Utc};
use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use postgres::PgReadingStore;

#[derive(Debug)]
pub enum StoreError {
    /// No connection could be checked out of the pool.
    Pool(String),
    /// An insert or delete was rejected and rolled back.
    WriteFailed(String),
    ReadFailed(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Pool(s) => write!(f, "store unavailable: {}", s),
            StoreError::WriteFailed(s) => write!(f, "write failed: {}", s),
            StoreError::ReadFailed(s) => write!(f, "read failed: {}", s),
        }
    }
}

impl Error for StoreError {}

/// Result of a batched insert. Rows that failed were skipped, not retried.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub ids: Vec<ReadingId>,
    pub failed: usize,
}

/// Raw aggregates for one sensor; averages are `None` when no rows exist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingSummary {
    pub total_records: u64,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
    pub gas_composition: Option<f64>,
    pub noise_level: Option<f64>,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

/// Start of a lookback window ending at `now`. Windows reaching past the
/// earliest representable instant start there instead.
pub fn window_start(now: DateTime<Utc>, since: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(since).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub trait ReadingStore: Send + Sync {
    fn append(&self, sensor_id: i32, timestamp: DateTime<Utc>, m: &Measurements) -> Result<ReadingId, StoreError>;

    /// Inserts all rows in one transaction, each row atomically on its own.
    fn append_batch(&self, rows: &[NewReading]) -> Result<BatchOutcome, StoreError>;

    /// Readings with `timestamp > now - since`, newest first.
    fn query_range(&self, sensor_id: i32, since: Duration) -> Result<Vec<Reading>, StoreError>;

    /// Most recent reading of one sensor (highest id on equal timestamps).
    fn query_latest(&self, sensor_id: i32) -> Result<Option<Reading>, StoreError>;

    /// One reading per sensor with the greatest timestamp (highest id on ties),
    /// ordered by sensor id.
    fn query_latest_per_sensor(&self) -> Result<Vec<Reading>, StoreError>;

    fn delete_all(&self) -> Result<(), StoreError>;

    /// Deletes every row not belonging to `live_sensor_id`; returns the total row count left.
    fn delete_except(&self, live_sensor_id: i32) -> Result<u64, StoreError>;

    /// Deletes the rows of `live_sensor_id`; returns how many of its rows remain.
    fn delete_only(&self, live_sensor_id: i32) -> Result<u64, StoreError>;

    fn count(&self) -> Result<u64, StoreError>;

    /// Distinct sensors with at least one reading newer than `now - since`.
    fn count_active_since(&self, since: Duration) -> Result<u64, StoreError>;

    fn summarize(&self, sensor_id: i32) -> Result<ReadingSummary, StoreError>;
}
