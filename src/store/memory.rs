//! In-process `ReadingStore` used by the unit tests.

use super::{BatchOutcome, ReadingStore, ReadingSummary, StoreError, window_start};
use crate::db::models::{Measurements, NewReading, Reading, ReadingId};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

type RejectFn = Box<dyn Fn(&NewReading) -> bool + Send + Sync>;

#[derive(Default)]
struct Inner {
    next_id: ReadingId,
    rows: Vec<Reading>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    reject: Mutex<Option<RejectFn>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation fails as if the pool could not hand out a connection.
    pub fn set_unavailable(&self, value: bool) {
        self.unavailable.store(value, Ordering::SeqCst);
    }

    /// Rows matching `f` are rejected as if a constraint had failed.
    pub fn reject_rows(&self, f: impl Fn(&NewReading) -> bool + Send + Sync + 'static) {
        *self.reject.lock().unwrap() = Some(Box::new(f));
    }

    pub fn all(&self) -> Vec<Reading> {
        self.inner.lock().unwrap().rows.clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Pool("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn insert(&self, inner: &mut Inner, row: &NewReading) -> Result<ReadingId, StoreError> {
        if let Some(reject) = self.reject.lock().unwrap().as_ref()
            && reject(row)
        {
            return Err(StoreError::WriteFailed(format!("row for sensor {} rejected", row.sensor_id)));
        }
        inner.next_id += 1;
        inner.rows.push(Reading {
            id: inner.next_id,
            sensor_id: row.sensor_id,
            timestamp: row.timestamp,
            temperature: row.temperature,
            pressure: row.pressure,
            humidity: row.humidity,
            gas_composition: row.gas_composition,
            noise_level: row.noise_level,
        });
        Ok(inner.next_id)
    }
}

fn mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, n) = values.flatten().fold((0.0, 0u64), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

impl ReadingStore for MemoryStore {
    fn append(&self, sensor_id: i32, timestamp: DateTime<Utc>, m: &Measurements) -> Result<ReadingId, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        self.insert(&mut inner, &NewReading::new(sensor_id, timestamp, m))
    }

    fn append_batch(&self, rows: &[NewReading]) -> Result<BatchOutcome, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        let mut outcome = BatchOutcome::default();
        for row in rows {
            match self.insert(&mut inner, row) {
                Ok(id) => outcome.ids.push(id),
                Err(_) => outcome.failed += 1,
            }
        }
        Ok(outcome)
    }

    fn query_range(&self, sensor_id: i32, since: Duration) -> Result<Vec<Reading>, StoreError> {
        self.check()?;
        let cutoff = window_start(Utc::now(), since);
        let mut rows: Vec<Reading> = self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|r| r.sensor_id == sensor_id && r.timestamp > cutoff)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        Ok(rows)
    }

    fn query_latest(&self, sensor_id: i32) -> Result<Option<Reading>, StoreError> {
        self.check()?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|r| r.sensor_id == sensor_id)
            .max_by_key(|r| (r.timestamp, r.id))
            .cloned())
    }

    fn query_latest_per_sensor(&self) -> Result<Vec<Reading>, StoreError> {
        self.check()?;
        let mut latest: BTreeMap<i32, Reading> = BTreeMap::new();
        for row in &self.inner.lock().unwrap().rows {
            let replace = latest
                .get(&row.sensor_id)
                .is_none_or(|cur| (row.timestamp, row.id) > (cur.timestamp, cur.id));
            if replace {
                latest.insert(row.sensor_id, row.clone());
            }
        }
        Ok(latest.into_values().collect())
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        self.check()?;
        self.inner.lock().unwrap().rows.clear();
        Ok(())
    }

    fn delete_except(&self, live_sensor_id: i32) -> Result<u64, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        inner.rows.retain(|r| r.sensor_id == live_sensor_id);
        Ok(inner.rows.len() as u64)
    }

    fn delete_only(&self, live_sensor_id: i32) -> Result<u64, StoreError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        inner.rows.retain(|r| r.sensor_id != live_sensor_id);
        Ok(inner.rows.iter().filter(|r| r.sensor_id == live_sensor_id).count() as u64)
    }

    fn count(&self) -> Result<u64, StoreError> {
        self.check()?;
        Ok(self.inner.lock().unwrap().rows.len() as u64)
    }

    fn count_active_since(&self, since: Duration) -> Result<u64, StoreError> {
        self.check()?;
        let cutoff = window_start(Utc::now(), since);
        let inner = self.inner.lock().unwrap();
        let mut ids: Vec<i32> = inner
            .rows
            .iter()
            .filter(|r| r.timestamp > cutoff)
            .map(|r| r.sensor_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids.len() as u64)
    }

    fn summarize(&self, sensor_id: i32) -> Result<ReadingSummary, StoreError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        let rows: Vec<&Reading> = inner.rows.iter().filter(|r| r.sensor_id == sensor_id).collect();
        Ok(ReadingSummary {
            total_records: rows.len() as u64,
            temperature: mean(rows.iter().map(|r| r.temperature)),
            pressure: mean(rows.iter().map(|r| r.pressure)),
            humidity: mean(rows.iter().map(|r| r.humidity)),
            gas_composition: mean(rows.iter().map(|r| r.gas_composition)),
            noise_level: mean(rows.iter().map(|r| r.noise_level)),
            first: rows.iter().map(|r| r.timestamp).min(),
            last: rows.iter().map(|r| r.timestamp).max(),
        })
    }
}
