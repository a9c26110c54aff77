//! Validation and insertion of single readings coming from a device.

use crate::db::models::{Measurements, ReadingId};
use crate::sensors::MeasurementKind;
use crate::store::{ReadingStore, StoreError};
use chrono::{DateTime, Utc};
use core::fmt;
use log::{debug, warn};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// A reading as submitted by a caller; every measurement must be present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawReading {
    pub sensor_id: i32,
    /// Defaults to the time of insertion.
    pub timestamp: Option<DateTime<Utc>>,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
    pub gas_composition: Option<f64>,
    pub noise_level: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingField(MeasurementKind),
    NotFinite(MeasurementKind),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingField(k) => write!(f, "missing required field '{}'", k),
            ValidationError::NotFinite(k) => write!(f, "field '{}' must be a finite number", k),
        }
    }
}

impl Error for ValidationError {}

#[derive(Debug)]
pub enum IngestError {
    /// Nothing was written.
    Validation(ValidationError),
    Store(StoreError),
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Validation(e) => write!(f, "invalid reading: {}", e),
            IngestError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IngestError::Validation(e) => Some(e),
            IngestError::Store(e) => Some(e),
        }
    }
}

impl From<ValidationError> for IngestError {
    fn from(value: ValidationError) -> Self {
        IngestError::Validation(value)
    }
}

impl From<StoreError> for IngestError {
    fn from(value: StoreError) -> Self {
        IngestError::Store(value)
    }
}

impl RawReading {
    fn field(&self, kind: MeasurementKind) -> Option<f64> {
        match kind {
            MeasurementKind::Temperature => self.temperature,
            MeasurementKind::Pressure => self.pressure,
            MeasurementKind::Humidity => self.humidity,
            MeasurementKind::GasComposition => self.gas_composition,
            MeasurementKind::NoiseLevel => self.noise_level,
        }
    }

    pub fn validate(&self) -> Result<Measurements, ValidationError> {
        let mut m = Measurements::default();
        for kind in MeasurementKind::ALL {
            let value = self.field(kind).ok_or(ValidationError::MissingField(kind))?;
            if !value.is_finite() {
                return Err(ValidationError::NotFinite(kind));
            }
            m.set(kind, value);
        }
        Ok(m)
    }
}

pub fn append_reading(store: &dyn ReadingStore, raw: &RawReading) -> Result<ReadingId, IngestError> {
    let measurements = raw.validate().inspect_err(|e| {
        warn!("Rejected reading for sensor {}: {}", raw.sensor_id, e);
    })?;
    let timestamp = raw.timestamp.unwrap_or_else(Utc::now);
    let id = store.append(raw.sensor_id, timestamp, &measurements)?;
    debug!("Stored reading {} for sensor {} at {}", id, raw.sensor_id, timestamp);
    Ok(id)
}
