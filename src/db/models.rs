//! Diesel model structs for the `sensor_readings` table.
//!
//! Measurement columns are nullable in storage; every write path in this crate
//! fills all five of them.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema;
use crate::sensors::MeasurementKind;

pub type ReadingId = i64;

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::sensor_readings)]
pub struct Reading {
    pub id: ReadingId,
    pub sensor_id: i32,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
    pub gas_composition: Option<f64>,
    pub noise_level: Option<f64>,
}

impl Reading {
    pub fn value(&self, kind: MeasurementKind) -> Option<f64> {
        match kind {
            MeasurementKind::Temperature => self.temperature,
            MeasurementKind::Pressure => self.pressure,
            MeasurementKind::Humidity => self.humidity,
            MeasurementKind::GasComposition => self.gas_composition,
            MeasurementKind::NoiseLevel => self.noise_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::sensor_readings)]
pub struct NewReading {
    pub sensor_id: i32,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
    pub gas_composition: Option<f64>,
    pub noise_level: Option<f64>,
}

impl NewReading {
    pub fn new(sensor_id: i32, timestamp: DateTime<Utc>, m: &Measurements) -> Self {
        NewReading {
            sensor_id,
            timestamp,
            temperature: Some(m.temperature),
            pressure: Some(m.pressure),
            humidity: Some(m.humidity),
            gas_composition: Some(m.gas_composition),
            noise_level: Some(m.noise_level),
        }
    }
}

/// A complete set of measurement values for one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Measurements {
    pub temperature: f64,
    pub pressure: f64,
    pub humidity: f64,
    pub gas_composition: f64,
    pub noise_level: f64,
}

impl Measurements {
    pub fn get(&self, kind: MeasurementKind) -> f64 {
        match kind {
            MeasurementKind::Temperature => self.temperature,
            MeasurementKind::Pressure => self.pressure,
            MeasurementKind::Humidity => self.humidity,
            MeasurementKind::GasComposition => self.gas_composition,
            MeasurementKind::NoiseLevel => self.noise_level,
        }
    }

    pub fn set(&mut self, kind: MeasurementKind, value: f64) {
        match kind {
            MeasurementKind::Temperature => self.temperature = value,
            MeasurementKind::Pressure => self.pressure = value,
            MeasurementKind::Humidity => self.humidity = value,
            MeasurementKind::GasComposition => self.gas_composition = value,
            MeasurementKind::NoiseLevel => self.noise_level = value,
        }
    }
}
