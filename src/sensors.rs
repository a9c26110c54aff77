//! Static sensor configuration: measurement kinds with their generation and
//! normal ranges, and the registry of known sensor locations.

use serde::Serialize;
use std::fmt;

/// The five quantities every reading carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    Temperature,
    Pressure,
    Humidity,
    GasComposition,
    NoiseLevel,
}

impl MeasurementKind {
    pub const ALL: [MeasurementKind; 5] = [
        MeasurementKind::Temperature,
        MeasurementKind::Pressure,
        MeasurementKind::Humidity,
        MeasurementKind::GasComposition,
        MeasurementKind::NoiseLevel,
    ];

    /// Column / JSON key name.
    pub fn key(self) -> &'static str {
        match self {
            MeasurementKind::Temperature => "temperature",
            MeasurementKind::Pressure => "pressure",
            MeasurementKind::Humidity => "humidity",
            MeasurementKind::GasComposition => "gas_composition",
            MeasurementKind::NoiseLevel => "noise_level",
        }
    }

    pub fn spec(self) -> &'static MeasurementSpec {
        match self {
            MeasurementKind::Temperature => &TEMPERATURE,
            MeasurementKind::Pressure => &PRESSURE,
            MeasurementKind::Humidity => &HUMIDITY,
            MeasurementKind::GasComposition => &GAS_COMPOSITION,
            MeasurementKind::NoiseLevel => &NOISE_LEVEL,
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeasurementSpec {
    /// Synthetic values are clamped into `[gen_min, gen_max]`.
    pub gen_min: f64,
    pub gen_max: f64,
    /// Display-only band used to flag readings that need attention.
    pub norm_min: f64,
    pub norm_max: f64,
    pub unit: &'static str,
    pub label: &'static str,
}

impl MeasurementSpec {
    pub fn clamp_generated(&self, value: f64) -> f64 {
        value.clamp(self.gen_min, self.gen_max)
    }

    pub fn is_normal(&self, value: f64) -> bool {
        value >= self.norm_min && value <= self.norm_max
    }
}

const TEMPERATURE: MeasurementSpec = MeasurementSpec {
    gen_min: 17.5,
    gen_max: 24.5,
    norm_min: 18.0,
    norm_max: 24.0,
    unit: "°C",
    label: "Temperature",
};

const PRESSURE: MeasurementSpec = MeasurementSpec {
    gen_min: 97.5,
    gen_max: 105.5,
    norm_min: 98.0,
    norm_max: 105.0,
    unit: "kPa",
    label: "Pressure",
};

const HUMIDITY: MeasurementSpec = MeasurementSpec {
    gen_min: 28.0,
    gen_max: 62.0,
    norm_min: 30.0,
    norm_max: 60.0,
    unit: "%",
    label: "Humidity",
};

const GAS_COMPOSITION: MeasurementSpec = MeasurementSpec {
    gen_min: 380.0,
    gen_max: 620.0,
    norm_min: 400.0,
    norm_max: 600.0,
    unit: "ppm",
    label: "CO₂ level",
};

const NOISE_LEVEL: MeasurementSpec = MeasurementSpec {
    gen_min: 0.0,
    gen_max: 62.0,
    norm_min: 0.0,
    norm_max: 60.0,
    unit: "dB",
    label: "Noise level",
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorLocation {
    pub id: i32,
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
    pub color: &'static str,
}

pub const DEFAULT_LIVE_SENSOR_ID: i32 = 6;

pub const SENSOR_LOCATIONS: [SensorLocation; 6] = [
    SensorLocation {
        id: 1,
        name: "Sensor #1 - Main building",
        lat: 43.414283,
        lng: 39.950436,
        color: "#118899",
    },
    SensorLocation {
        id: 2,
        name: "Sensor #2 - Laboratory",
        lat: 43.4145,
        lng: 39.951,
        color: "#4FA8B5",
    },
    SensorLocation {
        id: 3,
        name: "Sensor #3 - Warehouse",
        lat: 43.4138,
        lng: 39.9498,
        color: "#0D6A77",
    },
    SensorLocation {
        id: 4,
        name: "Sensor #4 - Parking",
        lat: 43.415,
        lng: 39.9508,
        color: "#1A9BA8",
    },
    SensorLocation {
        id: 5,
        name: "Sensor #5 - Office",
        lat: 43.414,
        lng: 39.9512,
        color: "#2CA3B0",
    },
    SensorLocation {
        id: DEFAULT_LIVE_SENSOR_ID,
        name: "Weather station (live)",
        lat: 43.4143,
        lng: 39.9502,
        color: "#E06C2B",
    },
];

/// Whether a sensor id belongs to a generated sensor or the real device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Virtual(i32),
    LiveDevice,
}

impl SensorKind {
    pub fn classify(sensor_id: i32, live_sensor_id: i32) -> Self {
        if sensor_id == live_sensor_id {
            SensorKind::LiveDevice
        } else {
            SensorKind::Virtual(sensor_id)
        }
    }
}

/// Ids of registry sensors that the generator may populate.
pub fn virtual_sensor_ids(locations: &[SensorLocation], live_sensor_id: i32) -> Vec<i32> {
    locations
        .iter()
        .filter_map(|loc| match SensorKind::classify(loc.id, live_sensor_id) {
            SensorKind::Virtual(id) => Some(id),
            SensorKind::LiveDevice => None,
        })
        .collect()
}
