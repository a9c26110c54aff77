//! Synthetic history for the virtual sensors.
//!
//! Each virtual sensor gets one random baseline per measurement kind for the
//! whole run. Every timestep perturbs that baseline and clamps the result into
//! the kind's generation range, so nothing outside `[gen_min, gen_max]` is
//! ever written. The live device is skipped entirely.

use crate::config::{Config, GeneratorProfile};
use crate::db::models::{Measurements, NewReading};
use crate::sensors::{MeasurementKind, SensorLocation, virtual_sensor_ids};
use crate::store::{ReadingStore, StoreError};
use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use core::fmt;
use log::{debug, info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Offset added to a sensor's baseline for one measurement at one instant.
pub trait Perturbation: Send + Sync {
    fn offset(&self, kind: MeasurementKind, at: DateTime<Utc>, rng: &mut SmallRng) -> f64;
}

/// Independent uniform noise around the baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformJitter;

impl UniformJitter {
    /// Half-width of the uniform jitter for each kind.
    pub fn amplitude(kind: MeasurementKind) -> f64 {
        match kind {
            MeasurementKind::Temperature => 2.0,
            MeasurementKind::Pressure => 0.5,
            MeasurementKind::Humidity => 5.0,
            MeasurementKind::GasComposition => 50.0,
            MeasurementKind::NoiseLevel => 5.0,
        }
    }

    fn sample(kind: MeasurementKind, rng: &mut SmallRng) -> f64 {
        let a = Self::amplitude(kind);
        rng.random_range(-a..=a)
    }
}

impl Perturbation for UniformJitter {
    fn offset(&self, kind: MeasurementKind, _at: DateTime<Utc>, rng: &mut SmallRng) -> f64 {
        Self::sample(kind, rng)
    }
}

/// Uniform jitter plus a coarse night/morning/day/evening shift of noise,
/// temperature and humidity, bucketed on the local hour.
#[derive(Debug, Clone, Copy)]
pub struct DiurnalJitter {
    pub offset: FixedOffset,
}

impl DiurnalJitter {
    pub fn shift(kind: MeasurementKind, hour: u32) -> f64 {
        let (noise, temperature, humidity) = match hour {
            0..=6 => (-10.0, -5.0, 15.0),
            7..=9 => (5.0, 0.0, 5.0),
            10..=17 => (15.0, 5.0, -10.0),
            _ => (0.0, 0.0, 0.0),
        };
        match kind {
            MeasurementKind::NoiseLevel => noise,
            MeasurementKind::Temperature => temperature,
            MeasurementKind::Humidity => humidity,
            MeasurementKind::Pressure | MeasurementKind::GasComposition => 0.0,
        }
    }
}

impl Perturbation for DiurnalJitter {
    fn offset(&self, kind: MeasurementKind, at: DateTime<Utc>, rng: &mut SmallRng) -> f64 {
        let hour = at.with_timezone(&self.offset).hour();
        Self::shift(kind, hour) + UniformJitter::sample(kind, rng)
    }
}

pub fn perturbation_for(profile: GeneratorProfile, offset: FixedOffset) -> Box<dyn Perturbation> {
    match profile {
        GeneratorProfile::Uniform => Box::new(UniformJitter),
        GeneratorProfile::Diurnal => Box::new(DiurnalJitter { offset }),
    }
}

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub days: u32,
    pub interval_minutes: u32,
    pub batch_size: usize,
    pub live_sensor_id: i32,
    pub seed: Option<u64>,
}

impl GenerateOptions {
    pub fn from_config(cfg: &Config, days: Option<u32>) -> Self {
        GenerateOptions {
            days: days.unwrap_or(cfg.generator_days),
            interval_minutes: cfg.generator_interval_minutes,
            batch_size: cfg.generator_batch_size,
            live_sensor_id: cfg.live_sensor_id,
            seed: cfg.generator_seed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GeneratorReport {
    /// Rows actually persisted.
    pub records_added: usize,
    /// Rows skipped because their insert failed.
    pub failed_rows: usize,
}

#[derive(Debug)]
pub enum GeneratorError {
    InvalidInterval,
    /// The requested history reaches past the earliest representable date.
    WindowTooLarge(u32),
    /// Not a single batch could be written.
    StoreUnavailable(StoreError),
}

impl Display for GeneratorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorError::InvalidInterval => write!(f, "sampling interval must be at least one minute"),
            GeneratorError::WindowTooLarge(days) => write!(f, "{} day(s) of history is out of range", days),
            GeneratorError::StoreUnavailable(e) => write!(f, "reading store unreachable during generation: {}", e),
        }
    }
}

impl Error for GeneratorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GeneratorError::StoreUnavailable(e) => Some(e),
            GeneratorError::InvalidInterval | GeneratorError::WindowTooLarge(_) => None,
        }
    }
}

pub fn run(
    store: &dyn ReadingStore,
    locations: &[SensorLocation],
    opts: &GenerateOptions,
    perturbation: &dyn Perturbation,
) -> Result<GeneratorReport, GeneratorError> {
    let mut rng = match opts.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_os_rng(),
    };
    run_until(store, locations, opts, perturbation, Utc::now(), &mut rng)
}

/// Generates `[end - days, end)` for every virtual sensor.
pub fn run_until(
    store: &dyn ReadingStore,
    locations: &[SensorLocation],
    opts: &GenerateOptions,
    perturbation: &dyn Perturbation,
    end: DateTime<Utc>,
    rng: &mut SmallRng,
) -> Result<GeneratorReport, GeneratorError> {
    if opts.interval_minutes == 0 {
        return Err(GeneratorError::InvalidInterval);
    }

    let start = end
        .checked_sub_signed(Duration::days(i64::from(opts.days)))
        .ok_or(GeneratorError::WindowTooLarge(opts.days))?;
    let step = Duration::minutes(i64::from(opts.interval_minutes));
    let batch_size = opts.batch_size.max(1);
    let sensor_ids = virtual_sensor_ids(locations, opts.live_sensor_id);

    info!(
        "Generator: synthesizing {} day(s) at {} min intervals for {} virtual sensor(s) ({} to {})",
        opts.days,
        opts.interval_minutes,
        sensor_ids.len(),
        start,
        end
    );

    let mut flusher = BatchFlusher::new(store);
    let mut batch: Vec<NewReading> = Vec::with_capacity(batch_size);

    for sensor_id in sensor_ids {
        let base = draw_baseline(rng);
        debug!("Generator: sensor {} baseline {:?}", sensor_id, base);

        let mut ts = start;
        while ts < end {
            let mut m = Measurements::default();
            for kind in MeasurementKind::ALL {
                let value = base.get(kind) + perturbation.offset(kind, ts, rng);
                m.set(kind, kind.spec().clamp_generated(value));
            }
            batch.push(NewReading::new(sensor_id, ts, &m));

            if batch.len() >= batch_size {
                flusher.flush(&mut batch);
            }
            ts += step;
        }
        flusher.flush(&mut batch);
        info!("Generator: sensor {} done", sensor_id);
    }

    flusher.finish()
}

fn draw_baseline(rng: &mut SmallRng) -> Measurements {
    let mut base = Measurements::default();
    for kind in MeasurementKind::ALL {
        let spec = kind.spec();
        base.set(kind, rng.random_range(spec.gen_min..=spec.gen_max));
    }
    base
}

struct BatchFlusher<'a> {
    store: &'a dyn ReadingStore,
    report: GeneratorReport,
    batches: usize,
    failed_batches: usize,
    last_error: Option<StoreError>,
}

impl<'a> BatchFlusher<'a> {
    fn new(store: &'a dyn ReadingStore) -> Self {
        BatchFlusher {
            store,
            report: GeneratorReport::default(),
            batches: 0,
            failed_batches: 0,
            last_error: None,
        }
    }

    fn flush(&mut self, batch: &mut Vec<NewReading>) {
        if batch.is_empty() {
            return;
        }
        self.batches += 1;
        match self.store.append_batch(batch) {
            Ok(outcome) => {
                self.report.records_added += outcome.ids.len();
                self.report.failed_rows += outcome.failed;
            }
            Err(e) => {
                warn!("Generator: dropping batch of {} row(s): {}", batch.len(), e);
                self.report.failed_rows += batch.len();
                self.failed_batches += 1;
                self.last_error = Some(e);
            }
        }
        batch.clear();
    }

    fn finish(self) -> Result<GeneratorReport, GeneratorError> {
        if self.batches > 0
            && self.failed_batches == self.batches
            && let Some(e) = self.last_error
        {
            return Err(GeneratorError::StoreUnavailable(e));
        }
        info!(
            "Generator: complete ({} row(s) added, {} skipped)",
            self.report.records_added, self.report.failed_rows
        );
        Ok(self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{DEFAULT_LIVE_SENSOR_ID, SENSOR_LOCATIONS};
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    fn opts(days: u32, interval_minutes: u32) -> GenerateOptions {
        GenerateOptions {
            days,
            interval_minutes,
            batch_size: 100,
            live_sensor_id: DEFAULT_LIVE_SENSOR_ID,
            seed: Some(7),
        }
    }

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn generate(store: &MemoryStore, o: &GenerateOptions, p: &dyn Perturbation) -> Result<GeneratorReport, GeneratorError> {
        let mut rng = SmallRng::seed_from_u64(o.seed.unwrap_or(0));
        run_until(store, &SENSOR_LOCATIONS, o, p, end(), &mut rng)
    }

    #[test]
    fn one_day_at_three_minutes_yields_2400_rows() {
        let store = MemoryStore::new();
        let report = generate(&store, &opts(1, 3), &UniformJitter).unwrap();

        assert_eq!(report.records_added, 2400);
        assert_eq!(report.failed_rows, 0);
        assert_eq!(store.count().unwrap(), 2400);
    }

    #[test]
    fn generated_values_stay_within_generation_range() {
        let store = MemoryStore::new();
        let diurnal = DiurnalJitter {
            offset: FixedOffset::east_opt(3 * 3600).unwrap(),
        };
        generate(&store, &opts(2, 10), &diurnal).unwrap();

        for row in store.all() {
            for kind in MeasurementKind::ALL {
                let spec = kind.spec();
                let v = row.value(kind).expect("generator fills every column");
                assert!(v >= spec.gen_min && v <= spec.gen_max, "{kind}={v}");
            }
        }
    }

    #[test]
    fn live_device_is_never_generated() {
        let store = MemoryStore::new();
        let live = Measurements {
            temperature: 20.0,
            pressure: 101.0,
            humidity: 40.0,
            gas_composition: 450.0,
            noise_level: 20.0,
        };
        store.append(DEFAULT_LIVE_SENSOR_ID, end(), &live).unwrap();

        generate(&store, &opts(1, 30), &UniformJitter).unwrap();

        let live_rows = store
            .all()
            .into_iter()
            .filter(|r| r.sensor_id == DEFAULT_LIVE_SENSOR_ID)
            .count();
        assert_eq!(live_rows, 1);
    }

    #[test]
    fn rows_span_the_requested_window_in_steps() {
        let store = MemoryStore::new();
        generate(&store, &opts(1, 60), &UniformJitter).unwrap();

        let mut sensor_one: Vec<_> = store
            .all()
            .into_iter()
            .filter(|r| r.sensor_id == 1)
            .map(|r| r.timestamp)
            .collect();
        sensor_one.sort();
        assert_eq!(sensor_one.len(), 24);
        assert_eq!(sensor_one[0], end() - Duration::days(1));
        assert_eq!(sensor_one[23], end() - Duration::hours(1));
    }

    #[test]
    fn failed_rows_are_skipped_not_fatal() {
        let store = MemoryStore::new();
        store.reject_rows(|row| row.sensor_id == 2);

        let report = generate(&store, &opts(1, 3), &UniformJitter).unwrap();
        assert_eq!(report.records_added, 1920);
        assert_eq!(report.failed_rows, 480);
        assert_eq!(store.count().unwrap(), 1920);
    }

    #[test]
    fn unreachable_store_fails_the_run() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let err = generate(&store, &opts(1, 60), &UniformJitter).unwrap_err();
        assert!(matches!(err, GeneratorError::StoreUnavailable(StoreError::Pool(_))));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let store = MemoryStore::new();
        let err = generate(&store, &opts(1, 0), &UniformJitter).unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidInterval));
    }

    #[test]
    fn history_past_the_earliest_date_is_rejected() {
        let store = MemoryStore::new();
        let err = generate(&store, &opts(u32::MAX, 3), &UniformJitter).unwrap_err();
        assert!(matches!(err, GeneratorError::WindowTooLarge(u32::MAX)));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn zero_days_writes_nothing() {
        let store = MemoryStore::new();
        let report = generate(&store, &opts(0, 3), &UniformJitter).unwrap();
        assert_eq!(report, GeneratorReport::default());
    }

    #[test]
    fn diurnal_buckets() {
        assert_eq!(DiurnalJitter::shift(MeasurementKind::NoiseLevel, 3), -10.0);
        assert_eq!(DiurnalJitter::shift(MeasurementKind::Humidity, 8), 5.0);
        assert_eq!(DiurnalJitter::shift(MeasurementKind::Temperature, 12), 5.0);
        assert_eq!(DiurnalJitter::shift(MeasurementKind::NoiseLevel, 20), 0.0);
        assert_eq!(DiurnalJitter::shift(MeasurementKind::Pressure, 12), 0.0);
    }

    #[test]
    fn uniform_jitter_is_bounded() {
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..1000 {
            for kind in MeasurementKind::ALL {
                let o = UniformJitter.offset(kind, end(), &mut rng);
                assert!(o.abs() <= UniformJitter::amplitude(kind));
            }
        }
    }
}
