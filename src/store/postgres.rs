use super::{BatchOutcome, ReadingStore, ReadingSummary, StoreError, window_start};
use crate::db::models::{Measurements, NewReading, Reading, ReadingId};
use crate::db::pool::{Pool, PooledConn};
use crate::schema;
use chrono::{DateTime, Datelike, Duration, Utc};
use diesel::dsl::{avg, count_distinct, count_star, max, min};
use diesel::prelude::*;
use log::{debug, warn};

pub struct PgReadingStore {
    pool: Pool,
}

impl PgReadingStore {
    pub fn new(pool: Pool) -> Self {
        PgReadingStore { pool }
    }

    fn conn(&self) -> Result<PooledConn, StoreError> {
        self.pool.get().map_err(|e| StoreError::Pool(e.to_string()))
    }
}

/// Lower bound for a lookback window, or `None` when the window starts before
/// the earliest timestamp Postgres can store (4714 BC) and so covers every row.
fn pg_cutoff(since: Duration) -> Option<DateTime<Utc>> {
    let cutoff = window_start(Utc::now(), since);
    (cutoff.year() > PG_EARLIEST_YEAR).then_some(cutoff)
}

const PG_EARLIEST_YEAR: i32 = -4713;

fn read_err(what: &str, e: diesel::result::Error) -> StoreError {
    StoreError::ReadFailed(format!("{} failed: {}", what, e))
}

fn write_err(what: &str, e: diesel::result::Error) -> StoreError {
    StoreError::WriteFailed(format!("{} failed: {}", what, e))
}

impl ReadingStore for PgReadingStore {
    fn append(&self, sensor_id: i32, timestamp: DateTime<Utc>, m: &Measurements) -> Result<ReadingId, StoreError> {
        use schema::sensor_readings::dsl as R;

        let row = NewReading::new(sensor_id, timestamp, m);
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            diesel::insert_into(R::sensor_readings)
                .values(&row)
                .returning(R::id)
                .get_result::<ReadingId>(conn)
        })
        .map_err(|e| write_err(&format!("insert reading for sensor {}", sensor_id), e))
    }

    fn append_batch(&self, rows: &[NewReading]) -> Result<BatchOutcome, StoreError> {
        use schema::sensor_readings::dsl as R;

        if rows.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let mut conn = self.conn()?;
        let outcome = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                let mut outcome = BatchOutcome {
                    ids: Vec::with_capacity(rows.len()),
                    failed: 0,
                };
                for row in rows {
                    // nested transaction = savepoint, so one bad row does not poison the batch
                    let inserted = conn.transaction::<ReadingId, diesel::result::Error, _>(|conn| {
                        diesel::insert_into(R::sensor_readings)
                            .values(row)
                            .returning(R::id)
                            .get_result(conn)
                    });
                    match inserted {
                        Ok(id) => outcome.ids.push(id),
                        Err(e) => {
                            warn!(
                                "Skipping reading for sensor {} at {}: {}",
                                row.sensor_id, row.timestamp, e
                            );
                            outcome.failed += 1;
                        }
                    }
                }
                Ok(outcome)
            })
            .map_err(|e| write_err("batch insert", e))?;

        debug!(
            "Batch insert committed ({} inserted, {} skipped)",
            outcome.ids.len(),
            outcome.failed
        );
        Ok(outcome)
    }

    fn query_range(&self, sensor_id: i32, since: Duration) -> Result<Vec<Reading>, StoreError> {
        use schema::sensor_readings::dsl as R;

        let cutoff = pg_cutoff(since);
        let mut conn = self.conn()?;
        conn.build_transaction()
            .read_only()
            .run(|conn| {
                let mut query = R::sensor_readings
                    .select(Reading::as_select())
                    .filter(R::sensor_id.eq(sensor_id))
                    .into_boxed();
                if let Some(cutoff) = cutoff {
                    query = query.filter(R::timestamp.gt(cutoff));
                }
                query.order((R::timestamp.desc(), R::id.desc())).load(conn)
            })
            .map_err(|e| read_err(&format!("range query for sensor {}", sensor_id), e))
    }

    fn query_latest(&self, sensor_id: i32) -> Result<Option<Reading>, StoreError> {
        use schema::sensor_readings::dsl as R;

        let mut conn = self.conn()?;
        conn.build_transaction()
            .read_only()
            .run(|conn| {
                R::sensor_readings
                    .filter(R::sensor_id.eq(sensor_id))
                    .order((R::timestamp.desc(), R::id.desc()))
                    .select(Reading::as_select())
                    .first(conn)
                    .optional()
            })
            .map_err(|e| read_err(&format!("latest reading for sensor {}", sensor_id), e))
    }

    fn query_latest_per_sensor(&self) -> Result<Vec<Reading>, StoreError> {
        use schema::sensor_readings::dsl as R;

        let mut conn = self.conn()?;
        conn.build_transaction()
            .read_only()
            .run(|conn| {
                R::sensor_readings
                    .distinct_on(R::sensor_id)
                    .order((R::sensor_id, R::timestamp.desc(), R::id.desc()))
                    .select(Reading::as_select())
                    .load(conn)
            })
            .map_err(|e| read_err("latest-per-sensor query", e))
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        use schema::sensor_readings::dsl as R;

        let mut conn = self.conn()?;
        let deleted = conn
            .transaction(|conn| diesel::delete(R::sensor_readings).execute(conn))
            .map_err(|e| write_err("delete all readings", e))?;
        debug!("Deleted {} reading(s)", deleted);
        Ok(())
    }

    fn delete_except(&self, live_sensor_id: i32) -> Result<u64, StoreError> {
        use schema::sensor_readings::dsl as R;

        let mut conn = self.conn()?;
        let remaining = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                let deleted = diesel::delete(R::sensor_readings.filter(R::sensor_id.ne(live_sensor_id))).execute(conn)?;
                debug!("Deleted {} non-live reading(s)", deleted);
                R::sensor_readings.count().get_result::<i64>(conn)
            })
            .map_err(|e| write_err("delete test readings", e))?;
        Ok(remaining as u64)
    }

    fn delete_only(&self, live_sensor_id: i32) -> Result<u64, StoreError> {
        use schema::sensor_readings::dsl as R;

        let mut conn = self.conn()?;
        let remaining = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                let deleted = diesel::delete(R::sensor_readings.filter(R::sensor_id.eq(live_sensor_id))).execute(conn)?;
                debug!("Deleted {} live reading(s)", deleted);
                R::sensor_readings
                    .filter(R::sensor_id.eq(live_sensor_id))
                    .count()
                    .get_result::<i64>(conn)
            })
            .map_err(|e| write_err("delete live readings", e))?;
        Ok(remaining as u64)
    }

    fn count(&self) -> Result<u64, StoreError> {
        use schema::sensor_readings::dsl as R;

        let mut conn = self.conn()?;
        conn.build_transaction()
            .read_only()
            .run(|conn| R::sensor_readings.count().get_result::<i64>(conn))
            .map(|n| n as u64)
            .map_err(|e| read_err("count readings", e))
    }

    fn count_active_since(&self, since: Duration) -> Result<u64, StoreError> {
        use schema::sensor_readings::dsl as R;

        let cutoff = pg_cutoff(since);
        let mut conn = self.conn()?;
        conn.build_transaction()
            .read_only()
            .run(|conn| {
                let mut query = R::sensor_readings.select(count_distinct(R::sensor_id)).into_boxed();
                if let Some(cutoff) = cutoff {
                    query = query.filter(R::timestamp.gt(cutoff));
                }
                query.get_result::<i64>(conn)
            })
            .map(|n| n as u64)
            .map_err(|e| read_err("count active sensors", e))
    }

    fn summarize(&self, sensor_id: i32) -> Result<ReadingSummary, StoreError> {
        use schema::sensor_readings::dsl as R;

        type Row = (
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            i64,
            Option<DateTime<Utc>>,
            Option<DateTime<Utc>>,
        );

        let mut conn = self.conn()?;
        let (temperature, pressure, humidity, gas_composition, noise_level, total, first, last): Row = conn
            .build_transaction()
            .read_only()
            .run(|conn| {
                R::sensor_readings
                    .filter(R::sensor_id.eq(sensor_id))
                    .select((
                        avg(R::temperature),
                        avg(R::pressure),
                        avg(R::humidity),
                        avg(R::gas_composition),
                        avg(R::noise_level),
                        count_star(),
                        min(R::timestamp),
                        max(R::timestamp),
                    ))
                    .get_result(conn)
            })
            .map_err(|e| read_err(&format!("statistics for sensor {}", sensor_id), e))?;

        Ok(ReadingSummary {
            total_records: total as u64,
            temperature,
            pressure,
            humidity,
            gas_composition,
            noise_level,
            first,
            last,
        })
    }
}
