//! r2d2 connection pool shared by every store operation.

use crate::config::Config;
use diesel::PgConnection;
use diesel::RunQueryDsl;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use log::info;
use std::time::Duration;

pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type PooledConn = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Applies a server-side `statement_timeout` to each new connection.
#[derive(Debug, Clone, Copy)]
struct StatementTimeout(Duration);

impl CustomizeConnection<PgConnection, r2d2::Error> for StatementTimeout {
    fn on_acquire(&self, conn: &mut PgConnection) -> Result<(), r2d2::Error> {
        diesel::sql_query(format!("SET statement_timeout = {}", self.0.as_millis()))
            .execute(conn)
            .map(|_| ())
            .map_err(r2d2::Error::QueryError)
    }
}

pub fn build_pool(cfg: &Config) -> Result<Pool, String> {
    let manager = ConnectionManager::<PgConnection>::new(&cfg.database_url);
    let pool = r2d2::Pool::builder()
        .max_size(cfg.pool_size)
        .connection_timeout(cfg.connect_timeout)
        .connection_customizer(Box::new(StatementTimeout(cfg.statement_timeout)))
        .build(manager)
        .map_err(|e| format!("DB pool setup failed: {}", e))?;
    info!(
        "Connection pool ready (max_size={}, statement_timeout={}s)",
        cfg.pool_size,
        cfg.statement_timeout.as_secs()
    );
    Ok(pool)
}
