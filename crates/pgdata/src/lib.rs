//! pgdata - object-style access to PostgreSQL/PostGIS
//!
//! A [`Database`] handle lists and manages schemas and tables, passes raw
//! SQL through, and hands out [`Table`] handles. Tables build filtered,
//! ordered queries from a [`Filter`] and an [`OrderBy`] and return matching
//! rows through a [`ResultIter`] that fetches one page at a time.
//!
//! Geospatial files move in and out of the database through `ogr2ogr`; see
//! [`Database::ogr2pg`] and [`Database::pg2ogr`].
//!
//! ```no_run
//! # async fn run() -> pgdata::Result<()> {
//! use pgdata::{DatabaseOptions, Filter, FindOptions};
//!
//! let db = pgdata::connect(None, DatabaseOptions::new().with_schema("pgdata"))?;
//! let employees = db.table("employees").await?;
//! let mut rows = employees
//!     .find(FindOptions::new().filter(Filter::new().eq("name", "Fred")).order_by("-id"))
//!     .await?;
//! while let Some(row) = rows.next().await? {
//!     println!("{:?}", row);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use pgdata_connection::DriverFactory;
use pgdata_driver_postgres::PostgresDriver;

mod database;
mod ddl;
mod filter;
mod identifiers;
mod paging;
mod table;
mod transfer;

#[cfg(test)]
pub(crate) mod testing;

pub use database::{DEFAULT_SCHEMA, Database, DatabaseOptions};
pub use ddl::{ColumnDef, IndexKind, default_index_name};
pub use filter::{Filter, FilterValue, OrderBy, Predicate};
pub use identifiers::{normalize_column_name, parse_table_name, valid_identifier};
pub use paging::{DEFAULT_STEP, Page, PagePlan, ResultIter};
pub use table::{DEFAULT_CHUNK_SIZE, FindOptions, Table, TableState};

pub use pgdata_connection::{ConnectionMode, PoolConfig, PoolStats};
pub use pgdata_core::{
    ColumnInfo, ConnectionConfig, IndexInfo, PgDataError, QueryResult, Record, Result, Row, Value,
};
pub use pgdata_ogr::{
    CliOgrRunner, DEFAULT_SRS, ExportOptions, ImportOptions, OgrCommand, OgrDriver, OgrOutput,
    OgrRunner,
};

/// Database used for `CREATE DATABASE` and `DROP DATABASE`
const MAINTENANCE_DATABASE: &str = "postgres";

/// Open a [`Database`] handle; `None` reads `DATABASE_URL`
pub fn connect(url: Option<&str>, options: DatabaseOptions) -> Result<Database> {
    Database::connect(url, options)
}

/// Create the database named in `url` (or `DATABASE_URL`) unless it
/// exists; returns whether it was created
pub async fn create_db(url: Option<&str>) -> Result<bool> {
    let config = ConnectionConfig::from_env_or(url)?;
    let admin = maintenance_handle(&config);
    let created = create_database(&admin, &config.database).await;
    admin.close().await;
    created
}

/// Drop the database named in `url` if it exists; returns whether it was
/// dropped
pub async fn drop_db(url: &str) -> Result<bool> {
    let config = ConnectionConfig::from_url(url)?;
    let admin = maintenance_handle(&config);
    let dropped = drop_database(&admin, &config.database).await;
    admin.close().await;
    dropped
}

fn maintenance_handle(config: &ConnectionConfig) -> Database {
    let admin = config.with_database(MAINTENANCE_DATABASE);
    let factory = DriverFactory::new(Arc::new(PostgresDriver::new()), admin.clone());
    Database::with_factory(admin, factory, DatabaseOptions::new().no_pool())
}

async fn database_exists(admin: &Database, name: &str) -> Result<bool> {
    let row = admin
        .query_one(
            "SELECT 1 FROM pg_database WHERE datname = $1",
            &[Value::from(name)],
        )
        .await?;
    Ok(row.is_some())
}

#[tracing::instrument(skip(admin))]
async fn create_database(admin: &Database, name: &str) -> Result<bool> {
    let name = valid_identifier(name)?;
    if database_exists(admin, name).await? {
        tracing::debug!("database exists");
        return Ok(false);
    }
    // CREATE DATABASE cannot run inside the implicit transaction of an
    // extended-protocol statement
    admin
        .execute_batch(&format!("CREATE DATABASE {}", identifiers::quote(name)))
        .await?;
    tracing::info!("created database");
    Ok(true)
}

#[tracing::instrument(skip(admin))]
async fn drop_database(admin: &Database, name: &str) -> Result<bool> {
    let name = valid_identifier(name)?;
    if name == MAINTENANCE_DATABASE {
        return Err(PgDataError::UnsupportedConfiguration(format!(
            "refusing to drop the maintenance database '{}'",
            name
        )));
    }
    if !database_exists(admin, name).await? {
        return Ok(false);
    }
    admin
        .execute_batch(&format!("DROP DATABASE {}", identifiers::quote(name)))
        .await?;
    tracing::info!("dropped database");
    Ok(true)
}
