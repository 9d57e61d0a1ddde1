//! Command-line arguments

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "pgdata")]
#[command(version)]
#[command(about = "Inspect PostgreSQL/PostGIS databases and move geospatial files in and out", long_about = None)]
pub struct Cli {
    /// PostgreSQL connection URL
    ///
    /// Format: postgresql://[user]:[password]@[host]:[port]/[database]
    /// Falls back to the settings file, then the DATABASE_URL environment
    /// variable
    #[arg(long, global = true)]
    pub db_url: Option<String>,

    /// Bind to this schema; unqualified table names resolve against it
    #[arg(long, short = 's', global = true)]
    pub schema: Option<String>,

    /// Settings file (default: <config dir>/pgdata/settings.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Open a fresh connection per operation instead of pooling
    #[arg(long, global = true)]
    pub no_pool: bool,

    /// Log level (trace, debug, info, warn, error) or a filter directive
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List non-system schemas
    Schemas,

    /// List tables of the bound schema, or of every schema
    Tables,

    /// Create a schema if it does not exist
    CreateSchema { name: String },

    /// Drop a schema if it exists
    DropSchema {
        name: String,
        /// Also drop everything in the schema
        #[arg(long)]
        cascade: bool,
    },

    /// Create the database named in the connection URL
    CreateDb,

    /// Drop the database named in the connection URL
    DropDb,

    /// Count rows of a table
    Count(QueryArgs),

    /// Print rows of a table
    Find(FindArgs),

    /// Load a geospatial file into PostGIS with ogr2ogr
    Ogr2pg(ImportArgs),

    /// Dump a query to a geospatial file with ogr2ogr
    Pg2ogr(ExportArgs),
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Table name, optionally schema-qualified
    pub table: String,

    /// Equality filter as column=value; repeat for more columns
    #[arg(long = "where", short = 'w', value_name = "COLUMN=VALUE")]
    pub filters: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct FindArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Ordering column; prefix with '-' for descending. Repeatable.
    #[arg(long, short = 'o', allow_hyphen_values = true)]
    pub order_by: Vec<String>,

    #[arg(long)]
    pub limit: Option<u64>,

    #[arg(long, default_value_t = 0)]
    pub offset: u64,

    /// Rows per page query; 0 fetches everything at once
    #[arg(long, default_value_t = pgdata::DEFAULT_STEP)]
    pub step: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Input file
    pub in_file: PathBuf,

    /// Source layer (default: the file stem)
    #[arg(long)]
    pub in_layer: Option<String>,

    /// Target table (default: the source layer, lower-cased)
    #[arg(long)]
    pub out_layer: Option<String>,

    /// Target schema (default: the bound schema, else public)
    #[arg(long)]
    pub target_schema: Option<String>,

    /// Source spatial reference, when the file does not declare one
    #[arg(long)]
    pub s_srs: Option<String>,

    #[arg(long, default_value = pgdata::DEFAULT_SRS)]
    pub t_srs: String,

    /// Row filter in the SQLite dialect
    #[arg(long)]
    pub sql: Option<String>,

    /// Append to an existing table instead of overwriting it
    #[arg(long)]
    pub append: bool,

    /// Print the ogr2ogr command instead of running it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// SELECT statement to export
    pub sql: String,

    /// Output file
    pub outfile: PathBuf,

    /// OGR driver, e.g. "ESRI Shapefile", GeoJSON, GPKG, FileGDB
    #[arg(long, short = 'f', default_value = "GPKG")]
    pub driver: String,

    /// Output layer (default: the file stem)
    #[arg(long)]
    pub outlayer: Option<String>,

    /// Rename an output column as source=target; repeatable
    #[arg(long, value_name = "SOURCE=TARGET")]
    pub rename: Vec<String>,

    /// Geometry type, required for FileGDB
    #[arg(long)]
    pub geom_type: Option<String>,

    /// Target spatial reference (default depends on the driver)
    #[arg(long)]
    pub t_srs: Option<String>,

    #[arg(long)]
    pub append: bool,

    /// Print the ogr2ogr command instead of running it
    #[arg(long)]
    pub dry_run: bool,
}

/// Split `key=value`
pub fn parse_pair(pair: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected KEY=VALUE, got '{}'", pair))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("empty key in '{}'", pair);
    }
    Ok((key.to_string(), value.to_string()))
}
