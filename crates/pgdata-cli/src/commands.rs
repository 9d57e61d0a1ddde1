//! Subcommand implementations

use std::io::Write;
use std::pin::pin;

use anyhow::{Context, Result};
use comfy_table::{Table as TextTable, presets::UTF8_FULL};
use futures::{Stream, TryStreamExt};
use pgdata::{
    Database, DatabaseOptions, ExportOptions, Filter, FindOptions, ImportOptions, OgrDriver,
    OrderBy, Record, Value,
};

use crate::cli::{Cli, Command, ExportArgs, FindArgs, ImportArgs, QueryArgs, parse_pair};
use crate::settings::Settings;

/// Connection URL: flag, then settings file; `None` leaves `DATABASE_URL`
fn database_url(cli: &Cli, settings: &Settings) -> Option<String> {
    cli.db_url.clone().or_else(|| settings.database_url.clone())
}

fn database_options(cli: &Cli, settings: &Settings) -> Result<DatabaseOptions> {
    let mut options = settings.database_options()?;
    if let Some(schema) = &cli.schema {
        options = options.with_schema(schema.clone());
    }
    if cli.no_pool {
        options = options.no_pool();
    }
    Ok(options)
}

pub async fn run(cli: Cli, settings: &Settings) -> Result<()> {
    let url = database_url(&cli, settings);
    let mut out = std::io::stdout().lock();

    match &cli.command {
        Command::CreateDb => {
            let created = pgdata::create_db(url.as_deref()).await?;
            writeln!(out, "{}", if created { "created" } else { "exists" })?;
            return Ok(());
        }
        Command::DropDb => {
            let url = url
                .or_else(|| std::env::var("DATABASE_URL").ok())
                .context("drop-db needs --db-url or DATABASE_URL")?;
            let dropped = pgdata::drop_db(&url).await?;
            writeln!(out, "{}", if dropped { "dropped" } else { "absent" })?;
            return Ok(());
        }
        _ => {}
    }

    let db = pgdata::connect(url.as_deref(), database_options(&cli, settings)?)?;
    let result = run_with(&db, &cli.command, &mut out).await;
    db.close().await;
    result
}

async fn run_with(db: &Database, command: &Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Schemas => write_lines(out, &db.schemas().await?),
        Command::Tables => write_lines(out, &db.tables().await?),
        Command::CreateSchema { name } => {
            let created = db.create_schema(name).await?;
            writeln!(out, "{}", if created { "created" } else { "exists" })?;
            Ok(())
        }
        Command::DropSchema { name, cascade } => {
            let dropped = db.drop_schema(name, *cascade).await?;
            writeln!(out, "{}", if dropped { "dropped" } else { "absent" })?;
            Ok(())
        }
        Command::Count(args) => {
            let table = existing_table(db, &args.table).await?;
            let filter = build_filter(&table, &args.filters)?;
            writeln!(out, "{}", table.count(filter).await?)?;
            Ok(())
        }
        Command::Find(args) => find(db, args, out).await,
        Command::Ogr2pg(args) => ogr2pg(db, args, out).await,
        Command::Pg2ogr(args) => pg2ogr(db, args, out).await,
        Command::CreateDb | Command::DropDb => Ok(()),
    }
}

async fn existing_table(db: &Database, name: &str) -> Result<pgdata::Table> {
    db.load_table(name)
        .await?
        .with_context(|| format!("table '{}' does not exist", name))
}

async fn find(db: &Database, args: &FindArgs, out: &mut impl Write) -> Result<()> {
    let QueryArgs { table, filters } = &args.query;
    let table = existing_table(db, table).await?;

    let mut options = FindOptions::new()
        .filter(build_filter(&table, filters)?)
        .offset(args.offset)
        .step(Some(args.step));
    if !args.order_by.is_empty() {
        options = options.order_by(OrderBy::new(args.order_by.iter().cloned()));
    }
    if let Some(limit) = args.limit {
        options = options.limit(limit);
    }

    let rows = table.find(options).await?.into_stream();
    let page_size = usize::try_from(args.step)
        .ok()
        .filter(|&step| step > 0)
        .unwrap_or(usize::MAX);
    write_in_pages(rows, page_size, out).await?;
    Ok(())
}

/// Render rows as they arrive, one table per `page_size` rows
async fn write_in_pages<S>(rows: S, page_size: usize, out: &mut impl Write) -> Result<usize>
where
    S: Stream<Item = pgdata::Result<Record>>,
{
    let mut rows = pin!(rows);
    let mut page = Vec::new();
    let mut written = 0;
    while let Some(record) = rows.try_next().await? {
        page.push(record);
        if page.len() >= page_size {
            writeln!(out, "{}", render_records(&page))?;
            written += page.len();
            page.clear();
        }
    }
    if !page.is_empty() {
        writeln!(out, "{}", render_records(&page))?;
        written += page.len();
    }
    Ok(written)
}

async fn ogr2pg(db: &Database, args: &ImportArgs, out: &mut impl Write) -> Result<()> {
    let schema = args
        .target_schema
        .clone()
        .or_else(|| db.schema().map(str::to_string))
        .unwrap_or_else(|| pgdata::DEFAULT_SCHEMA.to_string());

    let mut options = ImportOptions::new(&args.in_file)
        .with_schema(schema)
        .with_t_srs(args.t_srs.clone())
        .with_append(args.append);
    if let Some(layer) = &args.in_layer {
        options = options.with_in_layer(layer.clone());
    }
    if let Some(layer) = &args.out_layer {
        options = options.with_out_layer(layer.clone());
    }
    if let Some(srs) = &args.s_srs {
        options = options.with_s_srs(srs.clone());
    }
    if let Some(sql) = &args.sql {
        options = options.with_sql(sql.clone());
    }

    if args.dry_run {
        writeln!(out, "{}", db.ogr2pg_command(&options)?)?;
        return Ok(());
    }
    db.ogr2pg(&options).await?;
    writeln!(
        out,
        "loaded {}.{}",
        options.schema,
        options.target_layer()?
    )?;
    Ok(())
}

fn export_options(args: &ExportArgs) -> Result<ExportOptions> {
    let mut options = ExportOptions::new(
        args.sql.clone(),
        OgrDriver::parse(&args.driver),
        args.outfile.clone(),
    )
    .with_append(args.append);
    for pair in &args.rename {
        let (from, to) = parse_pair(pair)?;
        options = options.with_remap(from, to);
    }
    if let Some(layer) = &args.outlayer {
        options = options.with_outlayer(layer.clone());
    }
    if let Some(geom_type) = &args.geom_type {
        options = options.with_geom_type(geom_type.clone());
    }
    if let Some(srs) = &args.t_srs {
        options = options.with_t_srs(srs.clone());
    }
    Ok(options)
}

async fn pg2ogr(db: &Database, args: &ExportArgs, out: &mut impl Write) -> Result<()> {
    let options = export_options(args)?;
    if args.dry_run {
        // still writes the VRT so the printed command can be run as-is
        writeln!(out, "{}", db.pg2ogr_command(&options).await?)?;
        return Ok(());
    }
    db.pg2ogr(&options).await?;
    writeln!(out, "wrote {}", args.outfile.display())?;
    Ok(())
}

fn write_lines(out: &mut impl Write, lines: &[String]) -> Result<()> {
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

/// Equality filter from `column=value` pairs, typed by the column's
/// PostgreSQL type
fn build_filter(table: &pgdata::Table, pairs: &[String]) -> Result<Filter> {
    let types = table.column_types()?;
    let mut filter = Filter::new();
    for pair in pairs {
        let (column, raw) = parse_pair(pair)?;
        let value = match types.get(&column) {
            Some(data_type) => typed_value(data_type, &raw)
                .with_context(|| format!("invalid value for column '{}'", column))?,
            // unknown columns are left to the handle's strictness
            None => Value::from(raw),
        };
        filter = filter.eq(column, value);
    }
    Ok(filter)
}

fn typed_value(data_type: &str, raw: &str) -> Result<Value> {
    if raw.eq_ignore_ascii_case("null") {
        return Ok(Value::Null);
    }
    let value = match data_type.to_ascii_lowercase().as_str() {
        "smallint" | "int2" => Value::Int16(raw.trim().parse()?),
        "integer" | "int" | "int4" => Value::Int32(raw.trim().parse()?),
        "bigint" | "int8" => Value::Int64(raw.trim().parse()?),
        "real" | "float4" => Value::Float32(raw.trim().parse()?),
        "double precision" | "float8" => Value::Float64(raw.trim().parse()?),
        "boolean" | "bool" => Value::Bool(raw.trim().parse()?),
        _ => Value::from(raw),
    };
    Ok(value)
}

fn render_records(rows: &[Record]) -> TextTable {
    let mut table = TextTable::new();
    table.load_preset(UTF8_FULL);
    if let Some(first) = rows.first() {
        table.set_header(first.keys());
    }
    for row in rows {
        table.add_row(row.values().map(Value::to_string));
    }
    table
}
