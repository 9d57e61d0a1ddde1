//! Argument assembly for ogr2ogr imports and exports

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use pgdata_core::{ConnectionConfig, PgDataError, Result};

/// A program and its argument list, ready to spawn without a shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OgrCommand {
    program: String,
    args: Vec<String>,
}

impl OgrCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// True if `flag` appears as a standalone argument
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// The argument following the first occurrence of `flag`
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        let pos = self.args.iter().position(|a| a == flag)?;
        self.args.get(pos + 1).map(String::as_str)
    }
}

/// Renders a shell-pasteable command line
impl fmt::Display for OgrCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '*' | ';' | '<' | '>' | '|' | '&'));
    if needs_quotes {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

/// Output format for exports
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OgrDriver {
    Shapefile,
    GeoJson,
    Gpkg,
    FileGdb,
    /// Any other OGR driver, passed through by name
    Other(String),
}

impl OgrDriver {
    /// Parse an OGR driver name; unknown names are kept as `Other`
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "esri shapefile" | "shapefile" | "shp" => OgrDriver::Shapefile,
            "geojson" | "json" => OgrDriver::GeoJson,
            "gpkg" | "geopackage" => OgrDriver::Gpkg,
            "filegdb" | "gdb" => OgrDriver::FileGdb,
            _ => OgrDriver::Other(name.trim().to_string()),
        }
    }

    /// Name as passed to `-f`
    pub fn name(&self) -> &str {
        match self {
            OgrDriver::Shapefile => "ESRI Shapefile",
            OgrDriver::GeoJson => "GeoJSON",
            OgrDriver::Gpkg => "GPKG",
            OgrDriver::FileGdb => "FileGDB",
            OgrDriver::Other(name) => name,
        }
    }

    /// Formats holding several layers in one file, which ogr2ogr must open
    /// with `-update` when the file already exists
    pub fn supports_multiple_layers(&self) -> bool {
        matches!(self, OgrDriver::Gpkg | OgrDriver::FileGdb)
    }

    /// Target SRS used when the caller gives none
    pub fn default_target_srs(&self) -> &'static str {
        match self {
            OgrDriver::GeoJson => "EPSG:4326",
            _ => DEFAULT_SRS,
        }
    }
}

impl fmt::Display for OgrDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// BC Albers
pub const DEFAULT_SRS: &str = "EPSG:3005";

/// File stem of `path`, or a configuration error when there is none
pub fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            PgDataError::Configuration(format!("cannot derive a layer name from {:?}", path))
        })
}

fn pg_datasource(config: &ConnectionConfig) -> String {
    format!("PG:{}", config.credential_string())
}

/// Options for loading a file into a PostGIS table
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub in_file: PathBuf,
    /// Source layer; defaults to the input file stem
    pub in_layer: Option<String>,
    /// Target table; defaults to the source layer lower-cased
    pub out_layer: Option<String>,
    pub schema: String,
    pub s_srs: Option<String>,
    pub t_srs: String,
    /// Row filter in the SQLite dialect, applied as
    /// `SELECT * FROM <in_layer> WHERE <sql>`
    pub sql: Option<String>,
    pub dim: u8,
    pub geometry_name: String,
    pub spatial_index: bool,
    pub fid_column: Option<String>,
    pub fid64: bool,
    pub promote_to_multi: bool,
    pub append: bool,
}

impl ImportOptions {
    pub fn new(in_file: impl Into<PathBuf>) -> Self {
        Self {
            in_file: in_file.into(),
            in_layer: None,
            out_layer: None,
            schema: "public".to_string(),
            s_srs: None,
            t_srs: DEFAULT_SRS.to_string(),
            sql: None,
            dim: 2,
            geometry_name: "geom".to_string(),
            spatial_index: true,
            fid_column: None,
            fid64: false,
            promote_to_multi: true,
            append: false,
        }
    }

    pub fn with_in_layer(mut self, layer: impl Into<String>) -> Self {
        self.in_layer = Some(layer.into());
        self
    }

    pub fn with_out_layer(mut self, layer: impl Into<String>) -> Self {
        self.out_layer = Some(layer.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn with_t_srs(mut self, srs: impl Into<String>) -> Self {
        self.t_srs = srs.into();
        self
    }

    pub fn with_s_srs(mut self, srs: impl Into<String>) -> Self {
        self.s_srs = Some(srs.into());
        self
    }

    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn source_layer(&self) -> Result<String> {
        match &self.in_layer {
            Some(layer) if !layer.trim().is_empty() => Ok(layer.clone()),
            _ => file_stem(&self.in_file),
        }
    }

    pub fn target_layer(&self) -> Result<String> {
        match &self.out_layer {
            Some(layer) if !layer.trim().is_empty() => Ok(layer.clone()),
            _ => Ok(self.source_layer()?.to_lowercase()),
        }
    }

    /// Build the `ogr2ogr` invocation writing into the database described
    /// by `config`
    pub fn build(&self, program: &str, config: &ConnectionConfig) -> Result<OgrCommand> {
        if self.schema.trim().is_empty() {
            return Err(PgDataError::InvalidIdentifier(self.schema.clone()));
        }
        let in_layer = self.source_layer()?;
        let out_layer = self.target_layer()?;

        let mut cmd = OgrCommand::new(program);
        cmd.args(["--config", "PG_USE_COPY", "YES"]);
        if let Some(s_srs) = &self.s_srs {
            cmd.args(["-s_srs", s_srs.as_str()]);
        }
        cmd.args(["-t_srs", self.t_srs.as_str()]);
        cmd.args(["-f", "PostgreSQL"]);
        cmd.arg(pg_datasource(config));

        if let Some(sql) = &self.sql {
            cmd.arg("-sql")
                .arg(format!("SELECT * FROM {} WHERE {}", in_layer, sql))
                .args(["-dialect", "SQLITE"]);
        }

        if self.append {
            cmd.arg("-append");
        } else {
            cmd.args(["-lco", "OVERWRITE=YES", "-overwrite"]);
        }
        cmd.arg("-lco").arg(format!("SCHEMA={}", self.schema));
        cmd.arg("-lco")
            .arg(format!("GEOMETRY_NAME={}", self.geometry_name));
        if !self.spatial_index {
            cmd.args(["-lco", "SPATIAL_INDEX=NONE"]);
        }
        if let Some(fid) = &self.fid_column {
            cmd.arg("-lco").arg(format!("FID={}", fid));
        }
        if self.fid64 {
            cmd.args(["-lco", "FID64=TRUE"]);
        }
        cmd.arg("-dim").arg(self.dim.to_string());
        cmd.arg("-nln").arg(out_layer);
        if self.promote_to_multi {
            cmd.args(["-nlt", "PROMOTE_TO_MULTI"]);
        }

        cmd.arg(self.in_file.to_string_lossy());
        // -sql names the source layer itself
        if self.sql.is_none() {
            cmd.arg(in_layer);
        }
        Ok(cmd)
    }
}

/// Options for dumping a PostGIS query to a file
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub sql: String,
    pub driver: OgrDriver,
    pub outfile: PathBuf,
    /// Layer name; defaults to the output file stem
    pub outlayer: Option<String>,
    /// Output column renames, source name to new name
    pub column_remap: IndexMap<String, String>,
    pub geometry_column: String,
    pub s_srs: String,
    /// Target SRS; defaults per driver
    pub t_srs: Option<String>,
    /// Geometry type passed as `-nlt`; required for FileGDB
    pub geom_type: Option<String>,
    pub append: bool,
}

impl ExportOptions {
    pub fn new(sql: impl Into<String>, driver: OgrDriver, outfile: impl Into<PathBuf>) -> Self {
        Self {
            sql: sql.into(),
            driver,
            outfile: outfile.into(),
            outlayer: None,
            column_remap: IndexMap::new(),
            geometry_column: "geom".to_string(),
            s_srs: DEFAULT_SRS.to_string(),
            t_srs: None,
            geom_type: None,
            append: false,
        }
    }

    pub fn with_outlayer(mut self, layer: impl Into<String>) -> Self {
        self.outlayer = Some(layer.into());
        self
    }

    pub fn with_remap(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.column_remap.insert(from.into(), to.into());
        self
    }

    pub fn with_geom_type(mut self, geom_type: impl Into<String>) -> Self {
        self.geom_type = Some(geom_type.into());
        self
    }

    pub fn with_t_srs(mut self, srs: impl Into<String>) -> Self {
        self.t_srs = Some(srs.into());
        self
    }

    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    /// Reject combinations ogr2ogr cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.driver == OgrDriver::FileGdb && self.geom_type.is_none() {
            return Err(PgDataError::UnsupportedConfiguration(
                "geom_type is required when writing to FileGDB".into(),
            ));
        }
        if self.sql.trim().is_empty() {
            return Err(PgDataError::Configuration("export query is empty".into()));
        }
        Ok(())
    }

    pub fn layer_name(&self) -> Result<String> {
        match &self.outlayer {
            Some(layer) if !layer.trim().is_empty() => Ok(layer.clone()),
            _ => file_stem(&self.outfile),
        }
    }

    pub fn target_srs(&self) -> &str {
        self.t_srs
            .as_deref()
            .unwrap_or_else(|| self.driver.default_target_srs())
    }

    /// `(new_name, source_name)` for every output column except the
    /// geometry column; unmapped columns keep their name
    pub fn field_mappings(&self, columns: &[String]) -> Vec<(String, String)> {
        columns
            .iter()
            .filter(|c| **c != self.geometry_column)
            .map(|c| {
                let target = self.column_remap.get(c).unwrap_or(c);
                (target.clone(), c.clone())
            })
            .collect()
    }

    /// Build the `ogr2ogr` invocation reading from the VRT at `vrt_path`
    pub fn build(&self, program: &str, vrt_path: &Path) -> Result<OgrCommand> {
        self.validate()?;

        let mut cmd = OgrCommand::new(program);
        cmd.args(["-s_srs", self.s_srs.as_str()]);
        cmd.args(["-t_srs", self.target_srs()]);
        cmd.arg("-progress");
        cmd.args(["-f", self.driver.name()]);
        if let Some(geom_type) = &self.geom_type {
            cmd.args(["-nlt", geom_type.as_str()]);
        }
        if self.append {
            cmd.arg("-append");
        }
        if self.driver.supports_multiple_layers() && self.outfile.exists() {
            cmd.arg("-update");
        }
        cmd.arg(self.outfile.to_string_lossy());
        cmd.arg(vrt_path.to_string_lossy());
        Ok(cmd)
    }
}
