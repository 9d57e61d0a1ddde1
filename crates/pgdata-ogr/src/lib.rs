//! ogr2ogr integration for pgdata
//!
//! Builds the argument lists used to load geospatial files into PostGIS
//! and to dump PostGIS queries to files, writes the VRT descriptor used for
//! column renaming on export, and runs the resulting commands.

mod command;
mod runner;
mod vrt;

pub use command::*;
pub use runner::*;
pub use vrt::*;

/// Program name used when no binary is configured
pub const DEFAULT_OGR2OGR: &str = "ogr2ogr";
