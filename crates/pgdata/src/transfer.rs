//! Geospatial import and export through ogr2ogr

use pgdata_core::Result;
use pgdata_ogr::{ExportOptions, ImportOptions, OgrCommand, OgrOutput, VrtLayer, file_stem};

use crate::database::Database;

impl Database {
    /// The `ogr2ogr` command [`Database::ogr2pg`] would run
    pub fn ogr2pg_command(&self, options: &ImportOptions) -> Result<OgrCommand> {
        options.build(self.ogr_binary(), self.config())
    }

    /// Load a geospatial file into a table of this database
    #[tracing::instrument(skip(self, options), fields(in_file = %options.in_file.display(), schema = %options.schema))]
    pub async fn ogr2pg(&self, options: &ImportOptions) -> Result<OgrOutput> {
        let command = self.ogr2pg_command(options)?;
        tracing::info!(layer = %options.target_layer()?, "loading file");
        self.ogr_runner().run(&command).await
    }

    /// Write the export VRT and return the `ogr2ogr` command that reads it.
    ///
    /// With a column remap, the query is run once with `LIMIT 0` to learn
    /// its output columns.
    pub async fn pg2ogr_command(&self, options: &ExportOptions) -> Result<OgrCommand> {
        options.validate()?;
        let layer = options.layer_name()?;
        let stem = file_stem(&options.outfile)?;

        let fields = if options.column_remap.is_empty() {
            Vec::new()
        } else {
            let sql = format!(
                "SELECT * FROM ({}) AS q LIMIT 0",
                options.sql.trim().trim_end_matches(';')
            );
            let columns = self.query(&sql, &[]).await?.column_names();
            options.field_mappings(&columns)
        };

        let vrt_path = VrtLayer::new(&layer, self.config(), &options.sql)
            .with_fields(fields)
            .write_temp(&stem)?;
        options.build(self.ogr_binary(), &vrt_path)
    }

    /// Dump a query to a geospatial file
    #[tracing::instrument(skip(self, options), fields(driver = %options.driver, outfile = %options.outfile.display()))]
    pub async fn pg2ogr(&self, options: &ExportOptions) -> Result<OgrOutput> {
        let command = self.pg2ogr_command(options).await?;
        tracing::info!("exporting query");
        self.ogr_runner().run(&command).await
    }
}
