//! OGR virtual layer (VRT) descriptors
//!
//! An export reads from a VRT whose source is the live database connection
//! and the query text, which lets output columns be renamed on the way out.

use std::path::{Path, PathBuf};

use pgdata_core::{ConnectionConfig, Result};

/// A single-layer VRT backed by a PostgreSQL query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrtLayer {
    pub name: String,
    pub datasource: String,
    pub sql: String,
    /// `(name, src)` field declarations, empty to keep every column as is
    pub fields: Vec<(String, String)>,
}

impl VrtLayer {
    pub fn new(name: &str, config: &ConnectionConfig, sql: &str) -> Self {
        Self {
            name: name.to_string(),
            datasource: format!("PG:{}", config.credential_string()),
            sql: sql.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: Vec<(String, String)>) -> Self {
        self.fields = fields;
        self
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<OGRVRTDataSource>\n");
        xml.push_str(&format!(
            "  <OGRVRTLayer name=\"{}\">\n",
            escape_xml(&self.name)
        ));
        xml.push_str(&format!(
            "    <SrcDataSource>{}</SrcDataSource>\n",
            escape_xml(&self.datasource)
        ));
        xml.push_str(&format!(
            "    <SrcSQL>{}</SrcSQL>\n",
            escape_xml(&flatten_newlines(&self.sql))
        ));
        for (name, src) in &self.fields {
            xml.push_str(&format!(
                "    <Field name=\"{}\" src=\"{}\"/>\n",
                escape_xml(name),
                escape_xml(src)
            ));
        }
        xml.push_str("  </OGRVRTLayer>\n</OGRVRTDataSource>\n");
        xml
    }

    /// Write the descriptor as `<dir>/<stem>.vrt`, replacing any stale file
    pub fn write_to(&self, dir: &Path, stem: &str) -> Result<PathBuf> {
        let path = dir.join(format!("{}.vrt", stem));
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        std::fs::write(&path, self.to_xml())?;
        tracing::debug!(path = %path.display(), layer = %self.name, "wrote VRT");
        Ok(path)
    }

    /// Write the descriptor under the system temp directory.
    ///
    /// Concurrent exports to files sharing a stem overwrite each other's VRT.
    pub fn write_temp(&self, stem: &str) -> Result<PathBuf> {
        self.write_to(&std::env::temp_dir(), stem)
    }
}

fn flatten_newlines(sql: &str) -> String {
    sql.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

pub fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
