//! Read-through cache of named SQL files

use crate::{PgDataError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loads `<dir>/<name>.sql` on first access and keeps the text afterwards.
///
/// Cloning shares the underlying cache.
#[derive(Debug, Clone)]
pub struct QueryCache {
    dir: PathBuf,
    entries: Arc<RwLock<HashMap<String, Arc<str>>>>,
}

impl QueryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Directory queries are read from
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the SQL text for `name`, reading the file if not yet cached
    pub fn get(&self, name: &str) -> Result<Arc<str>> {
        if let Some(sql) = self.entries.read().get(name) {
            return Ok(sql.clone());
        }

        let path = self.dir.join(format!("{}.sql", name));
        let text = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                PgDataError::NotFound(format!("query file {}", path.display()))
            }
            _ => PgDataError::Io(e),
        })?;
        tracing::debug!(name, path = %path.display(), "loaded query file");

        let sql: Arc<str> = Arc::from(text);
        self.entries
            .write()
            .entry(name.to_string())
            .or_insert_with(|| sql.clone());
        Ok(sql)
    }

    /// Read every `*.sql` file in the directory into the cache.
    ///
    /// Returns the loaded query names, sorted.
    pub fn load_all(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                self.get(stem)?;
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Whether `name` has already been loaded
    pub fn is_cached(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }
}
