//! Table handle: metadata, DDL, inserts and paged finds

use indexmap::IndexMap;
use pgdata_core::{ColumnInfo, IndexInfo, PgDataError, Record, Result, Row, Value};

use crate::database::{Database, introspection};
use crate::ddl::{IndexKind, create_index_sql, default_index_name, drop_table_sql};
use crate::filter::{Filter, OrderBy, Predicate, order_by_sql};
use crate::identifiers::{
    normalize_column_name, quote, quote_qualified, truncate_identifier, valid_identifier,
};
use crate::paging::{DEFAULT_STEP, PagePlan, ResultIter};

/// Rows per `execute_many` batch in [`Table::insert_many`]
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Active,
    /// Dropped, or never existed; only `drop` and `exists` may be called
    Dropped,
}

/// Arguments to [`Table::find`]
#[derive(Debug, Clone, PartialEq)]
pub struct FindOptions {
    pub filter: Filter,
    /// `None` orders by `id` when the table has one
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub offset: u64,
    /// Rows per page query; `None` or 0 fetches everything in one query
    pub step: Option<u64>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            filter: Filter::new(),
            order_by: None,
            limit: None,
            offset: 0,
            step: Some(DEFAULT_STEP),
        }
    }
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, order_by: impl Into<OrderBy>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn step(mut self, step: Option<u64>) -> Self {
        self.step = step;
        self
    }
}

/// Compiled parts of a find query
struct FindQuery {
    predicate: Predicate,
    order_terms: Vec<String>,
}

/// A handle to one table.
///
/// Column, primary key and index metadata are read when the handle is
/// built and refreshed only by DDL issued through this handle.
#[derive(Debug)]
pub struct Table {
    db: Database,
    schema: String,
    name: String,
    state: TableState,
    columns: Vec<ColumnInfo>,
    primary_key: Vec<String>,
    indexes: IndexMap<String, IndexInfo>,
}

impl Table {
    pub(crate) async fn load(db: Database, schema: &str, name: &str) -> Result<Self> {
        let mut table = Self {
            db,
            schema: schema.to_string(),
            name: name.to_string(),
            state: TableState::Active,
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: IndexMap::new(),
        };
        table.refresh().await?;
        Ok(table)
    }

    /// A handle for a table that does not exist
    pub(crate) fn dropped(db: Database, schema: &str, name: &str) -> Self {
        Self {
            db,
            schema: schema.to_string(),
            name: name.to_string(),
            state: TableState::Dropped,
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: IndexMap::new(),
        }
    }

    async fn refresh(&mut self) -> Result<()> {
        let (columns, primary_key, indexes) = {
            let conn = self.db.lease().await?;
            let schema = introspection(&*conn)?;
            let mut columns = schema.get_columns(Some(&self.schema), &self.name).await?;
            let primary_key = schema
                .get_primary_key(Some(&self.schema), &self.name)
                .await?
                .map(|pk| pk.columns)
                .unwrap_or_default();
            let indexes = schema.get_indexes(Some(&self.schema), &self.name).await?;
            columns.sort_by_key(|c| c.ordinal);
            (columns, primary_key, indexes)
        };

        self.columns = columns;
        self.primary_key = primary_key;
        self.indexes = indexes.into_iter().map(|i| (i.name.clone(), i)).collect();
        Ok(())
    }

    fn check_active(&self) -> Result<()> {
        match self.state {
            TableState::Active => Ok(()),
            TableState::Dropped => Err(PgDataError::TableDropped(self.qualified_name())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// `schema.table`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    pub fn is_dropped(&self) -> bool {
        self.state == TableState::Dropped
    }

    fn sql_name(&self) -> String {
        quote_qualified(&self.schema, &self.name)
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Column names in ordinal order
    pub fn columns(&self) -> Result<Vec<String>> {
        self.check_active()?;
        Ok(self.column_names())
    }

    /// Column name → PostgreSQL type name
    pub fn column_types(&self) -> Result<IndexMap<String, String>> {
        self.check_active()?;
        Ok(self
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.data_type.clone()))
            .collect())
    }

    pub fn primary_key(&self) -> Result<&[String]> {
        self.check_active()?;
        Ok(&self.primary_key)
    }

    /// Indexes by name
    pub fn indexes(&self) -> Result<&IndexMap<String, IndexInfo>> {
        self.check_active()?;
        Ok(&self.indexes)
    }

    /// Whether the table currently exists in the database
    pub async fn exists(&self) -> Result<bool> {
        let conn = self.db.lease().await?;
        introspection(&*conn)?
            .table_exists(Some(&self.schema), &self.name)
            .await
    }

    /// Add a column unless one with the same normalized name exists;
    /// returns whether it was added
    #[tracing::instrument(skip(self), fields(table = %self.qualified_name()))]
    pub async fn add_column(&mut self, name: &str, data_type: &str) -> Result<bool> {
        self.check_active()?;
        let normalized = normalize_column_name(name)?;
        let exists = self
            .columns
            .iter()
            .any(|c| c.name.to_lowercase() == normalized);
        if exists {
            return Ok(false);
        }

        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.sql_name(),
            quote(&normalized),
            data_type
        );
        self.db.execute(&sql, &[]).await?;
        tracing::info!(column = %normalized, %data_type, "added column");
        self.refresh().await?;
        Ok(true)
    }

    /// Drop a column if present; returns whether it was dropped
    #[tracing::instrument(skip(self), fields(table = %self.qualified_name()))]
    pub async fn drop_column(&mut self, name: &str) -> Result<bool> {
        self.check_active()?;
        if !self.has_column(name) {
            return Ok(false);
        }
        let sql = format!("ALTER TABLE {} DROP COLUMN {}", self.sql_name(), quote(name));
        self.db.execute(&sql, &[]).await?;
        tracing::info!(column = %name, "dropped column");
        self.refresh().await?;
        Ok(true)
    }

    /// Add a primary key on `column` unless the table already has one
    pub async fn add_primary_key(&mut self, column: &str) -> Result<bool> {
        self.check_active()?;
        if !self.primary_key.is_empty() {
            return Ok(false);
        }
        if !self.has_column(column) {
            return Err(self.unknown_column(column));
        }
        let sql = format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({})",
            self.sql_name(),
            quote(column)
        );
        self.db.execute(&sql, &[]).await?;
        self.refresh().await?;
        Ok(true)
    }

    /// Create an index, or return the existing one of the same name.
    ///
    /// Without a name, one is derived from the columns and kind, so
    /// repeated calls are idempotent.
    #[tracing::instrument(skip(self), fields(table = %self.qualified_name()))]
    pub async fn create_index(
        &mut self,
        columns: &[&str],
        name: Option<&str>,
        kind: IndexKind,
    ) -> Result<IndexInfo> {
        self.check_active()?;
        if columns.is_empty() {
            return Err(PgDataError::Schema("an index needs at least one column".into()));
        }
        if let Some(unknown) = columns.iter().find(|c| !self.has_column(c)) {
            return Err(self.unknown_column(unknown));
        }

        let name = match name {
            Some(name) => truncate_identifier(valid_identifier(name)?).to_string(),
            None => default_index_name(&self.name, columns, kind),
        };
        if let Some(existing) = self.indexes.get(&name) {
            tracing::debug!(index = %name, "index exists");
            return Ok(existing.clone());
        }

        let sql = create_index_sql(&self.schema, &self.name, &name, columns, kind);
        self.db.execute(&sql, &[]).await?;
        tracing::info!(index = %name, kind = %kind, "created index");

        let index = IndexInfo {
            name: name.clone(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            is_unique: false,
            is_primary: false,
            index_type: kind.as_str().to_string(),
        };
        self.indexes.insert(name, index.clone());
        Ok(index)
    }

    /// GiST index on a geometry column
    pub async fn create_index_geom(&mut self, column: &str) -> Result<IndexInfo> {
        self.create_index(&[column], None, IndexKind::Gist).await
    }

    /// Distinct values of `columns`, ascending, optionally filtered
    #[tracing::instrument(skip(self, filter), fields(table = %self.qualified_name()))]
    pub async fn distinct(&self, columns: &[&str], filter: &Filter) -> Result<Vec<Record>> {
        self.check_active()?;
        if let Some(unknown) = columns.iter().find(|c| !self.has_column(c)) {
            if self.db.is_strict() {
                return Err(self.unknown_column(unknown));
            }
            return Ok(Vec::new());
        }
        let predicate = self.compile(filter)?;
        if predicate.matches_nothing() || columns.is_empty() {
            return Ok(Vec::new());
        }

        let cols: Vec<String> = columns.iter().map(|c| quote(c)).collect();
        let order: Vec<String> = cols.iter().map(|c| format!("{} ASC", c)).collect();
        let sql = format!(
            "SELECT DISTINCT {} FROM {}{}{}",
            cols.join(", "),
            self.sql_name(),
            predicate.where_sql(),
            order_by_sql(&order)
        );
        let result = self.db.query(&sql, predicate.params()).await?;
        Ok(result.rows.into_iter().map(Row::into_record).collect())
    }

    /// Insert one row; returns the first primary key value when the table
    /// has a primary key
    #[tracing::instrument(skip(self, record), fields(table = %self.qualified_name()))]
    pub async fn insert(&self, record: &Record) -> Result<Option<Value>> {
        self.check_active()?;
        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        let mut sql = self.insert_sql(&keys)?;
        let params: Vec<Value> = record.values().cloned().collect();

        match self.primary_key.first() {
            Some(pk) => {
                sql.push_str(&format!(" RETURNING {}", quote(pk)));
                let result = self.db.query(&sql, &params).await?;
                Ok(result.scalar().cloned())
            }
            None => {
                self.db.execute(&sql, &params).await?;
                Ok(None)
            }
        }
    }

    /// Insert rows in chunks of `chunk_size`; consecutive rows with the same
    /// keys share one prepared statement
    #[tracing::instrument(skip(self, records), fields(table = %self.qualified_name(), rows = records.len()))]
    pub async fn insert_many(&self, records: &[Record], chunk_size: usize) -> Result<u64> {
        self.check_active()?;
        let mut affected = 0;
        for chunk in records.chunks(chunk_size.max(1)) {
            let mut start = 0;
            while start < chunk.len() {
                let keys: Vec<&str> = chunk[start].keys().map(String::as_str).collect();
                let end = chunk[start..]
                    .iter()
                    .position(|r| !r.keys().map(String::as_str).eq(keys.iter().copied()))
                    .map_or(chunk.len(), |n| start + n);

                let sql = self.insert_sql(&keys)?;
                let param_sets: Vec<Vec<Value>> = chunk[start..end]
                    .iter()
                    .map(|r| r.values().cloned().collect())
                    .collect();
                affected += self.db.execute_many(&sql, &param_sets).await?;
                start = end;
            }
        }
        tracing::debug!(affected, "insert_many completed");
        Ok(affected)
    }

    fn insert_sql(&self, keys: &[&str]) -> Result<String> {
        if let Some(unknown) = keys.iter().find(|k| !self.has_column(k)) {
            return Err(self.unknown_column(unknown));
        }
        if keys.is_empty() {
            return Ok(format!("INSERT INTO {} DEFAULT VALUES", self.sql_name()));
        }
        let cols: Vec<String> = keys.iter().map(|k| quote(k)).collect();
        let placeholders: Vec<String> = (1..=keys.len()).map(|i| format!("${}", i)).collect();
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.sql_name(),
            cols.join(", "),
            placeholders.join(", ")
        ))
    }

    #[tracing::instrument(skip(self), fields(table = %self.qualified_name()))]
    pub async fn rename(&mut self, new_name: &str) -> Result<()> {
        self.check_active()?;
        let new_name = valid_identifier(new_name)?.to_string();
        let sql = format!("ALTER TABLE {} RENAME TO {}", self.sql_name(), quote(&new_name));
        self.db.execute(&sql, &[]).await?;
        tracing::info!(%new_name, "renamed table");
        self.name = new_name;
        self.refresh().await
    }

    /// Drop the table. Idempotent; the handle is unusable afterwards.
    #[tracing::instrument(skip(self), fields(table = %self.qualified_name()))]
    pub async fn drop(&mut self) -> Result<()> {
        if self.state == TableState::Dropped {
            return Ok(());
        }
        self.db
            .execute(&drop_table_sql(&self.schema, &self.name), &[])
            .await?;
        tracing::info!("dropped table");
        self.state = TableState::Dropped;
        self.columns.clear();
        self.primary_key.clear();
        self.indexes.clear();
        Ok(())
    }

    fn unknown_column(&self, column: &str) -> PgDataError {
        PgDataError::UnknownColumn {
            table: self.qualified_name(),
            column: column.to_string(),
        }
    }

    fn compile(&self, filter: &Filter) -> Result<Predicate> {
        filter.compile(
            &self.qualified_name(),
            &self.column_names(),
            self.db.is_strict(),
            1,
        )
    }

    /// `None` when the filter can match nothing
    fn prepare_find(&self, options: &FindOptions) -> Result<Option<FindQuery>> {
        let predicate = self.compile(&options.filter)?;
        if predicate.matches_nothing() {
            return Ok(None);
        }
        let columns = self.column_names();
        let order_terms = match &options.order_by {
            Some(order_by) => {
                order_by.resolve(&self.qualified_name(), &columns, self.db.is_strict())?
            }
            // the implicit `id` ordering never fails
            None => OrderBy::default().resolve(&self.qualified_name(), &columns, false)?,
        };
        Ok(Some(FindQuery {
            predicate,
            order_terms,
        }))
    }

    /// Rows the find will yield: the filtered set with limit and offset
    /// applied
    async fn count_query(&self, query: &FindQuery, options: &FindOptions) -> Result<u64> {
        let mut inner = format!(
            "SELECT * FROM {}{}",
            self.sql_name(),
            query.predicate.where_sql()
        );
        if let Some(limit) = options.limit {
            inner.push_str(&format!(" LIMIT {}", limit));
        }
        inner.push_str(&format!(" OFFSET {}", options.offset));

        let sql = format!("SELECT count(*) FROM ({}) AS count_query", inner);
        let result = self.db.query(&sql, query.predicate.params()).await?;
        let count = result.scalar().and_then(Value::as_i64).unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Matching rows, fetched lazily one page at a time
    #[tracing::instrument(skip(self, options), fields(table = %self.qualified_name()))]
    pub async fn find(&self, options: FindOptions) -> Result<ResultIter> {
        self.check_active()?;
        let Some(query) = self.prepare_find(&options)? else {
            return Ok(ResultIter::empty());
        };

        let total = self.count_query(&query, &options).await?;
        // the count already reflects limit and offset
        let plan = PagePlan::new(
            total,
            None,
            options.offset,
            options.step,
            !query.order_terms.is_empty(),
        );
        tracing::debug!(total, pages = plan.len(), "planned find");

        let select_sql = format!(
            "SELECT * FROM {}{}{}",
            self.sql_name(),
            query.predicate.where_sql(),
            order_by_sql(&query.order_terms)
        );
        let params = query.predicate.params().to_vec();
        Ok(ResultIter::new(self.db.clone(), select_sql, params, plan))
    }

    /// First matching row
    pub async fn find_one(&self, options: FindOptions) -> Result<Option<Record>> {
        let mut rows = self.find(options.limit(1)).await?;
        rows.next().await
    }

    /// Number of rows `find` would yield, without fetching any
    pub async fn find_count(&self, options: &FindOptions) -> Result<u64> {
        self.check_active()?;
        match self.prepare_find(options)? {
            Some(query) => self.count_query(&query, options).await,
            None => Ok(0),
        }
    }

    pub async fn count(&self, filter: Filter) -> Result<u64> {
        self.find_count(&FindOptions::new().filter(filter)).await
    }

    /// Every row, ordered by `id` when present
    pub async fn all(&self) -> Result<ResultIter> {
        self.find(FindOptions::new()).await
    }
}

#[cfg(test)]
mod tests;
