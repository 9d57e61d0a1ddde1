//! Filter and ordering clauses for table queries
//!
//! A [`Filter`] maps column names to an equality or membership test and
//! compiles to a parameterised `WHERE` fragment. Placeholders are numbered
//! from a caller-supplied start so fragments compose with other
//! parameters.

use indexmap::IndexMap;
use pgdata_core::{PgDataError, Result, Value};

use crate::identifiers::quote;

/// The test applied to one column
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// `col = value`, or `col IS NULL` for [`Value::Null`]
    Eq(Value),
    /// `col = ANY(values)`; an empty list matches nothing
    In(Vec<Value>),
}

/// Ordered column → test mapping, combined with `AND`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    entries: IndexMap<String, FilterValue>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match rows where `column` equals `value`
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .insert(column.into(), FilterValue::Eq(value.into()));
        self
    }

    /// Match rows where `column` is one of `values`
    pub fn any<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.entries.insert(column.into(), FilterValue::In(values));
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: FilterValue) {
        self.entries.insert(column.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.entries.iter()
    }

    /// Compile against the columns of `table`.
    ///
    /// A column not in `columns` fails with `UnknownColumn` when `strict`,
    /// and otherwise yields [`Predicate::Nothing`].
    pub fn compile(
        &self,
        table: &str,
        columns: &[String],
        strict: bool,
        first_param: usize,
    ) -> Result<Predicate> {
        if self.entries.is_empty() {
            return Ok(Predicate::All);
        }

        let mut clauses = Vec::with_capacity(self.entries.len());
        let mut params = Vec::new();

        for (column, test) in &self.entries {
            if !columns.iter().any(|c| c == column) {
                if strict {
                    return Err(PgDataError::UnknownColumn {
                        table: table.to_string(),
                        column: column.clone(),
                    });
                }
                tracing::debug!(%table, %column, "filter names an unknown column; no rows match");
                return Ok(Predicate::Nothing);
            }

            let col = quote(column);
            match test {
                FilterValue::Eq(Value::Null) => clauses.push(format!("{} IS NULL", col)),
                FilterValue::Eq(value) => {
                    params.push(value.clone());
                    clauses.push(format!("{} = ${}", col, first_param + params.len() - 1));
                }
                FilterValue::In(values) if values.is_empty() => clauses.push("FALSE".to_string()),
                FilterValue::In(values) => {
                    params.push(Value::Array(values.clone()));
                    clauses.push(format!(
                        "{} = ANY(${})",
                        col,
                        first_param + params.len() - 1
                    ));
                }
            }
        }

        Ok(Predicate::Where {
            sql: clauses.join(" AND "),
            params,
        })
    }
}

/// A compiled filter
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// No filter; every row matches
    All,
    /// The filter can match no row; callers skip the query entirely
    Nothing,
    Where { sql: String, params: Vec<Value> },
}

impl Predicate {
    /// `" WHERE ..."`, or an empty string when every row matches
    pub fn where_sql(&self) -> String {
        match self {
            Predicate::All => String::new(),
            Predicate::Nothing => " WHERE FALSE".to_string(),
            Predicate::Where { sql, .. } => format!(" WHERE {}", sql),
        }
    }

    pub fn params(&self) -> &[Value] {
        match self {
            Predicate::Where { params, .. } => params,
            _ => &[],
        }
    }

    pub fn matches_nothing(&self) -> bool {
        matches!(self, Predicate::Nothing)
    }
}

/// Ordering keys; a leading `-` sorts that key descending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy(Vec<String>);

impl OrderBy {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }

    /// No ordering
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn keys(&self) -> &[String] {
        &self.0
    }

    /// Resolve keys to `"col" ASC|DESC` terms.
    ///
    /// Keys naming no column of the table are dropped, or fail with
    /// `UnknownColumn` when `strict`.
    pub fn resolve(&self, table: &str, columns: &[String], strict: bool) -> Result<Vec<String>> {
        let mut terms = Vec::with_capacity(self.0.len());
        for key in &self.0 {
            let (column, direction) = match key.strip_prefix('-') {
                Some(column) => (column, "DESC"),
                None => (key.as_str(), "ASC"),
            };
            if columns.iter().any(|c| c == column) {
                terms.push(format!("{} {}", quote(column), direction));
            } else if strict {
                return Err(PgDataError::UnknownColumn {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            } else {
                tracing::debug!(%table, %column, "dropping unknown ordering column");
            }
        }
        Ok(terms)
    }
}

impl Default for OrderBy {
    fn default() -> Self {
        Self(vec!["id".to_string()])
    }
}

impl From<&str> for OrderBy {
    fn from(key: &str) -> Self {
        Self(vec![key.to_string()])
    }
}

impl From<Vec<&str>> for OrderBy {
    fn from(keys: Vec<&str>) -> Self {
        Self::new(keys)
    }
}

/// `" ORDER BY a ASC, b DESC"`, or empty
pub(crate) fn order_by_sql(terms: &[String]) -> String {
    if terms.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", terms.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn columns() -> Vec<String> {
        vec!["id".into(), "name".into(), "dept".into()]
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let predicate = Filter::new()
            .compile("employees", &columns(), false, 1)
            .expect("compile");
        assert_eq!(predicate, Predicate::All);
        assert_eq!(predicate.where_sql(), "");
        assert!(predicate.params().is_empty());
    }

    #[test]
    fn test_scalar_and_list_compile_to_conjunction() {
        let predicate = Filter::new()
            .eq("name", "Fred")
            .any("id", [1i32, 3])
            .compile("employees", &columns(), false, 1)
            .expect("compile");

        assert_eq!(
            predicate.where_sql(),
            " WHERE \"name\" = $1 AND \"id\" = ANY($2)"
        );
        assert_eq!(
            predicate.params(),
            [
                Value::from("Fred"),
                Value::Array(vec![Value::Int32(1), Value::Int32(3)])
            ]
        );
    }

    #[test]
    fn test_placeholders_start_at_offset() {
        let predicate = Filter::new()
            .eq("dept", "ops")
            .compile("employees", &columns(), false, 4)
            .expect("compile");
        assert_eq!(predicate.where_sql(), " WHERE \"dept\" = $4");
    }

    #[test]
    fn test_null_and_empty_list() {
        let predicate = Filter::new()
            .eq("dept", Value::Null)
            .any("id", Vec::<i64>::new())
            .compile("employees", &columns(), false, 1)
            .expect("compile");
        assert_eq!(predicate.where_sql(), " WHERE \"dept\" IS NULL AND FALSE");
        assert!(predicate.params().is_empty());
    }

    #[test]
    fn test_unknown_column_lenient_matches_nothing() {
        let predicate = Filter::new()
            .eq("salary", 10i64)
            .compile("employees", &columns(), false, 1)
            .expect("compile");
        assert!(predicate.matches_nothing());
    }

    #[test]
    fn test_unknown_column_strict_fails() {
        let result = Filter::new()
            .eq("salary", 10i64)
            .compile("employees", &columns(), true, 1);
        match result {
            Err(PgDataError::UnknownColumn { table, column }) => {
                assert_eq!(table, "employees");
                assert_eq!(column, "salary");
            }
            other => panic!("expected UnknownColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_order_by_resolution() {
        let terms = OrderBy::new(["-id", "bogus", "name"])
            .resolve("employees", &columns(), false)
            .expect("resolve");
        assert_eq!(terms, vec!["\"id\" DESC", "\"name\" ASC"]);
        assert_eq!(order_by_sql(&terms), " ORDER BY \"id\" DESC, \"name\" ASC");

        assert!(
            OrderBy::from("-bogus")
                .resolve("employees", &columns(), true)
                .is_err()
        );
    }

    #[test]
    fn test_default_order_is_id() {
        assert_eq!(OrderBy::default().keys(), ["id"]);
        assert_eq!(order_by_sql(&[]), "");
    }
}
