//! Paged iteration over large result sets
//!
//! [`PagePlan`] splits `[offset, offset + limit)` into `LIMIT/OFFSET`
//! slices of at most `step` rows. [`ResultIter`] runs one slice at a time,
//! only when the rows of the previous slice have been consumed.

use std::collections::VecDeque;

use futures::Stream;
use pgdata_core::{Record, Result, Row, Value};

use crate::database::Database;

/// Rows fetched per page by default
pub const DEFAULT_STEP: u64 = 5000;

/// One bounded page query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

/// The pages of one `find` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePlan {
    pages: Vec<Page>,
}

impl PagePlan {
    /// Plan pages for `total` matching rows.
    ///
    /// `limit` defaults to `total`. A `step` of `None` or 0 gives a single
    /// page, as does an unordered query larger than one step, since its
    /// row order is not stable across page queries.
    pub fn new(total: u64, limit: Option<u64>, offset: u64, step: Option<u64>, ordered: bool) -> Self {
        let limit = limit.unwrap_or(total);
        let mut step = match step {
            None | Some(0) => total,
            Some(step) => step,
        };
        if total > step && !ordered {
            tracing::warn!(
                total,
                step,
                "query cannot be broken into smaller sections because it is unordered"
            );
            step = total;
        }

        let mut pages = Vec::new();
        if step == 0 {
            return Self { pages };
        }
        let mut fetched = 0u64;
        while fetched < limit {
            let page_limit = step.min(limit - fetched);
            pages.push(Page {
                offset: offset + fetched,
                limit: page_limit,
            });
            fetched += page_limit;
        }
        Self { pages }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Rows covered by all pages together
    pub fn row_count(&self) -> u64 {
        self.pages.iter().map(|p| p.limit).sum()
    }
}

/// Lazy, single-pass sequence of records over a [`PagePlan`].
///
/// Once exhausted it keeps returning `None`.
pub struct ResultIter {
    db: Option<Database>,
    select_sql: String,
    params: Vec<Value>,
    pages: VecDeque<Page>,
    buffer: std::vec::IntoIter<Record>,
    pages_fetched: usize,
}

impl ResultIter {
    /// `select_sql` is the full query without `LIMIT`/`OFFSET`
    pub(crate) fn new(db: Database, select_sql: String, params: Vec<Value>, plan: PagePlan) -> Self {
        Self {
            db: Some(db),
            select_sql,
            params,
            pages: plan.pages.into(),
            buffer: Vec::new().into_iter(),
            pages_fetched: 0,
        }
    }

    /// An iterator that yields nothing and issues no queries
    pub fn empty() -> Self {
        Self {
            db: None,
            select_sql: String::new(),
            params: Vec::new(),
            pages: VecDeque::new(),
            buffer: Vec::new().into_iter(),
            pages_fetched: 0,
        }
    }

    /// Page queries remaining, including none in flight
    pub fn pages_remaining(&self) -> usize {
        self.pages.len()
    }

    /// Page queries issued so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub async fn next(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(record) = self.buffer.next() {
                return Ok(Some(record));
            }
            let Some(page) = self.pages.pop_front() else {
                return Ok(None);
            };
            let Some(db) = &self.db else {
                return Ok(None);
            };

            let sql = format!(
                "{} LIMIT {} OFFSET {}",
                self.select_sql, page.limit, page.offset
            );
            let result = match db.query(&sql, &self.params).await {
                Ok(result) => result,
                Err(e) => {
                    // a failed page ends the sequence
                    self.pages.clear();
                    return Err(e);
                }
            };
            self.pages_fetched += 1;
            tracing::debug!(
                offset = page.offset,
                limit = page.limit,
                rows = result.rows.len(),
                "fetched page"
            );
            self.buffer = result
                .rows
                .into_iter()
                .map(Row::into_record)
                .collect::<Vec<_>>()
                .into_iter();
        }
    }

    /// Drain the remaining records into a vector
    pub async fn try_collect(mut self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Record>> + Send {
        futures::stream::unfold(self, |mut iter| async move {
            match iter.next().await {
                Ok(Some(record)) => Some((Ok(record), iter)),
                Ok(None) => None,
                Err(e) => Some((Err(e), iter)),
            }
        })
    }
}

impl std::fmt::Debug for ResultIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultIter")
            .field("select_sql", &self.select_sql)
            .field("pages_remaining", &self.pages.len())
            .field("pages_fetched", &self.pages_fetched)
            .finish()
    }
}
