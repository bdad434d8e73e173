//! Search service (C13): parse -> plan -> execute -> materialize -> order -> limit.

use crate::clock::Clock;
use crate::entry::Entry;
use crate::error::{QueryError, SeekError};
use crate::pool::Pool;
use crate::query::planner::Binding;
use crate::query::{parser, planner};
use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::Result as SqlResult;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

pub const DEFAULT_LIMIT: i64 = 1000;

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub entries: Vec<Entry>,
    pub search_time_seconds: f64,
}

impl ToSql for Binding {
    fn to_sql(&self) -> SqlResult<ToSqlOutput<'_>> {
        match self {
            Binding::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
            Binding::Int(i) => Ok(ToSqlOutput::from(*i)),
        }
    }
}

pub struct SearchService {
    pool: Arc<Pool>,
    clock: Arc<dyn Clock>,
}

impl SearchService {
    pub fn new(pool: Arc<Pool>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// `limit` defaults to 1000. Empty queries never fail — they return an
    /// empty result set.
    pub fn search(&self, query: &str, limit: Option<i64>) -> Result<SearchResult, SeekError> {
        let started = Instant::now();

        let expr = match parser::parse(query) {
            Ok(expr) => expr,
            Err(QueryError::Empty) => {
                return Ok(SearchResult {
                    entries: Vec::new(),
                    search_time_seconds: started.elapsed().as_secs_f64(),
                })
            }
            Err(e) => return Err(SeekError::Query(e)),
        };

        let plan = planner::plan(&expr, self.clock.now());
        let limit = limit.unwrap_or(DEFAULT_LIMIT).max(0);

        let sql = format!(
            "SELECT name, full_path, is_directory, file_extension, size, date_modified, date_added \
             FROM file_entries WHERE {} ORDER BY LENGTH(name), name LIMIT ?",
            plan.where_clause
        );

        let entries = self.pool.read(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut params: Vec<&dyn ToSql> = plan.bindings.iter().map(|b| b as &dyn ToSql).collect();
            params.push(&limit);
            let mut rows = stmt.query(params.as_slice())?;
            let mut out = Vec::new();
            loop {
                match rows.next() {
                    Ok(Some(row)) => match Entry::from_row(row) {
                        Ok(entry) => out.push(entry),
                        Err(e) => warn!(error = %e, "skipping row with materialization error"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "skipping row after query error");
                        break;
                    }
                }
            }
            Ok(out)
        })?;

        Ok(SearchResult {
            entries,
            search_time_seconds: started.elapsed().as_secs_f64(),
        })
    }
}
