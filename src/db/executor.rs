//! Statement execution on a leased connection.
//!
//! This module provides statement execution with support for:
//! - Parameterized statements (unprepared when there are no binds)
//! - Rows and affected-row counts read from the same result stream
//! - Row limits (enforced while streaming, only fetches needed rows)
//! - Statement timeouts
//!
//! # Architecture
//!
//! Each backend implements [`RunStatement`] for its native connection type
//! in a submodule of its own. The implementations are intentionally parallel
//! to make differences obvious.

use crate::config::ResolvedOptions;
use crate::db::types::{RowToJson, shape_row};
use crate::error::{DbError, DbResult};
use crate::models::{QueryResult, Statement};
use futures_util::future::BoxFuture;
use futures_util::{Stream, TryStreamExt};
use sqlx::Either;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Run `fut` under `limit`, mapping expiry to a timeout error for `operation`.
pub(crate) async fn within<T>(
    limit: Duration,
    operation: &str,
    fut: impl Future<Output = DbResult<T>>,
) -> DbResult<T> {
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DbError::timeout(operation, limit)),
    }
}

/// Backend-specific execution of a single statement.
pub(crate) trait RunStatement {
    fn run<'a>(
        &'a mut self,
        statement: &'a Statement,
        options: &'a ResolvedOptions,
    ) -> BoxFuture<'a, DbResult<QueryResult>>;
}

/// Rows and row counts gathered from one statement's result stream.
#[derive(Debug)]
struct Collected<R> {
    rows: Vec<R>,
    rows_affected: u64,
    has_more: bool,
}

/// Drain a `fetch_many` stream, keeping at most `max_rows` rows.
///
/// Completion items (`Left`) carry row counts and rows arrive as `Right`.
/// Reading stops at the first row past the limit.
async fn collect_limited<R, S>(mut stream: S, max_rows: Option<u32>) -> DbResult<Collected<R>>
where
    S: Stream<Item = Result<Either<u64, R>, sqlx::Error>> + Unpin,
{
    let mut collected = Collected {
        rows: Vec::new(),
        rows_affected: 0,
        has_more: false,
    };
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(affected) => collected.rows_affected += affected,
            Either::Right(row) => {
                if max_rows.is_some_and(|max| collected.rows.len() >= max as usize) {
                    collected.has_more = true;
                    break;
                }
                collected.rows.push(row);
            }
        }
    }
    Ok(collected)
}

/// Process rows from any database type into a QueryResult.
fn process_rows<R: RowToJson>(
    collected: Collected<R>,
    options: &ResolvedOptions,
    start: Instant,
) -> QueryResult {
    let Collected {
        rows,
        rows_affected,
        has_more,
    } = collected;

    let mut meta_data = rows
        .first()
        .map(RowToJson::column_metadata)
        .unwrap_or_default();
    let mut saw_null = vec![false; meta_data.len()];

    let shaped = rows
        .iter()
        .map(|row| {
            let values = row.column_values(options);
            for (seen, (_, value)) in saw_null.iter_mut().zip(&values) {
                *seen |= value.is_null();
            }
            shape_row(values, options.out_format)
        })
        .collect();

    for (column, nullable) in meta_data.iter_mut().zip(saw_null) {
        column.nullable = nullable;
    }

    if has_more {
        warn!(
            rows = rows.len(),
            max_rows = ?options.max_rows,
            "Result truncated at max_rows"
        );
    }

    QueryResult {
        meta_data,
        rows: shaped,
        rows_affected,
        has_more,
        execution_time_ms: start.elapsed().as_millis() as u64,
    }
}

fn log_statement(statement: &Statement, options: &ResolvedOptions) {
    debug!(
        sql = %statement.sql,
        binds = statement.binds.len(),
        timeout_ms = options.timeout.as_millis() as u64,
        "Executing statement"
    );
}

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql;
    use sqlx::MySqlConnection;

    impl RunStatement for MySqlConnection {
        fn run<'a>(
            &'a mut self,
            statement: &'a Statement,
            options: &'a ResolvedOptions,
        ) -> BoxFuture<'a, DbResult<QueryResult>> {
            Box::pin(async move {
                log_statement(statement, options);
                let start = Instant::now();
                let sql = statement.sql.as_str();

                let collected = within(options.timeout, "statement execution", async {
                    // Without binds, run unprepared (some statements can't be prepared)
                    let stream = if statement.binds.is_empty() {
                        sqlx::Executor::fetch_many(&mut *self, sql)
                    } else {
                        let query = bind_mysql(sqlx::query(sql), &statement.binds);
                        sqlx::Executor::fetch_many(&mut *self, query)
                    };
                    collect_limited(
                        stream.map_ok(|step| step.map_left(|done| done.rows_affected())),
                        options.max_rows,
                    )
                    .await
                })
                .await?;
                Ok(process_rows(collected, options, start))
            })
        }
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres;
    use sqlx::PgConnection;

    impl RunStatement for PgConnection {
        fn run<'a>(
            &'a mut self,
            statement: &'a Statement,
            options: &'a ResolvedOptions,
        ) -> BoxFuture<'a, DbResult<QueryResult>> {
            Box::pin(async move {
                log_statement(statement, options);
                let start = Instant::now();
                let sql = statement.sql.as_str();

                let collected = within(options.timeout, "statement execution", async {
                    let stream = if statement.binds.is_empty() {
                        sqlx::Executor::fetch_many(&mut *self, sql)
                    } else {
                        let query = bind_postgres(sqlx::query(sql), &statement.binds);
                        sqlx::Executor::fetch_many(&mut *self, query)
                    };
                    collect_limited(
                        stream.map_ok(|step| step.map_left(|done| done.rows_affected())),
                        options.max_rows,
                    )
                    .await
                })
                .await?;
                Ok(process_rows(collected, options, start))
            })
        }
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite;
    use sqlx::SqliteConnection;

    impl RunStatement for SqliteConnection {
        fn run<'a>(
            &'a mut self,
            statement: &'a Statement,
            options: &'a ResolvedOptions,
        ) -> BoxFuture<'a, DbResult<QueryResult>> {
            Box::pin(async move {
                log_statement(statement, options);
                let start = Instant::now();
                let sql = statement.sql.as_str();

                let collected = within(options.timeout, "statement execution", async {
                    let stream = if statement.binds.is_empty() {
                        sqlx::Executor::fetch_many(&mut *self, sql)
                    } else {
                        let query = bind_sqlite(sqlx::query(sql), &statement.binds);
                        sqlx::Executor::fetch_many(&mut *self, query)
                    };
                    collect_limited(
                        stream.map_ok(|step| step.map_left(|done| done.rows_affected())),
                        options.max_rows,
                    )
                    .await
                })
                .await?;
                Ok(process_rows(collected, options, start))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_within_maps_expiry_to_timeout() {
        let result: DbResult<()> = within(Duration::from_millis(10), "query execution", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(DbError::Timeout { .. })));

        let result = within(Duration::from_secs(1), "query execution", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_within_reports_sub_second_limit() {
        let err = within(Duration::from_millis(250), "statement execution", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Timeout: statement execution exceeded 250ms");
    }

    fn steps(
        items: Vec<Either<u64, i32>>,
    ) -> impl Stream<Item = Result<Either<u64, i32>, sqlx::Error>> + Unpin {
        futures_util::stream::iter(items.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn test_collect_limited_reports_more_rows() {
        let rows = steps((1..=5).map(Either::Right).collect());
        let collected = collect_limited(rows, Some(3)).await.unwrap();
        assert_eq!(collected.rows, vec![1, 2, 3]);
        assert!(collected.has_more);

        let rows = steps(vec![Either::Right(1), Either::Right(2), Either::Left(0)]);
        let collected = collect_limited(rows, Some(2)).await.unwrap();
        assert_eq!(collected.rows, vec![1, 2]);
        assert!(!collected.has_more);

        let rows = steps((1..=4).map(Either::Right).collect());
        let collected = collect_limited(rows, None).await.unwrap();
        assert_eq!(collected.rows.len(), 4);
        assert!(!collected.has_more);
    }

    #[tokio::test]
    async fn test_collect_limited_keeps_rows_and_counts_together() {
        // UPDATE .. RETURNING: rows first, then the completion with its count
        let stream = steps(vec![Either::Right(7), Either::Right(8), Either::Left(2)]);
        let collected = collect_limited(stream, None).await.unwrap();
        assert_eq!(collected.rows, vec![7, 8]);
        assert_eq!(collected.rows_affected, 2);

        let stream = steps(vec![Either::Left(3)]);
        let collected = collect_limited(stream, None).await.unwrap();
        assert!(collected.rows.is_empty());
        assert_eq!(collected.rows_affected, 3);
    }
}
