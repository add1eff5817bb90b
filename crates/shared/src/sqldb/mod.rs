use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use futures::TryStreamExt;
use sqlx::mysql::{MySql, MySqlPool, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Connection, Either, Executor, Row, Statement};
use thiserror::Error;
use tokio::time::timeout;

use crate::config::DatabaseConfig;

mod policy;
mod render;
mod schema;

pub use policy::StatementPolicy;

pub type DbFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DbError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database connection failed: {0}")]
    Connect(String),
    #[error("sql execution failed: {0}")]
    Query(String),
    #[error("database call timed out after {0} ms")]
    Timeout(u64),
    #[error("statement rejected by {policy} policy: {reason}")]
    StatementRejected {
        policy: StatementPolicy,
        reason: String,
    },
}

/// What the prompt chain needs from a database: a schema description and raw execution.
pub trait DatabaseAdapter: Send {
    fn describe_schema<'a>(&'a mut self) -> DbFuture<'a, String>;
    fn execute<'a>(&'a mut self, sql: &'a str) -> DbFuture<'a, String>;
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AdapterSettings {
    pub(crate) statement_timeout: Duration,
    pub(crate) schema_sample_rows: u32,
    pub(crate) statement_policy: StatementPolicy,
}

#[derive(Clone)]
enum PoolBackend {
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

/// Bounded connection pool over the configured database.
#[derive(Clone)]
pub struct SqlDatabase {
    pool: PoolBackend,
    settings: AdapterSettings,
}

impl SqlDatabase {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        let statement_timeout = Duration::from_millis(config.statement_timeout_ms);
        let pool = if config.url.starts_with("mysql://") {
            let pool = MySqlPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(statement_timeout)
                .connect(&config.url)
                .await
                .map_err(|err| DbError::Connect(err.to_string()))?;
            PoolBackend::MySql(pool)
        } else if config.url.starts_with("sqlite:") {
            let options = SqliteConnectOptions::from_str(&config.url)
                .map_err(|err| DbError::Connect(err.to_string()))?
                .create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(statement_timeout)
                .connect_with(options)
                .await
                .map_err(|err| DbError::Connect(err.to_string()))?;
            PoolBackend::Sqlite(pool)
        } else {
            return Err(DbError::Connect(
                "unsupported database url scheme".to_string(),
            ));
        };

        Ok(Self {
            pool,
            settings: AdapterSettings {
                statement_timeout,
                schema_sample_rows: config.schema_sample_rows,
                statement_policy: config.statement_policy,
            },
        })
    }

    pub fn backend_name(&self) -> &'static str {
        match self.pool {
            PoolBackend::MySql(_) => "mysql",
            PoolBackend::Sqlite(_) => "sqlite",
        }
    }

    /// Checks a connection out of the pool. It goes back when the session is dropped.
    pub async fn checkout(&self) -> Result<SqlSession, DbError> {
        let conn = match &self.pool {
            PoolBackend::MySql(pool) => SessionConnection::MySql(
                pool.acquire()
                    .await
                    .map_err(|err| acquire_error(err, self.settings.statement_timeout))?,
            ),
            PoolBackend::Sqlite(pool) => SessionConnection::Sqlite(
                pool.acquire()
                    .await
                    .map_err(|err| acquire_error(err, self.settings.statement_timeout))?,
            ),
        };

        Ok(SqlSession {
            conn,
            settings: self.settings,
        })
    }

    pub async fn ping(&self) -> Result<(), DbError> {
        let mut session = self.checkout().await?;
        let limit = session.settings.statement_timeout;
        match &mut session.conn {
            SessionConnection::MySql(conn) => with_timeout(limit, async {
                conn.ping()
                    .await
                    .map_err(|err| DbError::Connect(err.to_string()))
            })
            .await,
            SessionConnection::Sqlite(conn) => with_timeout(limit, async {
                conn.ping()
                    .await
                    .map_err(|err| DbError::Connect(err.to_string()))
            })
            .await,
        }
    }

    pub async fn close(&self) {
        match &self.pool {
            PoolBackend::MySql(pool) => pool.close().await,
            PoolBackend::Sqlite(pool) => pool.close().await,
        }
    }
}

enum SessionConnection {
    MySql(PoolConnection<MySql>),
    Sqlite(PoolConnection<Sqlite>),
}

/// One checked-out connection, scoped to a single chat request.
pub struct SqlSession {
    conn: SessionConnection,
    settings: AdapterSettings,
}

impl SqlSession {
    async fn describe(&mut self) -> Result<String, DbError> {
        let limit = self.settings.statement_timeout;
        let sample_rows = self.settings.schema_sample_rows;
        match &mut self.conn {
            SessionConnection::MySql(conn) => {
                with_timeout(limit, schema::describe_mysql(conn, sample_rows)).await
            }
            SessionConnection::Sqlite(conn) => {
                with_timeout(limit, schema::describe_sqlite(conn, sample_rows)).await
            }
        }
    }

    async fn run(&mut self, sql: &str) -> Result<String, DbError> {
        let policy = self.settings.statement_policy;
        policy
            .check(sql)
            .map_err(|reason| DbError::StatementRejected { policy, reason })?;

        let limit = self.settings.statement_timeout;
        match &mut self.conn {
            SessionConnection::MySql(conn) => with_timeout(limit, run_mysql(conn, sql)).await,
            SessionConnection::Sqlite(conn) => with_timeout(limit, run_sqlite(conn, sql)).await,
        }
    }
}

impl DatabaseAdapter for SqlSession {
    fn describe_schema<'a>(&'a mut self) -> DbFuture<'a, String> {
        Box::pin(self.describe())
    }

    fn execute<'a>(&'a mut self, sql: &'a str) -> DbFuture<'a, String> {
        Box::pin(self.run(sql))
    }
}

/// Accumulates the results of one statement text, which may hold several statements.
#[derive(Debug, Default)]
struct StatementCollector {
    described: Option<Vec<String>>,
    header: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
    rows_affected: u64,
    steps: usize,
}

impl StatementCollector {
    fn described(described: Option<Vec<String>>) -> Self {
        Self {
            described,
            ..Self::default()
        }
    }

    fn push_result(&mut self, rows_affected: u64) {
        self.steps += 1;
        self.rows_affected = self.rows_affected.saturating_add(rows_affected);
    }

    fn push_row<R>(&mut self, row: &R)
    where
        R: Row,
        usize: sqlx::ColumnIndex<R>,
        for<'r> Option<String>: sqlx::Decode<'r, R::Database>,
    {
        self.steps += 1;
        if self.header.is_none() {
            self.header = Some(render::column_names(row.columns()));
        }
        self.rows.push(render::row_cells(row));
    }

    /// Text that parsed to nothing (blank or comments only) is an error, not zero rows.
    fn finish(self) -> Result<String, DbError> {
        if self.steps == 0 {
            return Err(DbError::Query(
                "statement text contained no statement".to_string(),
            ));
        }
        Ok(render::render_statement_output(
            self.described,
            self.header,
            &self.rows,
            self.rows_affected,
        ))
    }
}

async fn run_mysql(conn: &mut sqlx::MySqlConnection, sql: &str) -> Result<String, DbError> {
    // Preparing only reports the column set; execution below still runs the raw text.
    let described = (&mut *conn)
        .prepare(sql)
        .await
        .ok()
        .map(|statement| render::column_names(statement.columns()));
    let mut collector = StatementCollector::described(described);
    let mut stream = (&mut *conn).fetch_many(sqlx::raw_sql(sql));
    while let Some(step) = stream.try_next().await.map_err(query_error)? {
        match step {
            Either::Left(result) => collector.push_result(result.rows_affected()),
            Either::Right(row) => collector.push_row(&row),
        }
    }
    collector.finish()
}

async fn run_sqlite(conn: &mut sqlx::SqliteConnection, sql: &str) -> Result<String, DbError> {
    // Preparing only reports the column set; execution below still runs the raw text.
    let described = (&mut *conn)
        .prepare(sql)
        .await
        .ok()
        .map(|statement| render::column_names(statement.columns()));
    let mut collector = StatementCollector::described(described);
    let mut stream = (&mut *conn).fetch_many(sqlx::raw_sql(sql));
    while let Some(step) = stream.try_next().await.map_err(query_error)? {
        match step {
            Either::Left(result) => collector.push_result(result.rows_affected()),
            Either::Right(row) => collector.push_row(&row),
        }
    }
    collector.finish()
}

pub(crate) fn query_error(err: sqlx::Error) -> DbError {
    DbError::Query(err.to_string())
}

async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, DbError>
where
    F: Future<Output = Result<T, DbError>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DbError::Timeout(limit.as_millis() as u64)),
    }
}

fn acquire_error(err: sqlx::Error, limit: Duration) -> DbError {
    match err {
        sqlx::Error::PoolTimedOut => DbError::Timeout(limit.as_millis() as u64),
        other => DbError::Connect(other.to_string()),
    }
}
