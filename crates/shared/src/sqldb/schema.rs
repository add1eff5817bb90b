use futures::TryStreamExt;
use sqlx::{Executor, MySqlConnection, SqliteConnection, Statement};

use super::render::{column_names, render_table_schema, row_cells};
use super::{DbError, query_error};

const MYSQL_TABLES_SQL: &str = "SELECT TABLE_NAME FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME";
const SQLITE_TABLES_SQL: &str = "SELECT name, sql FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

pub(super) async fn describe_mysql(
    conn: &mut MySqlConnection,
    sample_rows: u32,
) -> Result<String, DbError> {
    let tables: Vec<String> = text_rows_mysql(conn, MYSQL_TABLES_SQL)
        .await?
        .into_iter()
        .filter_map(|row| row.into_iter().next())
        .collect();

    let mut entries = Vec::with_capacity(tables.len());
    for table in tables {
        let quoted = quote_mysql_identifier(&table);
        let ddl = text_rows_mysql(conn, &format!("SHOW CREATE TABLE {quoted}"))
            .await?
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().nth(1))
            .ok_or_else(|| DbError::Query(format!("no DDL returned for table {table}")))?;

        let (header, rows) = if sample_rows > 0 {
            let sample_sql = format!("SELECT * FROM {quoted} LIMIT {sample_rows}");
            let statement = (&mut *conn).prepare(&sample_sql).await.map_err(query_error)?;
            let header = column_names(statement.columns());
            (header, text_rows_mysql(conn, &sample_sql).await?)
        } else {
            (Vec::new(), Vec::new())
        };

        entries.push(render_table_schema(&table, &ddl, sample_rows, &header, &rows));
    }

    Ok(entries.join("\n\n"))
}

pub(super) async fn describe_sqlite(
    conn: &mut SqliteConnection,
    sample_rows: u32,
) -> Result<String, DbError> {
    let tables: Vec<(String, String)> = text_rows_sqlite(conn, SQLITE_TABLES_SQL)
        .await?
        .into_iter()
        .filter_map(|row| {
            let mut cells = row.into_iter();
            Some((cells.next()?, cells.next()?))
        })
        .collect();

    let mut entries = Vec::with_capacity(tables.len());
    for (table, ddl) in tables {
        let (header, rows) = if sample_rows > 0 {
            let sample_sql = format!(
                "SELECT * FROM {} LIMIT {sample_rows}",
                quote_sqlite_identifier(&table)
            );
            let statement = (&mut *conn).prepare(&sample_sql).await.map_err(query_error)?;
            let header = column_names(statement.columns());
            (header, text_rows_sqlite(conn, &sample_sql).await?)
        } else {
            (Vec::new(), Vec::new())
        };

        entries.push(render_table_schema(&table, &ddl, sample_rows, &header, &rows));
    }

    Ok(entries.join("\n\n"))
}

async fn text_rows_mysql(
    conn: &mut MySqlConnection,
    sql: &str,
) -> Result<Vec<Vec<String>>, DbError> {
    let mut stream = (&mut *conn).fetch(sqlx::raw_sql(sql));
    let mut rows = Vec::new();
    while let Some(row) = stream.try_next().await.map_err(query_error)? {
        rows.push(row_cells(&row));
    }
    Ok(rows)
}

async fn text_rows_sqlite(
    conn: &mut SqliteConnection,
    sql: &str,
) -> Result<Vec<Vec<String>>, DbError> {
    let mut stream = (&mut *conn).fetch(sqlx::raw_sql(sql));
    let mut rows = Vec::new();
    while let Some(row) = stream.try_next().await.map_err(query_error)? {
        rows.push(row_cells(&row));
    }
    Ok(rows)
}

fn quote_mysql_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn quote_sqlite_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
