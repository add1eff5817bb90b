use sqlx::{Column, ColumnIndex, Decode, Row};

pub(crate) const NULL_TEXT: &str = "NULL";
pub(crate) const BINARY_TEXT: &str = "<binary>";

/// Text form of one cell. Values come from the simple-query path, so every driver exposes
/// them as text; anything that is not valid UTF-8 is reported as binary.
pub(crate) fn cell_text<R>(row: &R, index: usize) -> String
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> Option<String>: Decode<'r, R::Database>,
{
    match row.try_get_unchecked::<Option<String>, _>(index) {
        Ok(Some(value)) => value,
        Ok(None) => NULL_TEXT.to_string(),
        Err(_) => BINARY_TEXT.to_string(),
    }
}

pub(crate) fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|column| column.name().to_string()).collect()
}

pub(crate) fn row_cells<R>(row: &R) -> Vec<String>
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> Option<String>: Decode<'r, R::Database>,
{
    (0..row.len()).map(|index| cell_text(row, index)).collect()
}

/// Renders the outcome of one executed statement text. `described` holds the column names
/// reported when the text was prepared, if it was a row-returning statement.
pub(crate) fn render_statement_output(
    described: Option<Vec<String>>,
    row_header: Option<Vec<String>>,
    rows: &[Vec<String>],
    rows_affected: u64,
) -> String {
    if let Some(header) = described.filter(|header| !header.is_empty()) {
        if rows.is_empty() {
            return format!("{}\n(0 rows)", join_cells(&header));
        }
        return render_table(&header, rows);
    }

    match row_header {
        Some(header) if !rows.is_empty() => render_table(&header, rows),
        _ => format!("{rows_affected} rows affected"),
    }
}

pub(crate) fn render_table(header: &[String], rows: &[Vec<String>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(join_cells(header));
    lines.extend(rows.iter().map(|row| join_cells(row)));
    lines.join("\n")
}

/// One table entry of a schema description: DDL followed by an optional sample-row comment.
pub(crate) fn render_table_schema(
    table: &str,
    ddl: &str,
    sample_limit: u32,
    header: &[String],
    rows: &[Vec<String>],
) -> String {
    let ddl = ddl.trim_end();
    if sample_limit == 0 {
        return ddl.to_string();
    }

    format!(
        "{ddl}\n\n/*\n{sample_limit} rows from {table} table:\n{}\n*/",
        render_table(header, rows)
    )
}

fn join_cells(cells: &[String]) -> String {
    cells
        .iter()
        .map(|cell| cell.replace(['\t', '\n'], " "))
        .collect::<Vec<_>>()
        .join("\t")
}
