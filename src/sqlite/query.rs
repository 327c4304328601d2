use std::sync::Arc;

use rusqlite::types::Value;
use tokio::sync::mpsc;

use crate::error::SqlTemplateError;
use crate::results::{CustomDbRow, ResultSet, index_columns};
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns [`SqlTemplateError::SqliteError`] if the column cannot be read.
pub fn sqlite_extract_value_sync(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<RowValues, SqlTemplateError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

fn column_names(stmt: &rusqlite::Statement<'_>) -> Arc<Vec<String>> {
    Arc::new(
        stmt.column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect(),
    )
}

fn row_values(row: &rusqlite::Row, width: usize) -> Result<Vec<RowValues>, SqlTemplateError> {
    (0..width)
        .map(|i| sqlite_extract_value_sync(row, i))
        .collect()
}

/// Run one resolved statement and buffer its result.
///
/// Statements that return columns yield their rows; anything else reports the database's change
/// count in `rows_affected`.
///
/// # Errors
/// Returns [`SqlTemplateError::SqliteError`] if the statement fails to prepare or run.
pub fn build_result_set(
    conn: &rusqlite::Connection,
    sql: &str,
) -> Result<ResultSet, SqlTemplateError> {
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() == 0 {
        let changed = stmt.execute([])?;
        let mut result_set = ResultSet::default();
        result_set.rows_affected = changed;
        return Ok(result_set);
    }

    let names = column_names(&stmt);
    let width = names.len();
    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(names);

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        result_set.add_row_values(row_values(row, width)?);
    }
    Ok(result_set)
}

/// Run one resolved statement, sending each row into `tx` as it is read.
///
/// Blocks on the bounded channel, so a slow receiver pauses the cursor. Stops early without error
/// if the receiver is gone. A failure is sent down the channel as the last item. Returns the
/// number of rows sent.
pub fn stream_rows(
    conn: &rusqlite::Connection,
    sql: &str,
    tx: &mpsc::Sender<Result<CustomDbRow, SqlTemplateError>>,
) -> usize {
    match stream_rows_inner(conn, sql, tx) {
        Ok(sent) => sent,
        Err(err) => {
            let _ = tx.blocking_send(Err(err));
            0
        }
    }
}

fn stream_rows_inner(
    conn: &rusqlite::Connection,
    sql: &str,
    tx: &mpsc::Sender<Result<CustomDbRow, SqlTemplateError>>,
) -> Result<usize, SqlTemplateError> {
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() == 0 {
        stmt.execute([])?;
        return Ok(0);
    }

    let names = column_names(&stmt);
    let index = Arc::new(index_columns(&names));
    let width = names.len();

    let mut rows = stmt.query([])?;
    let mut sent = 0;
    while let Some(row) = rows.next()? {
        let row = CustomDbRow::with_index(
            Arc::clone(&names),
            Arc::clone(&index),
            row_values(row, width)?,
        );
        if tx.blocking_send(Ok(row)).is_err() {
            tracing::debug!(sent, "row receiver dropped; stopping cursor");
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> rusqlite::Connection {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER, name TEXT, score REAL, data BLOB);
             INSERT INTO t VALUES (1, 'a', 1.5, X'00ff'), (2, NULL, NULL, NULL);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn select_buffers_rows() {
        let rs =
            build_result_set(&conn(), "SELECT id, name, score, data FROM t ORDER BY id").unwrap();
        assert_eq!(rs.rows_affected, 2);
        let first = &rs.results[0];
        assert_eq!(first.get("id"), Some(&RowValues::Int(1)));
        assert_eq!(first.get("score"), Some(&RowValues::Float(1.5)));
        assert_eq!(first.get("data"), Some(&RowValues::Blob(vec![0x00, 0xff])));
        assert!(rs.results[1].get("name").unwrap().is_null());
    }

    #[test]
    fn dml_reports_changes() {
        let conn = conn();
        let rs = build_result_set(&conn, "UPDATE t SET name = 'z'").unwrap();
        assert!(rs.is_empty());
        assert_eq!(rs.rows_affected, 2);
    }

    #[test]
    fn stream_stops_when_receiver_is_gone() {
        let conn = conn();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert_eq!(stream_rows(&conn, "SELECT id FROM t", &tx), 0);
    }

    #[test]
    fn stream_sends_failure_as_last_item() {
        let conn = conn();
        let (tx, mut rx) = mpsc::channel(1);
        stream_rows(&conn, "SELECT nope FROM missing", &tx);
        assert!(matches!(rx.try_recv(), Ok(Err(SqlTemplateError::SqliteError(_)))));
    }
}
