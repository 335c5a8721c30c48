use super::{LoadError, TableRef};
use crate::model::{AccountScope, FetchWindow, Row};
use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use serde::Serialize;
use serde_json::{Number, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Rows touched by one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LoadReport {
    pub deleted: usize,
    pub inserted: usize,
}

/// Embedded warehouse. One SQLite table per fully-qualified destination.
///
/// Tables are created from the first batch's columns. Later batches must
/// fit that schema.
pub struct Warehouse {
    conn: Mutex<Connection>,
}

impl Warehouse {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open warehouse database")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LoadError> {
        self.conn.lock().map_err(|_| LoadError::Lock)
    }

    /// Deletes `scope`'s rows inside `window`, then inserts `rows`, in one
    /// transaction. A table that does not exist yet is created.
    pub fn replace_window(
        &self,
        table: &TableRef,
        rows: &[Row],
        window: &FetchWindow,
        scope: &AccountScope,
    ) -> Result<LoadReport, LoadError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let deleted = match table_columns(&tx, table)? {
            None => {
                warn!(table = %table, "Destination table does not exist yet, nothing to delete");
                create_table(&tx, table, rows)?;
                0
            }
            Some(columns) => {
                for required in ["date", "account_id"] {
                    if !columns.contains(required) {
                        return Err(LoadError::MissingColumn {
                            table: table.to_string(),
                            column: required.to_string(),
                        });
                    }
                }
                check_schema(table, &columns, rows)?;
                tx.execute(
                    &format!(
                        "DELETE FROM {} WHERE account_id = ?1 AND date BETWEEN ?2 AND ?3",
                        table.quoted()
                    ),
                    params![
                        scope.as_str(),
                        window.start_date().to_string(),
                        window.end_date().to_string()
                    ],
                )?
            }
        };
        debug!(table = %table, account_id = %scope, window = %window, deleted = deleted, "Deleted overlapping rows");

        let inserted = insert_rows(&tx, table, rows)?;
        tx.commit()?;

        info!(table = %table, account_id = %scope, deleted = deleted, inserted = inserted, "Window replaced");
        Ok(LoadReport { deleted, inserted })
    }

    /// Drops whatever the table held and loads `rows` as its only contents.
    pub fn truncate_and_load(&self, table: &TableRef, rows: &[Row]) -> Result<LoadReport, LoadError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let deleted = match table_columns(&tx, table)? {
            Some(_) => {
                let count: i64 = tx.query_row(&format!("SELECT COUNT(*) FROM {}", table.quoted()), [], |r| r.get(0))?;
                tx.execute(&format!("DROP TABLE {}", table.quoted()), [])?;
                count as usize
            }
            None => 0,
        };
        create_table(&tx, table, rows)?;
        let inserted = insert_rows(&tx, table, rows)?;
        tx.commit()?;

        info!(table = %table, deleted = deleted, inserted = inserted, "Table truncated and loaded");
        Ok(LoadReport { deleted, inserted })
    }

    /// Number of rows in `table`, optionally for one account. Missing tables hold 0 rows.
    pub fn count_rows(&self, table: &TableRef, scope: Option<&AccountScope>) -> Result<usize, LoadError> {
        let conn = self.conn()?;
        if table_columns(&conn, table)?.is_none() {
            return Ok(0);
        }
        let count: i64 = match scope {
            Some(scope) => conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE account_id = ?1", table.quoted()),
                params![scope.as_str()],
                |r| r.get(0),
            )?,
            None => conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.quoted()), [], |r| r.get(0))?,
        };
        Ok(count as usize)
    }

    /// Reads every row back as JSON, in insertion order.
    pub fn read_rows(&self, table: &TableRef) -> Result<Vec<Row>, LoadError> {
        let conn = self.conn()?;
        if table_columns(&conn, table)?.is_none() {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", table.quoted()))?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let rows = stmt.query_map([], |r| {
            let mut row = Row::new();
            for (i, name) in names.iter().enumerate() {
                row.insert(name.clone(), from_sql(r.get::<_, SqlValue>(i)?));
            }
            Ok(row)
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn table_columns(conn: &Connection, table: &TableRef) -> Result<Option<HashSet<String>>, LoadError> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map(params![table.to_string()], |r| r.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(if columns.is_empty() { None } else { Some(columns) })
}

/// Column names in first-seen order across the batch.
fn batch_columns(rows: &[Row]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for row in rows {
        for key in row.keys() {
            if seen.insert(key.as_str()) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn check_schema(table: &TableRef, existing: &HashSet<String>, rows: &[Row]) -> Result<(), LoadError> {
    let unknown: Vec<String> = batch_columns(rows)
        .into_iter()
        .filter(|c| !existing.contains(c))
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(LoadError::SchemaMismatch {
            table: table.to_string(),
            columns: unknown,
        })
    }
}

fn column_type(rows: &[Row], column: &str) -> &'static str {
    let sample = rows.iter().filter_map(|r| r.get(column)).find(|v| !v.is_null());
    match sample {
        Some(Value::Number(n)) if n.is_f64() => "REAL",
        Some(Value::Number(_)) | Some(Value::Bool(_)) => "INTEGER",
        _ => "TEXT",
    }
}

fn create_table(tx: &Transaction<'_>, table: &TableRef, rows: &[Row]) -> Result<(), LoadError> {
    let mut columns = batch_columns(rows);
    for required in ["date", "account_id"] {
        if !columns.iter().any(|c| c == required) {
            columns.push(required.to_string());
        }
    }

    let definitions: Vec<String> = columns
        .iter()
        .map(|c| format!("\"{}\" {}", c.replace('"', "\"\""), column_type(rows, c)))
        .collect();
    tx.execute(&format!("CREATE TABLE {} ({})", table.quoted(), definitions.join(", ")), [])?;
    debug!(table = %table, columns = columns.len(), "Created destination table");
    Ok(())
}

fn insert_rows(tx: &Transaction<'_>, table: &TableRef, rows: &[Row]) -> Result<usize, LoadError> {
    let mut inserted = 0;
    for row in rows {
        let columns: Vec<String> = row.keys().map(|c| format!("\"{}\"", c.replace('"', "\"\""))).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.quoted(),
            columns.join(", "),
            placeholders.join(", ")
        );
        let mut stmt = tx.prepare_cached(&sql)?;
        inserted += stmt.execute(params_from_iter(row.values().map(to_sql)))?;
    }
    Ok(inserted)
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Number(i.into()),
        SqlValue::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(_) => Value::Null,
    }
}
