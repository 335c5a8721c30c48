//! Idempotent export: re-running the same window for the same account
//! leaves exactly one copy of its rows.

use crate::model::{AccountScope, FetchWindow, Row, WriteMode};
use crate::warehouse::{LoadError, TableRef, Warehouse};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct IdempotentLoader {
    warehouse: Arc<Warehouse>,
}

impl IdempotentLoader {
    pub fn new(warehouse: Arc<Warehouse>) -> Self {
        Self { warehouse }
    }

    pub fn warehouse(&self) -> &Arc<Warehouse> {
        &self.warehouse
    }

    /// Returns the number of rows inserted.
    ///
    /// - empty `rows`: no-op, nothing is deleted
    /// - `Append`: delete `scope`'s rows dated inside `window`, then insert
    /// - `Replace`: the table's previous contents are replaced by `rows`
    ///
    /// Either everything is committed or nothing is.
    pub fn export(
        &self,
        rows: &[Row],
        window: &FetchWindow,
        destination: &TableRef,
        scope: &AccountScope,
        mode: WriteMode,
    ) -> Result<usize, LoadError> {
        if rows.is_empty() {
            info!(table = %destination, account_id = %scope, "No rows to export");
            return Ok(0);
        }

        let report = match mode {
            WriteMode::Append => self.warehouse.replace_window(destination, rows, window, scope)?,
            WriteMode::Replace => self.warehouse.truncate_and_load(destination, rows)?,
        };

        info!(
            table = %destination,
            account_id = %scope,
            window = %window,
            mode = ?mode,
            deleted = report.deleted,
            inserted = report.inserted,
            "Export complete"
        );
        Ok(report.inserted)
    }
}
