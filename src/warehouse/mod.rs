//! Destination tables addressed as `project.dataset.table`, backed by SQLite.

mod sqlite;

pub use sqlite::{LoadReport, Warehouse};

use crate::model::ValidationError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Fully-qualified destination table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    /// Accepts `dataset.table` (project taken from `project_id`) or
    /// `project.dataset.table`.
    pub fn parse(destination: &str, project_id: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidParameter {
            name: "destination_table".to_string(),
            reason: format!("'{}' {}", destination, reason),
        };

        let parts: Vec<&str> = destination.trim().split('.').collect();
        let (project, dataset, table) = match parts.as_slice() {
            [dataset, table] => (project_id, *dataset, *table),
            [project, dataset, table] => (*project, *dataset, *table),
            _ => return Err(invalid("must be dataset.table or project.dataset.table")),
        };

        for part in [project, dataset, table] {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                return Err(invalid("contains an empty or invalid identifier"));
            }
        }

        Ok(Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        })
    }

    /// Quoted identifier for SQL text. Parts are already restricted to
    /// `[A-Za-z0-9_-]`, so no escaping is needed.
    pub(crate) fn quoted(&self) -> String {
        format!("\"{}\"", self)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// Warehouse failures. Any of these rolls back the whole export.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("warehouse error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("table {table} has no column(s) {columns:?}")]
    SchemaMismatch { table: String, columns: Vec<String> },

    #[error("table {table} has no '{column}' column to scope the delete")]
    MissingColumn { table: String, column: String },

    #[error("warehouse connection lock poisoned")]
    Lock,
}
