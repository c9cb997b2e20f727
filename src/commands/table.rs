use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use tracing::info;

use crate::engine::merge::{AnnotationStore, StoreLoadOutcome};
use crate::model::TableRow;
use crate::util::{ensure_directory, write_json_pretty};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TableFormat {
    Json,
    Sqlite,
}

impl TableFormat {
    pub fn for_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "sqlite" | "sqlite3" | "db" => Self::Sqlite,
            _ => Self::Json,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        }
    }
}

pub fn read_table(path: &Path) -> Result<Vec<TableRow>> {
    let format = TableFormat::for_path(path);
    let rows = match format {
        TableFormat::Json => read_json_table(path)?,
        TableFormat::Sqlite => read_sqlite_table(path)?,
    };

    info!(
        path = %path.display(),
        format = format.as_str(),
        rows = rows.len(),
        "loaded annotation table"
    );
    Ok(rows)
}

/// Replaces the whole table at `path` with `rows`.
pub fn write_table(path: &Path, rows: &[TableRow]) -> Result<()> {
    let format = TableFormat::for_path(path);
    match format {
        TableFormat::Json => write_json_pretty(path, &rows)?,
        TableFormat::Sqlite => write_sqlite_table(path, rows)?,
    }

    info!(
        path = %path.display(),
        format = format.as_str(),
        rows = rows.len(),
        "wrote annotation table"
    );
    Ok(())
}

pub fn load_store(path: &Path) -> Result<StoreLoadOutcome> {
    let rows = read_table(path)?;
    Ok(AnnotationStore::from_rows(&rows))
}

pub fn save_store(path: &Path, store: &AnnotationStore) -> Result<()> {
    let rows = store.to_rows()?;
    write_table(path, &rows)
}

fn read_json_table(path: &Path) -> Result<Vec<TableRow>> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn read_sqlite_table(path: &Path) -> Result<Vec<TableRow>> {
    let connection =
        Connection::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut statement = connection
        .prepare(
            "
            SELECT document_id, annotation_data
            FROM annotations
            ORDER BY document_id ASC
            ",
        )
        .with_context(|| format!("failed to query annotations in {}", path.display()))?;

    let mut rows = statement.query([])?;
    let mut out = Vec::<TableRow>::new();

    while let Some(row) = rows.next()? {
        out.push(TableRow {
            document_id: row.get(0)?,
            annotation_data: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        });
    }

    Ok(out)
}

fn write_sqlite_table(path: &Path, rows: &[TableRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }

    let mut connection =
        Connection::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    ensure_schema(&connection)?;

    let tx = connection.transaction()?;
    tx.execute("DELETE FROM annotations", [])?;
    {
        let mut insert = tx.prepare(
            "
            INSERT INTO annotations(document_id, annotation_data)
            VALUES(?1, ?2)
            ",
        )?;
        for row in rows {
            insert.execute(params![row.document_id, row.annotation_data])?;
        }
    }
    tx.commit()
        .with_context(|| format!("failed to commit annotations to {}", path.display()))?;

    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS annotations (
              document_id TEXT PRIMARY KEY,
              annotation_data TEXT NOT NULL
            );
            ",
        )
        .context("failed to create annotations table")?;
    Ok(())
}
