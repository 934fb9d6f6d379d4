// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Calorimeter Stack Simulation Suite ("The Stack") - Recording Sink

//! Schema-fixed output tables persisted at run end.
//!
//! Every table is declared before the first row is written anywhere in the
//! sink; from then on the schema is frozen. Rows are buffered in memory and
//! made durable by a single [`RecordingSink::flush_all`] call.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("table {0} already declared")]
    DuplicateTable(String),

    #[error("table {0} declared with no columns")]
    EmptySchema(String),

    #[error("cannot declare table {0}: rows have already been written")]
    SchemaFrozen(String),

    #[error("unknown table handle {0}")]
    UnknownTable(usize),

    #[error("table {table} expects {expected} values per row, got {actual}")]
    ColumnCountMismatch { table: String, expected: usize, actual: usize },

    #[error("table {0} has a different schema in the merged sink")]
    SchemaMismatch(String),

    #[error("sink already flushed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

// ---------------------------------------------------------------------------
// Output target
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON document holding every table.
    Json,
    /// One CSV file per table, `<stem>_nt_<table>.csv`.
    Csv,
}

impl Default for OutputFormat {
    fn default() -> Self { OutputFormat::Json }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputTarget {
    pub path: PathBuf,
    pub format: OutputFormat,
}

impl Default for OutputTarget {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/output.json"),
            format: OutputFormat::Json,
        }
    }
}

impl OutputTarget {
    pub fn json(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), format: OutputFormat::Json }
    }

    pub fn csv(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), format: OutputFormat::Csv }
    }

    pub fn csv_path(&self, table: &str) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let file = format!("{}_nt_{}.csv", stem, table);
        match self.path.parent() {
            Some(dir) => dir.join(file),
            None => PathBuf::from(file),
        }
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableHandle(usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// All values of one column, in row order.
    pub fn column(&self, column: &str) -> Option<Vec<f64>> {
        let index = self.column_index(column)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }

    fn same_schema(&self, other: &Table) -> bool {
        self.name == other.name && self.columns == other.columns
    }
}

#[derive(Serialize)]
struct SinkDocument<'a> {
    tables: &'a [Table],
}

#[derive(Deserialize)]
struct OwnedSinkDocument {
    tables: Vec<Table>,
}

/// Read the tables back from a JSON artifact written by [`RecordingSink::flush_all`].
pub fn load_json_tables(path: &Path) -> Result<Vec<Table>, SinkError> {
    let text = std::fs::read_to_string(path)?;
    let doc: OwnedSinkDocument = serde_json::from_str(&text)?;
    Ok(doc.tables)
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordingSink {
    target: OutputTarget,
    tables: Vec<Table>,
    frozen: bool,
    flushed: bool,
}

impl RecordingSink {
    pub fn new(target: OutputTarget) -> Self {
        Self {
            target,
            tables: Vec::new(),
            frozen: false,
            flushed: false,
        }
    }

    pub fn create_table<I, S>(
        &mut self,
        name: &str,
        title: &str,
        columns: I,
    ) -> Result<TableHandle, SinkError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.flushed {
            return Err(SinkError::Closed);
        }
        if self.frozen {
            return Err(SinkError::SchemaFrozen(name.to_string()));
        }
        if self.tables.iter().any(|t| t.name == name) {
            return Err(SinkError::DuplicateTable(name.to_string()));
        }
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(SinkError::EmptySchema(name.to_string()));
        }

        self.tables.push(Table {
            name: name.to_string(),
            title: title.to_string(),
            columns,
            rows: Vec::new(),
        });
        Ok(TableHandle(self.tables.len() - 1))
    }

    pub fn append_row(&mut self, handle: TableHandle, values: &[f64]) -> Result<(), SinkError> {
        if self.flushed {
            return Err(SinkError::Closed);
        }
        let table = self
            .tables
            .get_mut(handle.0)
            .ok_or(SinkError::UnknownTable(handle.0))?;
        if values.len() != table.columns.len() {
            return Err(SinkError::ColumnCountMismatch {
                table: table.name.clone(),
                expected: table.columns.len(),
                actual: values.len(),
            });
        }
        table.rows.push(values.to_vec());
        self.frozen = true;
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_by_handle(&self, handle: TableHandle) -> Option<&Table> {
        self.tables.get(handle.0)
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Append every row of a worker's sink, table by table. Both sinks must
    /// have declared identical schemas in the same order.
    pub fn merge(&mut self, other: RecordingSink) -> Result<(), SinkError> {
        if self.flushed {
            return Err(SinkError::Closed);
        }
        if other.tables.len() != self.tables.len() {
            let name = other
                .tables
                .iter()
                .chain(self.tables.iter())
                .map(|t| t.name.clone())
                .next()
                .unwrap_or_default();
            return Err(SinkError::SchemaMismatch(name));
        }
        if let Some((mine, _)) = self
            .tables
            .iter()
            .zip(other.tables.iter())
            .find(|(mine, theirs)| !mine.same_schema(theirs))
        {
            return Err(SinkError::SchemaMismatch(mine.name.clone()));
        }

        for (mine, theirs) in self.tables.iter_mut().zip(other.tables) {
            if !theirs.rows.is_empty() {
                self.frozen = true;
            }
            mine.rows.extend(theirs.rows);
        }
        Ok(())
    }

    /// Serialize every table as one JSON document.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<(), SinkError> {
        serde_json::to_writer_pretty(writer, &SinkDocument { tables: &self.tables })?;
        Ok(())
    }

    /// Serialize one table as CSV: a header row of column names, then the rows.
    pub fn write_csv<W: Write>(&self, handle: TableHandle, writer: W) -> Result<(), SinkError> {
        let table = self
            .tables
            .get(handle.0)
            .ok_or(SinkError::UnknownTable(handle.0))?;
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&table.columns)?;
        for row in &table.rows {
            csv_writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Make every table durable. Callable once per run; returns the files written.
    pub fn flush_all(&mut self) -> Result<Vec<PathBuf>, SinkError> {
        if self.flushed {
            return Err(SinkError::Closed);
        }
        if let Some(dir) = self.target.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let written = match self.target.format {
            OutputFormat::Json => {
                let file = std::fs::File::create(&self.target.path)?;
                let mut out = std::io::BufWriter::new(file);
                self.write_json(&mut out)?;
                out.flush()?;
                vec![self.target.path.clone()]
            }
            OutputFormat::Csv => {
                let mut paths = Vec::with_capacity(self.tables.len());
                for index in 0..self.tables.len() {
                    let path = self.target.csv_path(&self.tables[index].name);
                    let file = std::fs::File::create(&path)?;
                    self.write_csv(TableHandle(index), file)?;
                    paths.push(path);
                }
                paths
            }
        };

        self.flushed = true;
        log::info!(
            "flushed {} table(s) to {} file(s)",
            self.tables.len(),
            written.len()
        );
        Ok(written)
    }
}
