use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::statement::{Column, DataType, QueryResult, Statement, Value};
use super::{MemoryStore, Store, StoreError, Table};

#[derive(Debug, Serialize, Deserialize)]
struct TableSchema {
    columns: Vec<Column>,
}

/// A directory of CSV files, one `<table>.csv` per table with a header row.
///
/// Column types come from `schemas/<table>.json` when present; otherwise a
/// column is `Int` only if every non-NULL cell is an integer written the way
/// it would be written back (`7`, not `007` or `+7`), so reading and
/// rewriting a file never changes a cell. All tables are read at open time.
///
/// Writes are applied in memory and the touched tables are rewritten, once
/// each, by [`Store::flush`] or on commit. Pending autocommit writes are
/// also flushed when the store is dropped.
pub struct CsvStore {
    data_dir: PathBuf,
    inner: MemoryStore,
    dirty: HashSet<String>,
}

impl CsvStore {
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir)?;
        }

        let mut store = Self {
            data_dir,
            inner: MemoryStore::new(),
            dirty: HashSet::new(),
        };
        store.load_tables()?;

        log::info!(
            "CSV store opened at {:?} with {} tables",
            store.data_dir,
            store.inner.table_names().count()
        );
        Ok(store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn table(&self, table_name: &str) -> Option<&Table> {
        self.inner.table(table_name)
    }

    fn table_path(&self, table_name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", table_name))
    }

    fn schema_path(&self, table_name: &str) -> PathBuf {
        self.data_dir
            .join("schemas")
            .join(format!("{}.json", table_name))
    }

    fn load_tables(&mut self) -> Result<(), StoreError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.data_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "csv"))
            .collect();
        paths.sort();

        for path in paths {
            let Some(table_name) = path.file_stem().map(|s| s.to_string_lossy().to_string())
            else {
                continue;
            };
            let table = self.read_table(&table_name)?;
            log::debug!("Loaded table '{}' ({} rows)", table_name, table.row_count());
            self.inner.put_table(table);
        }
        Ok(())
    }

    fn load_schema(&self, table_name: &str) -> Result<Option<TableSchema>, StoreError> {
        let path = self.schema_path(table_name);
        if !path.exists() {
            return Ok(None);
        }

        let mut contents = String::new();
        File::open(&path)?.read_to_string(&mut contents)?;
        let schema: TableSchema = serde_json::from_str(&contents)
            .map_err(|e| StoreError::SchemaError(format!("{}: {}", path.display(), e)))?;
        Ok(Some(schema))
    }

    fn save_schema(&self, table_name: &str, schema: &TableSchema) -> Result<(), StoreError> {
        let schema_dir = self.data_dir.join("schemas");
        if !schema_dir.exists() {
            std::fs::create_dir_all(&schema_dir)?;
        }

        let schema_json = serde_json::to_string_pretty(schema)
            .map_err(|e| StoreError::SchemaError(e.to_string()))?;
        let mut file = File::create(self.schema_path(table_name))?;
        file.write_all(schema_json.as_bytes())?;
        Ok(())
    }

    fn read_table(&self, table_name: &str) -> Result<Table, StoreError> {
        let mut rdr = csv::Reader::from_path(self.table_path(table_name))?;
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let records: Vec<csv::StringRecord> = rdr.records().collect::<Result<_, _>>()?;

        let columns = match self.load_schema(table_name)? {
            Some(schema) => {
                let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
                if names != headers {
                    return Err(StoreError::SchemaError(format!(
                        "Header of {}.csv ({}) does not match its schema ({})",
                        table_name,
                        headers.join(", "),
                        names.join(", ")
                    )));
                }
                schema.columns
            }
            None => infer_columns(&headers, &records),
        };

        let mut table = Table::new(table_name, columns);
        for record in &records {
            let row = table
                .columns()
                .iter()
                .enumerate()
                .map(|(i, col)| parse_cell(record.get(i).unwrap_or("NULL"), col))
                .collect::<Result<Vec<_>, _>>()?;
            table.push_row(row)?;
        }
        Ok(table)
    }

    fn write_table(&self, table: &Table) -> Result<(), StoreError> {
        let path = self.table_path(table.name());
        let tmp_path = path.with_extension("csv.tmp");

        {
            let mut wtr = csv::Writer::from_path(&tmp_path)?;
            wtr.write_record(table.columns().iter().map(|c| c.name.as_str()))?;
            for row in table.rows() {
                wtr.write_record(row.iter().map(|v| v.to_string()))?;
            }
            wtr.flush()?;
        }

        std::fs::rename(&tmp_path, &path)?;
        log::debug!("Wrote {} rows to {:?}", table.row_count(), path);
        Ok(())
    }

    /// Creates an empty table file with a header row and saves its schema.
    pub fn create_table(&mut self, table_name: &str, columns: Vec<Column>) -> Result<(), StoreError> {
        if self.table_path(table_name).exists() {
            return Err(StoreError::TableAlreadyExists(table_name.to_string()));
        }

        let schema = TableSchema {
            columns: columns.clone(),
        };
        self.inner.create_table(table_name, columns)?;
        self.save_schema(table_name, &schema)?;
        if let Some(table) = self.inner.table(table_name) {
            self.write_table(table)?;
        }

        log::info!(
            "Created table '{}' with {} columns",
            table_name,
            schema.columns.len()
        );
        Ok(())
    }

    /// Rewrites every dirty table. A table whose write fails stays dirty.
    fn write_dirty(&mut self) -> Result<usize, StoreError> {
        let mut dirty: Vec<String> = self.dirty.iter().cloned().collect();
        dirty.sort();
        for table_name in &dirty {
            let table = self
                .inner
                .table(table_name)
                .ok_or_else(|| StoreError::TableNotFound(table_name.clone()))?;
            self.write_table(table)?;
            self.dirty.remove(table_name);
        }
        Ok(dirty.len())
    }
}

impl Drop for CsvStore {
    fn drop(&mut self) {
        if self.dirty.is_empty() || self.inner.in_transaction() {
            return;
        }
        if let Err(e) = self.write_dirty() {
            log::error!("Unsaved changes in {:?} were lost: {}", self.data_dir, e);
        }
    }
}

fn infer_columns(headers: &[String], records: &[csv::StringRecord]) -> Vec<Column> {
    headers
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let all_int = records.iter().all(|r| match r.get(i) {
                Some(cell) if cell != "NULL" && !cell.is_empty() => is_canonical_int(cell),
                _ => true,
            });
            let data_type = if all_int && !records.is_empty() {
                DataType::Int
            } else {
                DataType::Text
            };
            Column::new(name.clone(), data_type)
        })
        .collect()
}

fn is_canonical_int(cell: &str) -> bool {
    cell.parse::<i64>().is_ok_and(|n| n.to_string() == cell)
}

fn parse_cell(cell: &str, column: &Column) -> Result<Value, StoreError> {
    if cell == "NULL" {
        return Ok(Value::Null);
    }

    let invalid = |kind: &str| {
        StoreError::ValueError(format!("Invalid {} in column {}: {}", kind, column.name, cell))
    };
    match column.data_type {
        DataType::Int => {
            if cell.trim().is_empty() {
                return Ok(Value::Null);
            }
            cell.trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| invalid("integer"))
        }
        DataType::Float => cell
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| invalid("float")),
        DataType::Boolean => Ok(Value::Boolean(cell.eq_ignore_ascii_case("true"))),
        DataType::Text => Ok(Value::String(cell.to_string())),
    }
}

#[async_trait]
impl Store for CsvStore {
    async fn query(&self, stmt: &Statement) -> Result<QueryResult, StoreError> {
        self.inner.run_query(stmt)
    }

    async fn execute(&mut self, stmt: &Statement) -> Result<u64, StoreError> {
        let affected = self.inner.run_execute(stmt)?;
        if affected > 0 {
            self.dirty.insert(stmt.table_name().to_string());
        }
        Ok(affected)
    }

    async fn flush(&mut self) -> Result<(), StoreError> {
        if self.inner.in_transaction() {
            return Err(StoreError::TransactionError(
                "Cannot flush inside a transaction; commit instead".to_string(),
            ));
        }
        let written = self.write_dirty()?;
        log::debug!("Flushed {} table(s)", written);
        Ok(())
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    async fn begin(&mut self) -> Result<(), StoreError> {
        if self.inner.in_transaction() {
            return Err(StoreError::TransactionError(
                "Already in a transaction".to_string(),
            ));
        }
        // Earlier autocommit writes must not be undone by a rollback.
        self.write_dirty()?;
        self.inner.begin_snapshot()
    }

    /// On a failed write the transaction stays open so it can be rolled back.
    async fn commit(&mut self) -> Result<(), StoreError> {
        if !self.inner.in_transaction() {
            return Err(StoreError::TransactionError(
                "Not in a transaction".to_string(),
            ));
        }
        let written = self.write_dirty()?;
        self.inner.release_snapshot()?;
        log::debug!("Committed {} table(s)", written);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.dirty.clear();
        self.inner.restore_snapshot()
    }
}
