use std::collections::HashMap;

use async_trait::async_trait;

use super::statement::{Column, QueryResult, Statement};
use super::{Store, StoreError, Table};

/// A store that keeps every table in memory.
///
/// Transactions are snapshot based: `begin` clones the table set and
/// `rollback` puts the clone back.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: HashMap<String, Table>,
    snapshot: Option<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&mut self, table_name: &str, columns: Vec<Column>) -> Result<(), StoreError> {
        if self.tables.contains_key(table_name) {
            return Err(StoreError::TableAlreadyExists(table_name.to_string()));
        }
        self.tables
            .insert(table_name.to_string(), Table::new(table_name, columns));
        log::debug!("Created in-memory table '{}'", table_name);
        Ok(())
    }

    pub fn table(&self, table_name: &str) -> Option<&Table> {
        self.tables.get(table_name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub(crate) fn put_table(&mut self, table: Table) {
        self.tables.insert(table.name().to_string(), table);
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn table_mut(&mut self, table_name: &str) -> Result<&mut Table, StoreError> {
        self.tables
            .get_mut(table_name)
            .ok_or_else(|| StoreError::TableNotFound(table_name.to_string()))
    }

    fn table_ref(&self, table_name: &str) -> Result<&Table, StoreError> {
        self.tables
            .get(table_name)
            .ok_or_else(|| StoreError::TableNotFound(table_name.to_string()))
    }

    pub(crate) fn run_query(&self, stmt: &Statement) -> Result<QueryResult, StoreError> {
        match stmt {
            Statement::Select {
                table_name,
                columns,
                conditions,
            } => self.table_ref(table_name)?.select(columns, conditions),
            Statement::CountBy {
                table_name,
                group_column,
                conditions,
            } => self.table_ref(table_name)?.count_by(group_column, conditions),
            other => Err(StoreError::NotAQuery(other.to_string())),
        }
    }

    pub(crate) fn run_execute(&mut self, stmt: &Statement) -> Result<u64, StoreError> {
        match stmt {
            Statement::Update {
                table_name,
                assignments,
                conditions,
            } => self.table_mut(table_name)?.update(assignments, conditions),
            Statement::Insert {
                table_name,
                columns,
                values,
            } => {
                self.table_mut(table_name)?.insert(columns, values)?;
                Ok(1)
            }
            other => Err(StoreError::ReadOnlyStatement(other.to_string())),
        }
    }

    pub(crate) fn begin_snapshot(&mut self) -> Result<(), StoreError> {
        if self.snapshot.is_some() {
            return Err(StoreError::TransactionError(
                "Already in a transaction".to_string(),
            ));
        }
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    pub(crate) fn release_snapshot(&mut self) -> Result<(), StoreError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| StoreError::TransactionError("Not in a transaction".to_string()))
    }

    pub(crate) fn restore_snapshot(&mut self) -> Result<(), StoreError> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| StoreError::TransactionError("Not in a transaction".to_string()))?;
        self.tables = snapshot;
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn query(&self, stmt: &Statement) -> Result<QueryResult, StoreError> {
        self.run_query(stmt)
    }

    async fn execute(&mut self, stmt: &Statement) -> Result<u64, StoreError> {
        self.run_execute(stmt)
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    async fn begin(&mut self) -> Result<(), StoreError> {
        self.begin_snapshot()
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.release_snapshot()
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.restore_snapshot()
    }
}
