mod csv_store;
mod error;
mod memory;
pub mod statement;
mod table;

use async_trait::async_trait;

pub use self::csv_store::CsvStore;
pub use self::error::StoreError;
pub use self::memory::MemoryStore;
pub use self::statement::{
    Assignment, Column, Condition, DataType, QueryResult, Statement, Value,
};
pub use self::table::Table;

/// The two primitives the rollup consumes from a relational store, plus
/// optional unit-of-work hooks.
///
/// Stores that cannot group writes keep the default hook implementations;
/// callers check [`Store::supports_transactions`] before calling `begin`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Runs a read-only statement and returns its rows.
    async fn query(&self, stmt: &Statement) -> Result<QueryResult, StoreError>;

    /// Runs a data-mutating statement and returns the number of affected rows.
    async fn execute(&mut self, stmt: &Statement) -> Result<u64, StoreError>;

    /// Makes every write accepted outside a transaction durable. Stores that
    /// persist each statement as it runs have nothing to do.
    async fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn supports_transactions(&self) -> bool {
        false
    }

    async fn begin(&mut self) -> Result<(), StoreError> {
        Err(StoreError::TransactionsUnsupported)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        Err(StoreError::TransactionsUnsupported)
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        Err(StoreError::TransactionsUnsupported)
    }
}
