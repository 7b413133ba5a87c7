use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Value error: {0}")]
    ValueError(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Transactions are not supported by this store")]
    TransactionsUnsupported,

    #[error("Statement is read-only and cannot be executed: {0}")]
    ReadOnlyStatement(String),

    #[error("Statement does not return rows: {0}")]
    NotAQuery(String),
}
