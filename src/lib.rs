// Hierarchy and aggregation
pub mod model;
pub mod tree;
pub mod rollup;

// Storage and configuration
pub mod store;
pub mod config;

// Interactive console
pub mod repl;

// Public exports
pub use config::{RollupConfig, RootPolicy};
pub use model::{Counters, RegionNode};
pub use rollup::{PassReport, Rollup, RollupError};
pub use store::{CsvStore, MemoryStore, Store, StoreError};
pub use tree::{RootSelection, TreeError, TreeItem};
