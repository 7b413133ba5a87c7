use thiserror::Error;

use crate::store::StoreError;
use crate::tree::TreeError;

use super::NodeUpdate;

/// Reasons a rollup pass stops before or during write-back.
///
/// Every variant aborts the pass. Failures of individual region updates are
/// not errors; they are recorded in the pass report.
#[derive(Error, Debug)]
pub enum RollupError {
    #[error("Failed to load {stage}: {source}")]
    Load {
        stage: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Region hierarchy is malformed: {0}")]
    Structural(#[from] TreeError),

    #[error("No root region found: no region has parent id '{sentinel}'")]
    NoRootFound { sentinel: String },

    #[error("Could not start the write-back transaction: {0}")]
    Transaction(#[source] StoreError),

    #[error("Write-back did not complete: {source}")]
    WriteBack {
        #[source]
        source: StoreError,
        updates: Vec<NodeUpdate>,
    },
}

impl RollupError {
    /// The region id the error is about, when there is one.
    pub fn region_id(&self) -> Option<&str> {
        match self {
            RollupError::Structural(err) => err.id(),
            _ => None,
        }
    }

    /// Per-region outcomes recorded before the write-back failed.
    pub fn updates(&self) -> &[NodeUpdate] {
        match self {
            RollupError::WriteBack { updates, .. } => updates,
            _ => &[],
        }
    }
}
