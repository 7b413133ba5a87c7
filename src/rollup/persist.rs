//! Write-back of folded totals as one unit of work.

use crate::config::RollupConfig;
use crate::model::{Counters, RegionNode};
use crate::store::{Assignment, Condition, Statement, Store, StoreError};
use crate::tree::TreeItem;

use super::RollupError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied { rows: u64 },
    Failed { reason: String },
    /// The update ran but the transaction around it was rolled back.
    RolledBack { rows: u64 },
}

/// The write-back result for one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeUpdate {
    pub region_id: String,
    pub totals: Counters,
    pub outcome: UpdateOutcome,
}

impl NodeUpdate {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, UpdateOutcome::Failed { .. })
    }
}

/// How the batch of updates was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Each update took effect on its own.
    AutoCommit,
    /// All updates were committed together.
    Committed,
    /// An update failed and the whole batch was undone.
    RolledBack,
}

pub fn update_statement(config: &RollupConfig, node: &RegionNode) -> Statement {
    let region = &config.region;
    let assignments = region
        .counter_columns()
        .iter()
        .zip(node.totals.to_array())
        .map(|(column, value)| Assignment::new(*column, value))
        .collect();

    Statement::Update {
        table_name: region.table.clone(),
        assignments,
        conditions: vec![Condition::eq(region.id_column.clone(), node.id.clone())],
    }
}

fn mark_rolled_back(updates: &mut [NodeUpdate]) {
    for update in updates.iter_mut() {
        if let UpdateOutcome::Applied { rows } = update.outcome {
            update.outcome = UpdateOutcome::RolledBack { rows };
        }
    }
}

fn mark_unsaved(updates: &mut [NodeUpdate], cause: &StoreError) {
    for update in updates.iter_mut() {
        if matches!(update.outcome, UpdateOutcome::Applied { .. }) {
            update.outcome = UpdateOutcome::Failed {
                reason: format!("not saved: {cause}"),
            };
        }
    }
}

/// Issues one update per node of every tree, in pre-order.
///
/// Outside a transaction a failed update is recorded, the remaining nodes are
/// still written and the store is flushed at the end. When
/// `config.transactional` is set and the store supports it, the updates run
/// inside `begin`/`commit` and a single failure rolls the whole batch back.
///
/// A failed flush, commit or rollback ends in [`RollupError::WriteBack`],
/// which still carries the per-node outcomes.
pub async fn persist_totals<S>(
    store: &mut S,
    config: &RollupConfig,
    trees: &[TreeItem<RegionNode>],
) -> Result<(Vec<NodeUpdate>, UnitOutcome), RollupError>
where
    S: Store + ?Sized,
{
    let transactional = config.transactional && store.supports_transactions();
    if config.transactional && !transactional {
        log::warn!("Store does not support transactions; writing updates one by one");
    }
    if transactional {
        store.begin().await.map_err(RollupError::Transaction)?;
    }

    let mut updates = Vec::new();
    for node in trees.iter().flat_map(|tree| tree.iter()) {
        let stmt = update_statement(config, node);
        log::debug!("{}", stmt);

        let outcome = match store.execute(&stmt).await {
            Ok(rows) => {
                if rows == 0 {
                    log::warn!("Update of region '{}' affected no rows", node.id);
                } else {
                    log::info!(
                        "Updated region '{}' ({}): {} row(s) affected",
                        node.id,
                        node.totals,
                        rows
                    );
                }
                UpdateOutcome::Applied { rows }
            }
            Err(e) => {
                log::error!("Update of region '{}' failed: {}", node.id, e);
                UpdateOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        updates.push(NodeUpdate {
            region_id: node.id.clone(),
            totals: node.totals,
            outcome,
        });
    }

    if !transactional {
        if let Err(source) = store.flush().await {
            log::error!("Saving region updates failed: {}", source);
            mark_unsaved(&mut updates, &source);
            return Err(RollupError::WriteBack { source, updates });
        }
        return Ok((updates, UnitOutcome::AutoCommit));
    }

    let failed = updates.iter().filter(|u| u.is_failed()).count();
    if failed > 0 {
        if let Err(source) = store.rollback().await {
            log::error!("Rollback after failed updates did not complete: {}", source);
            return Err(RollupError::WriteBack { source, updates });
        }
        mark_rolled_back(&mut updates);
        log::warn!(
            "Rolled back {} region update(s) after {} failure(s)",
            updates.len(),
            failed
        );
        return Ok((updates, UnitOutcome::RolledBack));
    }

    if let Err(source) = store.commit().await {
        log::error!("Commit of region updates failed: {}", source);
        match store.rollback().await {
            Ok(()) => mark_rolled_back(&mut updates),
            Err(e) => log::error!("Rollback after failed commit did not complete: {}", e),
        }
        return Err(RollupError::WriteBack { source, updates });
    }
    log::info!("Committed {} region update(s)", updates.len());
    Ok((updates, UnitOutcome::Committed))
}
