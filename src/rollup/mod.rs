//! One recomputation pass over the region hierarchy.
//!
//! A pass loads every region, seeds it with its direct channel and device
//! counts, builds the tree, folds child totals into parents and writes the
//! six counters of every processed region back to the store. Nothing is
//! written unless the hierarchy is well formed and has a root.

mod error;
pub mod loader;
pub mod persist;

use crate::config::{RollupConfig, RootPolicy};
use crate::model::RegionNode;
use crate::store::{Column, DataType, Statement, Store, StoreError, Value};
use crate::tree::{self, RootSelection, TreeItem};

pub use self::error::RollupError;
pub use self::loader::{load_direct_counts, DirectCounts};
pub use self::persist::{persist_totals, NodeUpdate, UnitOutcome, UpdateOutcome};

/// What a completed pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub regions_loaded: usize,
    /// Roots whose trees were folded and written.
    pub roots: Vec<String>,
    /// Roots left untouched because of [`RootPolicy::First`].
    pub skipped_roots: Vec<String>,
    pub orphaned_leaf_rows: i64,
    pub updates: Vec<NodeUpdate>,
    pub unit: UnitOutcome,
}

impl PassReport {
    pub fn failed_updates(&self) -> impl Iterator<Item = &NodeUpdate> {
        self.updates.iter().filter(|u| u.is_failed())
    }

    /// True when every update was applied and none were rolled back.
    pub fn is_clean(&self) -> bool {
        self.unit != UnitOutcome::RolledBack && self.failed_updates().next().is_none()
    }
}

/// Drives rollup passes against one store.
///
/// The driver holds the store mutably, so passes against it run one at a
/// time. No state carries over from one pass to the next.
pub struct Rollup<'s, S: Store + ?Sized> {
    store: &'s mut S,
    config: RollupConfig,
}

impl<'s, S: Store + ?Sized> Rollup<'s, S> {
    pub fn new(store: &'s mut S, config: RollupConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RollupConfig {
        &self.config
    }

    /// Loads the regions with their direct counts, before any folding.
    pub async fn load_regions(&self) -> Result<(Vec<RegionNode>, DirectCounts), RollupError> {
        let region = &self.config.region;
        let stmt = Statement::Select {
            table_name: region.table.clone(),
            columns: vec![region.id_column.clone(), region.parent_column.clone()],
            conditions: vec![],
        };
        log::debug!("{}", stmt);

        let result = self
            .store
            .query(&stmt)
            .await
            .map_err(|source| RollupError::Load {
                stage: "regions",
                source,
            })?;

        let mut links = Vec::with_capacity(result.rows.len());
        for (i, row) in result.rows.iter().enumerate() {
            let (id, parent) = match row.as_slice() {
                [id, parent, ..] => (id, parent),
                _ => {
                    return Err(RollupError::Load {
                        stage: "regions",
                        source: StoreError::ValueError(format!(
                            "region row {i} has {} column(s), expected 2",
                            row.len()
                        )),
                    })
                }
            };
            let (Some(id), Some(parent)) = (non_null(id), non_null(parent)) else {
                return Err(RollupError::Load {
                    stage: "regions",
                    source: StoreError::ValueError(format!(
                        "region row {i} has a NULL {} or {}",
                        region.id_column, region.parent_column
                    )),
                });
            };
            links.push((id, parent));
        }
        log::info!("Loaded {} regions from '{}'", links.len(), region.table);

        let ids: Vec<&str> = links.iter().map(|(id, _)| id.as_str()).collect();
        let direct = load_direct_counts(&*self.store, &self.config, &ids)
            .await
            .map_err(|source| RollupError::Load {
                stage: "direct leaf counts",
                source,
            })?;

        let nodes = links
            .iter()
            .map(|(id, parent)| RegionNode::seeded(id.clone(), parent.clone(), direct.get(id)))
            .collect();
        Ok((nodes, direct))
    }

    /// Builds the trees to process from seeded regions, applying the root
    /// policy. Returns the trees and the ids of skipped roots.
    pub fn plan_trees(
        &self,
        nodes: &[RegionNode],
    ) -> Result<(Vec<TreeItem<RegionNode>>, Vec<String>), RollupError> {
        let sentinel = self.config.root_sentinel.as_str();
        let forest = tree::build_forest(
            nodes,
            |n| n.id.as_str(),
            |n| n.parent_id.as_str(),
            sentinel,
        )
        .inspect_err(|e| log::error!("Region hierarchy is malformed: {}", e))?;

        match RootSelection::from_forest(forest) {
            RootSelection::NoRoot => {
                log::error!("No region has parent id '{}'; nothing to roll up", sentinel);
                Err(RollupError::NoRootFound {
                    sentinel: sentinel.to_string(),
                })
            }
            RootSelection::Single(root) => {
                log::info!("Found root region '{}' ({} regions)", root.item.id, root.len());
                Ok((vec![root], Vec::new()))
            }
            RootSelection::Multiple(mut roots) => {
                let ids: Vec<&str> = roots.iter().map(|r| r.item.id.as_str()).collect();
                log::warn!(
                    "{} regions have parent id '{}': {}",
                    roots.len(),
                    sentinel,
                    ids.join(", ")
                );
                match self.config.root_policy {
                    RootPolicy::All => Ok((roots, Vec::new())),
                    RootPolicy::First => {
                        let skipped: Vec<String> =
                            roots.drain(1..).map(|r| r.item.id.clone()).collect();
                        for id in &skipped {
                            log::warn!("Skipping root region '{}' and its subtree", id);
                        }
                        log::info!("Processing root region '{}'", roots[0].item.id);
                        Ok((roots, skipped))
                    }
                }
            }
        }
    }

    /// Computes the folded trees without writing anything back.
    pub async fn preview(&self) -> Result<Vec<TreeItem<RegionNode>>, RollupError> {
        let (nodes, _) = self.load_regions().await?;
        let (mut trees, _) = self.plan_trees(&nodes)?;
        trees.iter_mut().for_each(aggregate);
        Ok(trees)
    }

    /// Runs one full pass: load, seed, build, fold, write back.
    pub async fn run_pass(&mut self) -> Result<PassReport, RollupError> {
        let (nodes, direct) = self.load_regions().await?;
        let regions_loaded = nodes.len();
        let (mut trees, skipped_roots) = self.plan_trees(&nodes)?;

        trees.iter_mut().for_each(aggregate);
        let roots: Vec<String> = trees.iter().map(|t| t.item.id.clone()).collect();
        for tree in &trees {
            log::info!("Root region '{}' totals: {}", tree.item.id, tree.item.totals);
        }

        let (updates, unit) = persist_totals(&mut *self.store, &self.config, &trees).await?;
        let failed = updates.iter().filter(|u| u.is_failed()).count();
        log::info!(
            "Rollup pass finished: {} region(s) written, {} failed, {:?}",
            updates.len() - failed,
            failed,
            unit
        );

        Ok(PassReport {
            regions_loaded,
            roots,
            skipped_roots,
            orphaned_leaf_rows: direct.orphaned_rows(),
            updates,
            unit,
        })
    }
}

/// Replaces every node's totals with its direct counts plus the totals of
/// all its descendants.
pub fn aggregate(tree: &mut TreeItem<RegionNode>) {
    tree::fold_with_seed(tree, RegionNode::reset_totals, |parent, child| {
        parent.absorb(child)
    });
}

/// Column layouts of the region, channel and device tables under `config`.
pub fn table_layouts(config: &RollupConfig) -> Vec<(String, Vec<Column>)> {
    let region = &config.region;
    let mut region_columns = vec![
        Column::new(region.id_column.as_str(), DataType::Text),
        Column::new(region.parent_column.as_str(), DataType::Text),
    ];
    region_columns.extend(
        region
            .counter_columns()
            .iter()
            .map(|c| Column::new(*c, DataType::Int)),
    );

    let mut layouts = vec![(region.table.clone(), region_columns)];
    for leaf in [&config.channel, &config.device] {
        layouts.push((
            leaf.table.clone(),
            vec![
                Column::new("id", DataType::Text),
                Column::new(leaf.region_column.as_str(), DataType::Text),
                Column::new(leaf.status_column.as_str(), DataType::Int),
            ],
        ));
    }
    layouts
}

fn non_null(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Counters;

    fn channels(n: i64) -> Counters {
        Counters {
            channel_total: n,
            ..Counters::default()
        }
    }

    fn find<'a>(tree: &'a TreeItem<RegionNode>, id: &str) -> &'a RegionNode {
        tree.iter().find(|n| n.id == id).expect("region in tree")
    }

    #[test]
    fn aggregate_sums_siblings() {
        let mut tree = TreeItem::with_children(
            RegionNode::seeded("A", "0", channels(2)),
            vec![
                TreeItem::new(RegionNode::seeded("B", "A", channels(0))),
                TreeItem::new(RegionNode::seeded("C", "A", channels(3))),
            ],
        );

        aggregate(&mut tree);

        assert_eq!(find(&tree, "A").totals.channel_total, 5);
        assert_eq!(find(&tree, "B").totals.channel_total, 0);
        assert_eq!(find(&tree, "C").totals.channel_total, 3);
    }

    #[test]
    fn aggregate_twice_is_stable() {
        let mut tree = TreeItem::with_children(
            RegionNode::seeded("A", "0", channels(1)),
            vec![TreeItem::with_children(
                RegionNode::seeded("B", "A", channels(0)),
                vec![TreeItem::new(RegionNode::seeded("C", "B", channels(1)))],
            )],
        );

        aggregate(&mut tree);
        let first = tree.clone();
        aggregate(&mut tree);

        assert_eq!(tree, first);
        assert_eq!(find(&tree, "A").totals.channel_total, 2);
        assert_eq!(find(&tree, "B").totals.channel_total, 1);
    }
}
