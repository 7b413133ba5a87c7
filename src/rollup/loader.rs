//! Direct (non-recursive) channel and device counts per region.

use std::collections::{HashMap, HashSet};

use crate::config::{LeafTable, RollupConfig};
use crate::model::{Counters, LeafKind, Measure};
use crate::store::{Condition, Statement, Store, StoreError, Value};

/// Direct counts for every known region, plus leaf rows that point at no
/// known region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectCounts {
    pub by_region: HashMap<String, Counters>,
    /// Channel and device rows whose region id is not in the region table.
    pub orphaned: HashMap<String, i64>,
}

impl DirectCounts {
    pub fn get(&self, region_id: &str) -> Counters {
        self.by_region.get(region_id).copied().unwrap_or_default()
    }

    pub fn orphaned_rows(&self) -> i64 {
        self.orphaned.values().sum()
    }

    /// Sum of the direct counts over all known regions.
    pub fn sum(&self) -> Counters {
        let mut total = Counters::default();
        for counters in self.by_region.values() {
            total += *counters;
        }
        total
    }
}

fn count_statement(leaf: &LeafTable, status: Option<i64>) -> Statement {
    Statement::CountBy {
        table_name: leaf.table.clone(),
        group_column: leaf.region_column.clone(),
        conditions: status
            .map(|code| vec![Condition::eq(leaf.status_column.clone(), code)])
            .unwrap_or_default(),
    }
}

/// Queries the channel and device tables for the rows assigned directly to
/// each region. Only read-only statements are issued.
///
/// Every id in `region_ids` gets an entry, all zero when nothing is assigned
/// to it.
pub async fn load_direct_counts<S>(
    store: &S,
    config: &RollupConfig,
    region_ids: &[&str],
) -> Result<DirectCounts, StoreError>
where
    S: Store + ?Sized,
{
    let known: HashSet<&str> = region_ids.iter().copied().collect();
    let mut counts = DirectCounts {
        by_region: region_ids
            .iter()
            .map(|id| (id.to_string(), Counters::default()))
            .collect(),
        orphaned: HashMap::new(),
    };

    let plan = [
        (LeafKind::Channel, &config.channel),
        (LeafKind::Device, &config.device),
    ];
    let measures = [
        (Measure::Total, None),
        (Measure::Online, Some(config.status.online)),
        (Measure::Broken, Some(config.status.broken)),
    ];

    for (kind, leaf) in plan {
        for (measure, status) in measures {
            let stmt = count_statement(leaf, status);
            log::debug!("{}", stmt);
            let result = store.query(&stmt).await?;

            for row in &result.rows {
                let (region, count) = match row.as_slice() {
                    [region, count, ..] => (region, count),
                    _ => {
                        return Err(StoreError::ValueError(format!(
                            "grouped count over {} returned a row with {} column(s)",
                            leaf.table,
                            row.len()
                        )))
                    }
                };
                let count = count.as_i64().ok_or_else(|| {
                    StoreError::ValueError(format!(
                        "grouped count over {} returned non-integer {:?}",
                        leaf.table, count
                    ))
                })?;

                let region_id = match region {
                    Value::Null => None,
                    other => Some(other.to_string()),
                };
                match region_id {
                    Some(id) if known.contains(id.as_str()) => {
                        if let Some(counters) = counts.by_region.get_mut(&id) {
                            *counters.slot_mut(kind, measure) += count;
                        }
                    }
                    // Only the unfiltered count, so each orphan row is tallied once.
                    _ if measure == Measure::Total => {
                        *counts
                            .orphaned
                            .entry(kind.as_str().to_string())
                            .or_insert(0) += count;
                    }
                    _ => {}
                }
            }
        }
    }

    let direct = counts.sum();
    log::info!(
        "Loaded direct counts for {} regions: {} channels, {} devices",
        region_ids.len(),
        direct.channel_total,
        direct.device_total
    );
    if counts.orphaned_rows() > 0 {
        log::warn!(
            "{} leaf row(s) reference no known region and are not counted: {:?}",
            counts.orphaned_rows(),
            counts.orphaned
        );
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Column, DataType, MemoryStore};

    fn leaf_store(channels: &[(&str, i64)], devices: &[(&str, i64)]) -> MemoryStore {
        let mut store = MemoryStore::new();
        for (name, rows) in [("channel", channels), ("device", devices)] {
            store
                .create_table(
                    name,
                    vec![
                        Column::new("id", DataType::Text),
                        Column::new("region_id", DataType::Text),
                        Column::new("status", DataType::Int),
                    ],
                )
                .unwrap();
            for (i, (region, status)) in rows.iter().enumerate() {
                let stmt = Statement::Insert {
                    table_name: name.to_string(),
                    columns: vec!["id".into(), "region_id".into(), "status".into()],
                    values: vec![
                        Value::String(format!("{name}{i}")),
                        Value::from(*region),
                        Value::Integer(*status),
                    ],
                };
                store.run_execute(&stmt).unwrap();
            }
        }
        store
    }

    #[tokio::test]
    async fn counts_total_online_and_broken_per_region() {
        let store = leaf_store(
            &[("A", 2), ("A", 1), ("A", 0), ("B", 2)],
            &[("B", 1), ("B", 1)],
        );
        let counts = load_direct_counts(&store, &RollupConfig::default(), &["A", "B", "C"])
            .await
            .unwrap();

        assert_eq!(
            counts.get("A"),
            Counters {
                channel_total: 3,
                channel_online: 1,
                channel_broken: 1,
                ..Counters::default()
            }
        );
        assert_eq!(
            counts.get("B"),
            Counters {
                channel_total: 1,
                channel_online: 1,
                device_total: 2,
                device_broken: 2,
                ..Counters::default()
            }
        );
        assert!(counts.get("C").is_zero());
        assert!(counts.by_region.contains_key("C"));
        assert_eq!(counts.orphaned_rows(), 0);
    }

    #[tokio::test]
    async fn rows_for_unknown_regions_are_orphaned_once() {
        let store = leaf_store(&[("A", 2), ("Z", 2), ("Z", 1)], &[("Y", 0)]);
        let counts = load_direct_counts(&store, &RollupConfig::default(), &["A"])
            .await
            .unwrap();

        assert_eq!(counts.get("A").channel_total, 1);
        assert_eq!(counts.orphaned.get("channel"), Some(&2));
        assert_eq!(counts.orphaned.get("device"), Some(&1));
        assert_eq!(counts.orphaned_rows(), 3);
    }

    #[tokio::test]
    async fn missing_leaf_table_is_a_store_error() {
        let store = MemoryStore::new();
        let err = load_direct_counts(&store, &RollupConfig::default(), &["A"])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TableNotFound(t) if t == "channel"));
    }

    #[test]
    fn status_filter_uses_configured_column() {
        let mut leaf = LeafTable::new("channel");
        leaf.status_column = "state".to_string();
        let stmt = count_statement(&leaf, Some(2));
        assert_eq!(
            stmt.to_string(),
            "SELECT region_id, COUNT(*) FROM channel WHERE state = 2 GROUP BY region_id"
        );
    }
}
