use std::collections::HashMap;

use super::statement::{Assignment, Column, Condition, DataType, QueryResult, Value};
use super::StoreError;

type Index = HashMap<String, Vec<usize>>;

/// Rows of one table held in memory, typed by the column list.
///
/// Updates find their rows through an index on the column of the first
/// condition. An index is built on first use, kept current by inserts and
/// dropped when an update writes its column.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    indexes: HashMap<usize, Index>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
            indexes: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_index(&self, column_name: &str) -> Result<usize, StoreError> {
        self.columns
            .iter()
            .position(|c| c.name == column_name)
            .ok_or_else(|| StoreError::ColumnNotFound(column_name.to_string(), self.name.clone()))
    }

    fn coerce(&self, index: usize, value: &Value) -> Result<Value, StoreError> {
        let column = &self.columns[index];
        value.coerce_to(column.data_type).ok_or_else(|| {
            StoreError::ValueError(format!(
                "cannot store {value:?} in {}.{} ({:?})",
                self.name, column.name, column.data_type
            ))
        })
    }

    /// Resolves conditions to column indices once, with the comparison value
    /// already converted to the column's type.
    fn compile(&self, conditions: &[Condition]) -> Result<Vec<(usize, Value)>, StoreError> {
        conditions
            .iter()
            .map(|cond| {
                let index = self.column_index(&cond.column_name)?;
                // A value the column cannot hold never matches.
                Ok((index, coerce_or_keep(self.columns[index].data_type, &cond.value)))
            })
            .collect()
    }

    fn index_on(&mut self, column: usize) -> &Index {
        let rows = &self.rows;
        self.indexes.entry(column).or_insert_with(|| {
            let mut index = Index::new();
            for (i, row) in rows.iter().enumerate() {
                index.entry(group_key(&row[column])).or_default().push(i);
            }
            index
        })
    }

    fn append(&mut self, row: Vec<Value>) {
        let position = self.rows.len();
        for (column, index) in self.indexes.iter_mut() {
            index.entry(group_key(&row[*column])).or_default().push(position);
        }
        self.rows.push(row);
    }

    pub fn insert(&mut self, columns: &[String], values: &[Value]) -> Result<(), StoreError> {
        if columns.len() != values.len() {
            return Err(StoreError::SchemaError(format!(
                "Column count ({}) does not match value count ({})",
                columns.len(),
                values.len()
            )));
        }

        if columns.is_empty() {
            return Err(StoreError::SchemaError(format!(
                "INSERT into {} names no columns",
                self.name
            )));
        }

        let mut row = vec![Value::Null; self.columns.len()];
        for (col, value) in columns.iter().zip(values) {
            let index = self.column_index(col)?;
            row[index] = self.coerce(index, value)?;
        }
        self.append(row);
        Ok(())
    }

    /// Appends a row already in column order, as read back from disk.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), StoreError> {
        if row.len() != self.columns.len() {
            return Err(StoreError::SchemaError(format!(
                "Row has {} values but table {} has {} columns",
                row.len(),
                self.name,
                self.columns.len()
            )));
        }
        self.append(row);
        Ok(())
    }

    pub fn select(
        &self,
        columns: &[String],
        conditions: &[Condition],
    ) -> Result<QueryResult, StoreError> {
        let selected: Vec<usize> = if columns.is_empty() || (columns.len() == 1 && columns[0] == "*")
        {
            (0..self.columns.len()).collect()
        } else {
            columns
                .iter()
                .map(|c| self.column_index(c))
                .collect::<Result<_, _>>()?
        };
        let compiled = self.compile(conditions)?;

        let rows = self
            .rows
            .iter()
            .filter(|row| matches(row, &compiled))
            .map(|row| selected.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(QueryResult {
            columns: selected
                .iter()
                .map(|&i| self.columns[i].name.clone())
                .collect(),
            rows,
        })
    }

    /// Counts matching rows per distinct value of `group_column`, in order
    /// of first appearance. The result has the columns `[group_column, "count"]`.
    pub fn count_by(
        &self,
        group_column: &str,
        conditions: &[Condition],
    ) -> Result<QueryResult, StoreError> {
        let group_index = self.column_index(group_column)?;
        let compiled = self.compile(conditions)?;

        let mut order: Vec<Value> = Vec::new();
        let mut counts: HashMap<String, i64> = HashMap::new();
        for row in self.rows.iter().filter(|row| matches(row, &compiled)) {
            let key = &row[group_index];
            let count = counts.entry(group_key(key)).or_insert_with(|| {
                order.push(key.clone());
                0
            });
            *count += 1;
        }

        let rows = order
            .into_iter()
            .map(|key| {
                let count = counts.get(&group_key(&key)).copied().unwrap_or_default();
                vec![key, Value::Integer(count)]
            })
            .collect();

        Ok(QueryResult {
            columns: vec![group_column.to_string(), "count".to_string()],
            rows,
        })
    }

    pub fn update(
        &mut self,
        assignments: &[Assignment],
        conditions: &[Condition],
    ) -> Result<u64, StoreError> {
        let compiled = self.compile(conditions)?;
        let resolved: Vec<(usize, Value)> = assignments
            .iter()
            .map(|a| {
                let index = self.column_index(&a.column_name)?;
                Ok((index, self.coerce(index, &a.value)?))
            })
            .collect::<Result<_, StoreError>>()?;

        let candidates: Vec<usize> = match compiled.first() {
            Some((column, value)) => self
                .index_on(*column)
                .get(&group_key(value))
                .cloned()
                .unwrap_or_default(),
            None => (0..self.rows.len()).collect(),
        };

        let mut affected = 0;
        for position in candidates {
            let row = &mut self.rows[position];
            if !matches(row.as_slice(), &compiled) {
                continue;
            }
            for (index, value) in &resolved {
                row[*index] = value.clone();
            }
            affected += 1;
        }

        for (index, _) in &resolved {
            self.indexes.remove(index);
        }
        Ok(affected)
    }
}

fn matches(row: &[Value], compiled: &[(usize, Value)]) -> bool {
    compiled.iter().all(|(index, value)| &row[*index] == value)
}

fn group_key(value: &Value) -> String {
    match value {
        Value::Null => "\u{0}NULL".to_string(),
        other => other.to_string(),
    }
}

fn coerce_or_keep(data_type: DataType, value: &Value) -> Value {
    value.coerce_to(data_type).unwrap_or_else(|| value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> Table {
        let mut table = Table::new(
            "channel",
            vec![
                Column::new("id", DataType::Text),
                Column::new("region_id", DataType::Text),
                Column::new("status", DataType::Int),
            ],
        );
        let cols: Vec<String> = ["id", "region_id", "status"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for (id, region, status) in [("c1", "A", 2), ("c2", "A", 1), ("c3", "B", 2)] {
            table
                .insert(&cols, &[id.into(), region.into(), Value::Integer(status)])
                .unwrap();
        }
        table
    }

    #[test]
    fn count_by_groups_in_first_seen_order() {
        let table = channels();
        let result = table.count_by("region_id", &[]).unwrap();
        assert_eq!(result.columns, vec!["region_id", "count"]);
        assert_eq!(
            result.rows,
            vec![
                vec![Value::from("A"), Value::Integer(2)],
                vec![Value::from("B"), Value::Integer(1)],
            ]
        );
    }

    #[test]
    fn count_by_applies_conditions_with_coercion() {
        let table = channels();
        // "2" is coerced into the Int status column before comparing.
        let result = table
            .count_by("region_id", &[Condition::eq("status", "2")])
            .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert!(result.rows.iter().all(|r| r[1] == Value::Integer(1)));
    }

    #[test]
    fn update_reports_affected_rows() {
        let mut table = channels();
        let affected = table
            .update(
                &[Assignment::new("status", 0i64)],
                &[Condition::eq("region_id", "A")],
            )
            .unwrap();
        assert_eq!(affected, 2);

        let missing = table
            .update(
                &[Assignment::new("status", 0i64)],
                &[Condition::eq("region_id", "Z")],
            )
            .unwrap();
        assert_eq!(missing, 0);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let table = channels();
        let err = table.select(&["nope".to_string()], &[]).unwrap_err();
        assert!(matches!(err, StoreError::ColumnNotFound(col, _) if col == "nope"));
    }

    #[test]
    fn update_rejects_values_the_column_cannot_hold() {
        let mut table = channels();
        let err = table
            .update(&[Assignment::new("status", "online")], &[])
            .unwrap_err();
        assert!(matches!(err, StoreError::ValueError(_)));
    }

    #[test]
    fn indexed_update_sees_rows_inserted_later() {
        let mut table = channels();
        let cols: Vec<String> = ["id", "region_id", "status"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let first = table
            .update(&[Assignment::new("status", 0i64)], &[Condition::eq("region_id", "B")])
            .unwrap();
        table
            .insert(&cols, &["c4".into(), "B".into(), Value::Integer(2)])
            .unwrap();
        let second = table
            .update(&[Assignment::new("status", 1i64)], &[Condition::eq("region_id", "B")])
            .unwrap();

        assert_eq!((first, second), (1, 2));
        assert_eq!(table.row_count(), 4);
    }

    #[test]
    fn updating_the_lookup_column_keeps_later_lookups_exact() {
        let mut table = channels();
        table
            .update(&[Assignment::new("region_id", "C")], &[Condition::eq("region_id", "A")])
            .unwrap();

        let stale = table
            .update(&[Assignment::new("status", 0i64)], &[Condition::eq("region_id", "A")])
            .unwrap();
        let moved = table
            .update(&[Assignment::new("status", 0i64)], &[Condition::eq("region_id", "C")])
            .unwrap();
        assert_eq!((stale, moved), (0, 2));
    }
}
