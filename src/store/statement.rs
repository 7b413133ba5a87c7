use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int,
    Text,
    Float,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Converts the value into the representation a column of `data_type`
    /// stores. Returns `None` when the value has no such representation.
    pub fn coerce_to(&self, data_type: DataType) -> Option<Value> {
        match (self, data_type) {
            (Value::Null, _) => Some(Value::Null),
            (Value::Integer(_), DataType::Int)
            | (Value::Float(_), DataType::Float)
            | (Value::Boolean(_), DataType::Boolean)
            | (Value::String(_), DataType::Text) => Some(self.clone()),
            (Value::Integer(i), DataType::Float) => Some(Value::Float(*i as f64)),
            (Value::Float(_), DataType::Int) | (Value::String(_), DataType::Int) => {
                self.as_i64().map(Value::Integer)
            }
            (Value::String(s), DataType::Float) => s.trim().parse().ok().map(Value::Float),
            (Value::String(s), DataType::Boolean) => match s.to_ascii_lowercase().as_str() {
                "true" => Some(Value::Boolean(true)),
                "false" => Some(Value::Boolean(false)),
                _ => None,
            },
            (other, DataType::Text) => Some(Value::String(other.to_string())),
            _ => None,
        }
    }

    fn write_literal(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(fl) => write!(f, "{fl}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Null => write!(f, "NULL"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// `column_name = value`. Region ids and status codes are only ever
/// matched exactly.
pub struct Condition {
    pub column_name: String,
    pub value: Value,
}

impl Condition {
    pub fn eq(column_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column_name: column_name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub column_name: String,
    pub value: Value,
}

impl Assignment {
    pub fn new(column_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column_name: column_name.into(),
            value: value.into(),
        }
    }
}

/// A typed statement understood by every [`Store`](super::Store).
///
/// Conditions in a statement are combined with `AND`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Select {
        table_name: String,
        columns: Vec<String>,
        conditions: Vec<Condition>,
    },
    /// `SELECT group_column, COUNT(*) ... GROUP BY group_column`
    CountBy {
        table_name: String,
        group_column: String,
        conditions: Vec<Condition>,
    },
    Update {
        table_name: String,
        assignments: Vec<Assignment>,
        conditions: Vec<Condition>,
    },
    Insert {
        table_name: String,
        columns: Vec<String>,
        values: Vec<Value>,
    },
}

impl Statement {
    pub fn table_name(&self) -> &str {
        match self {
            Statement::Select { table_name, .. }
            | Statement::CountBy { table_name, .. }
            | Statement::Update { table_name, .. }
            | Statement::Insert { table_name, .. } => table_name,
        }
    }
}

fn write_conditions(f: &mut fmt::Formatter<'_>, conditions: &[Condition]) -> fmt::Result {
    for (i, cond) in conditions.iter().enumerate() {
        f.write_str(if i == 0 { " WHERE " } else { " AND " })?;
        write!(f, "{} = ", cond.column_name)?;
        cond.value.write_literal(f)?;
    }
    Ok(())
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Select {
                table_name,
                columns,
                conditions,
            } => {
                let cols = if columns.is_empty() {
                    "*".to_string()
                } else {
                    columns.join(", ")
                };
                write!(f, "SELECT {cols} FROM {table_name}")?;
                write_conditions(f, conditions)
            }
            Statement::CountBy {
                table_name,
                group_column,
                conditions,
            } => {
                write!(f, "SELECT {group_column}, COUNT(*) FROM {table_name}")?;
                write_conditions(f, conditions)?;
                write!(f, " GROUP BY {group_column}")
            }
            Statement::Update {
                table_name,
                assignments,
                conditions,
            } => {
                write!(f, "UPDATE {table_name} SET ")?;
                for (i, a) in assignments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} = ", a.column_name)?;
                    a.value.write_literal(f)?;
                }
                write_conditions(f, conditions)
            }
            Statement::Insert {
                table_name,
                columns,
                values,
            } => {
                write!(f, "INSERT INTO {table_name} ({}) VALUES (", columns.join(", "))?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    v.write_literal(f)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_renders_quoted_literals() {
        let stmt = Statement::Update {
            table_name: "region".to_string(),
            assignments: vec![
                Assignment::new("channel_total", 5i64),
                Assignment::new("device_total", 0i64),
            ],
            conditions: vec![Condition::eq("id", "O'Hare")],
        };

        assert_eq!(
            stmt.to_string(),
            "UPDATE region SET channel_total = 5, device_total = 0 WHERE id = 'O''Hare'"
        );
    }

    #[test]
    fn count_by_renders_group_clause() {
        let stmt = Statement::CountBy {
            table_name: "channel".to_string(),
            group_column: "region_id".to_string(),
            conditions: vec![Condition::eq("status", 2i64)],
        };

        assert_eq!(
            stmt.to_string(),
            "SELECT region_id, COUNT(*) FROM channel WHERE status = 2 GROUP BY region_id"
        );
    }

    #[test]
    fn coerce_string_ids_into_int_columns() {
        assert_eq!(
            Value::from("42").coerce_to(DataType::Int),
            Some(Value::Integer(42))
        );
        assert_eq!(Value::from("A1").coerce_to(DataType::Int), None);
        assert_eq!(
            Value::Integer(7).coerce_to(DataType::Text),
            Some(Value::String("7".to_string()))
        );
    }
}
