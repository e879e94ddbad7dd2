//! In-memory store backend
//!
//! Implements the [`Session`] contract against ordered in-memory partitions:
//! rows live in a BTreeMap keyed by (partition keys, clustering keys), so
//! range scans come back in ascending clustering order the same way the
//! production store returns them. Inserts are upserts keyed by the full
//! primary key, and per-row TTLs are enforced at read time against the
//! injected clock.

mod parse;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::data::error::StoreError;
use crate::data::store::{BoundStatement, PreparedStatement, Row, Session, Value};
use crate::utils::time::Clock;

use parse::{CmpOp, Condition, CreateTable, Plan, parse_create_table, parse_statement};

/// Primary-key component with a total order; only text, timestamp, and uuid
/// columns participate in keys
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyValue {
    Text(String),
    Timestamp(i64),
    Uuid(Uuid),
}

impl KeyValue {
    fn from_value(value: &Value) -> Result<Self, StoreError> {
        match value {
            Value::Text(s) => Ok(KeyValue::Text(s.clone())),
            Value::Timestamp(t) => Ok(KeyValue::Timestamp(*t)),
            Value::Uuid(u) => Ok(KeyValue::Uuid(*u)),
            Value::Null => Err(StoreError::invariant("null primary key component")),
            other => Err(StoreError::Statement(format!(
                "unsupported primary key value {:?}",
                other
            ))),
        }
    }
}

struct StoredRow {
    values: Vec<Value>,
    expires_at_millis: Option<i64>,
}

struct MemTable {
    /// Declared column names in order
    columns: Vec<String>,
    /// Indices of partition + clustering columns, in key order
    key_columns: Vec<usize>,
    rows: std::collections::BTreeMap<Vec<KeyValue>, StoredRow>,
}

impl MemTable {
    fn from_create(spec: &CreateTable) -> Result<Self, StoreError> {
        let column_index = |name: &str| -> Result<usize, StoreError> {
            spec.columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| {
                    StoreError::Statement(format!(
                        "primary key column {} not declared in {}",
                        name, spec.name
                    ))
                })
        };
        let mut key_columns = Vec::new();
        for key in spec.partition_keys.iter().chain(&spec.clustering_keys) {
            key_columns.push(column_index(key)?);
        }
        Ok(Self {
            columns: spec.columns.clone(),
            key_columns,
            rows: std::collections::BTreeMap::new(),
        })
    }

    fn column_index(&self, name: &str, table: &str) -> Result<usize, StoreError> {
        self.columns.iter().position(|c| c == name).ok_or_else(|| {
            StoreError::Statement(format!("unknown column {} in table {}", name, table))
        })
    }
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, MemTable>,
    statements: Vec<Plan>,
}

/// In-process [`Session`] implementation
pub struct MemorySession {
    clock: Arc<dyn Clock>,
    inner: RwLock<Inner>,
}

impl MemorySession {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering, StoreError> {
        let left = KeyValue::from_value(left)?;
        let right = KeyValue::from_value(right)?;
        Ok(left.cmp(&right))
    }

    fn matches(
        row: &StoredRow,
        table: &MemTable,
        table_name: &str,
        conditions: &[Condition],
        binds: &[Value],
    ) -> Result<bool, StoreError> {
        for (condition, bind) in conditions.iter().zip(binds) {
            let index = table.column_index(&condition.column, table_name)?;
            let cell = &row.values[index];
            let ok = match condition.op {
                CmpOp::Eq => {
                    if cell.is_null() {
                        false
                    } else {
                        Self::compare(cell, bind)? == std::cmp::Ordering::Equal
                    }
                }
                CmpOp::Gt => Self::compare(cell, bind)?.is_gt(),
                CmpOp::Ge => Self::compare(cell, bind)?.is_ge(),
                CmpOp::Le => Self::compare(cell, bind)?.is_le(),
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn execute_insert(
        &self,
        inner: &mut Inner,
        table_name: &str,
        columns: &[String],
        has_ttl: bool,
        values: Vec<Value>,
    ) -> Result<(), StoreError> {
        let expected = columns.len() + usize::from(has_ttl);
        if values.len() != expected {
            return Err(StoreError::Statement(format!(
                "expected {} bind values, got {}",
                expected,
                values.len()
            )));
        }
        let now = self.clock.current_time_millis();
        let table = inner
            .tables
            .get_mut(table_name)
            .ok_or_else(|| StoreError::Statement(format!("unknown table {}", table_name)))?;

        let expires_at_millis = if has_ttl {
            match values.last() {
                Some(Value::Int(ttl_secs)) if *ttl_secs > 0 => {
                    Some(now + i64::from(*ttl_secs) * 1000)
                }
                Some(Value::Int(_)) => None,
                other => {
                    return Err(StoreError::Statement(format!(
                        "ttl bind must be an int, got {:?}",
                        other
                    )));
                }
            }
        } else {
            None
        };

        let mut row_values = vec![Value::Null; table.columns.len()];
        for (column, value) in columns.iter().zip(&values) {
            let index = table.column_index(column, table_name)?;
            row_values[index] = value.clone();
        }
        let key = table
            .key_columns
            .iter()
            .map(|&i| KeyValue::from_value(&row_values[i]))
            .collect::<Result<Vec<_>, _>>()?;
        table.rows.insert(
            key,
            StoredRow {
                values: row_values,
                expires_at_millis,
            },
        );
        Ok(())
    }

    fn execute_select(
        &self,
        inner: &Inner,
        table_name: &str,
        columns: &[String],
        conditions: &[Condition],
        limit: Option<usize>,
        binds: &[Value],
    ) -> Result<Vec<Row>, StoreError> {
        if binds.len() != conditions.len() {
            return Err(StoreError::Statement(format!(
                "expected {} bind values, got {}",
                conditions.len(),
                binds.len()
            )));
        }
        let now = self.clock.current_time_millis();
        let table = inner
            .tables
            .get(table_name)
            .ok_or_else(|| StoreError::Statement(format!("unknown table {}", table_name)))?;
        let projection = columns
            .iter()
            .map(|c| table.column_index(c, table_name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::new();
        for stored in table.rows.values() {
            if stored
                .expires_at_millis
                .is_some_and(|expires| expires <= now)
            {
                continue;
            }
            if !Self::matches(stored, table, table_name, conditions, binds)? {
                continue;
            }
            rows.push(Row::new(
                projection.iter().map(|&i| stored.values[i].clone()).collect(),
            ));
            if limit.is_some_and(|n| rows.len() >= n) {
                break;
            }
        }
        Ok(rows)
    }

    fn execute_delete(
        &self,
        inner: &mut Inner,
        table_name: &str,
        conditions: &[Condition],
        binds: &[Value],
    ) -> Result<(), StoreError> {
        if binds.len() != conditions.len() {
            return Err(StoreError::Statement(format!(
                "expected {} bind values, got {}",
                conditions.len(),
                binds.len()
            )));
        }
        let table_ref = inner
            .tables
            .get(table_name)
            .ok_or_else(|| StoreError::Statement(format!("unknown table {}", table_name)))?;
        let mut doomed = Vec::new();
        for (key, stored) in &table_ref.rows {
            if Self::matches(stored, table_ref, table_name, conditions, binds)? {
                doomed.push(key.clone());
            }
        }
        let table = inner.tables.get_mut(table_name).expect("checked above");
        for key in doomed {
            table.rows.remove(&key);
        }
        Ok(())
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn create_table(&self, ddl: &str) -> Result<(), StoreError> {
        let spec = parse_create_table(ddl)?;
        let mut inner = self.inner.write();
        if !inner.tables.contains_key(&spec.name) {
            let table = MemTable::from_create(&spec)?;
            inner.tables.insert(spec.name.clone(), table);
        }
        Ok(())
    }

    async fn prepare(&self, statement: &str) -> Result<PreparedStatement, StoreError> {
        let plan = parse_statement(statement)?;
        let mut inner = self.inner.write();
        let table = match &plan {
            Plan::Insert { table, .. } | Plan::Select { table, .. } | Plan::Delete { table, .. } => {
                table
            }
        };
        if !inner.tables.contains_key(table) {
            return Err(StoreError::Statement(format!("unknown table {}", table)));
        }
        inner.statements.push(plan);
        Ok(PreparedStatement::new((inner.statements.len() - 1) as u64))
    }

    async fn execute(&self, bound: BoundStatement) -> Result<Vec<Row>, StoreError> {
        let mut inner = self.inner.write();
        let plan = inner
            .statements
            .get(bound.statement_id as usize)
            .cloned()
            .ok_or_else(|| {
                StoreError::Statement(format!("unknown statement id {}", bound.statement_id))
            })?;
        match plan {
            Plan::Insert {
                table,
                columns,
                has_ttl,
            } => {
                self.execute_insert(&mut inner, &table, &columns, has_ttl, bound.values)?;
                Ok(Vec::new())
            }
            Plan::Select {
                table,
                columns,
                conditions,
                limit,
            } => self.execute_select(&inner, &table, &columns, &conditions, limit, &bound.values),
            Plan::Delete { table, conditions } => {
                self.execute_delete(&mut inner, &table, &conditions, &bound.values)?;
                Ok(Vec::new())
            }
        }
    }
}
