//! Wide-column store session abstraction
//!
//! Captures the wire contract the engine assumes from its store: statements
//! are prepared once and executed with positional binds, range reads return
//! rows in ascending clustering order, and every insert carries a per-row TTL
//! bound as its final value. Aggregation is never pushed to the store.

use std::collections::BTreeSet;

use async_trait::async_trait;
use uuid::Uuid;

use super::error::StoreError;

// =============================================================================
// Values
// =============================================================================

/// A bind or column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Double(f64),
    BigInt(i64),
    /// TTL binds and other 32-bit ints
    Int(i32),
    Boolean(bool),
    /// Epoch milliseconds
    Timestamp(i64),
    Blob(Vec<u8>),
    Uuid(Uuid),
    TextSet(BTreeSet<String>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn text_set(values: impl IntoIterator<Item = String>) -> Self {
        Value::TextSet(values.into_iter().collect())
    }
}

// =============================================================================
// Rows
// =============================================================================

/// One result row; columns are positional, in statement select order
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn get(&self, i: usize) -> Result<&Value, StoreError> {
        self.values
            .get(i)
            .ok_or_else(|| StoreError::decode(format!("column index {} out of range", i)))
    }

    pub fn text(&self, i: usize) -> Result<&str, StoreError> {
        match self.get(i)? {
            Value::Text(s) => Ok(s),
            Value::Null => Err(StoreError::invariant(format!("null text at column {}", i))),
            other => Err(wrong_type(i, "text", other)),
        }
    }

    pub fn double(&self, i: usize) -> Result<f64, StoreError> {
        // unset numeric cells read back as zero, matching wide-column stores
        match self.get(i)? {
            Value::Double(v) => Ok(*v),
            Value::Null => Ok(0.0),
            other => Err(wrong_type(i, "double", other)),
        }
    }

    pub fn opt_double(&self, i: usize) -> Result<Option<f64>, StoreError> {
        match self.get(i)? {
            Value::Double(v) => Ok(Some(*v)),
            Value::Null => Ok(None),
            other => Err(wrong_type(i, "double", other)),
        }
    }

    pub fn bigint(&self, i: usize) -> Result<i64, StoreError> {
        match self.get(i)? {
            Value::BigInt(v) => Ok(*v),
            Value::Null => Ok(0),
            other => Err(wrong_type(i, "bigint", other)),
        }
    }

    pub fn opt_bigint(&self, i: usize) -> Result<Option<i64>, StoreError> {
        match self.get(i)? {
            Value::BigInt(v) => Ok(Some(*v)),
            Value::Null => Ok(None),
            other => Err(wrong_type(i, "bigint", other)),
        }
    }

    pub fn boolean(&self, i: usize) -> Result<bool, StoreError> {
        match self.get(i)? {
            Value::Boolean(v) => Ok(*v),
            Value::Null => Ok(false),
            other => Err(wrong_type(i, "boolean", other)),
        }
    }

    pub fn timestamp(&self, i: usize) -> Result<i64, StoreError> {
        match self.get(i)? {
            Value::Timestamp(v) => Ok(*v),
            Value::Null => Err(StoreError::invariant(format!(
                "null timestamp at column {}",
                i
            ))),
            other => Err(wrong_type(i, "timestamp", other)),
        }
    }

    pub fn opt_blob(&self, i: usize) -> Result<Option<&[u8]>, StoreError> {
        match self.get(i)? {
            Value::Blob(bytes) => Ok(Some(bytes)),
            Value::Null => Ok(None),
            other => Err(wrong_type(i, "blob", other)),
        }
    }

    pub fn blob(&self, i: usize) -> Result<&[u8], StoreError> {
        self.opt_blob(i)?
            .ok_or_else(|| StoreError::invariant(format!("null blob at column {}", i)))
    }

    pub fn uuid(&self, i: usize) -> Result<Uuid, StoreError> {
        match self.get(i)? {
            Value::Uuid(v) => Ok(*v),
            Value::Null => Err(StoreError::invariant(format!("null uuid at column {}", i))),
            other => Err(wrong_type(i, "uuid", other)),
        }
    }

    pub fn text_set(&self, i: usize) -> Result<&BTreeSet<String>, StoreError> {
        match self.get(i)? {
            Value::TextSet(set) => Ok(set),
            Value::Null => Err(StoreError::invariant(format!(
                "null set<text> at column {}",
                i
            ))),
            other => Err(wrong_type(i, "set<text>", other)),
        }
    }
}

fn wrong_type(i: usize, expected: &str, got: &Value) -> StoreError {
    StoreError::decode(format!(
        "column {} is not {} (got {:?})",
        i, expected, got
    ))
}

// =============================================================================
// Statements
// =============================================================================

/// Handle to a statement prepared on a [`Session`]
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    id: u64,
}

impl PreparedStatement {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Bind positional values for execution
    pub fn bind(&self, values: Vec<Value>) -> BoundStatement {
        BoundStatement {
            statement_id: self.id,
            values,
        }
    }
}

/// A prepared statement plus its bind values
#[derive(Debug, Clone)]
pub struct BoundStatement {
    pub statement_id: u64,
    pub values: Vec<Value>,
}

// =============================================================================
// Session
// =============================================================================

/// A connection to the wide-column store.
///
/// Implementations must return range reads in ascending clustering order and
/// honor the TTL bound on inserts. All methods are safe to call concurrently.
#[async_trait]
pub trait Session: Send + Sync {
    /// Execute a `create table if not exists` statement (including any
    /// trailing compaction / gc options)
    async fn create_table(&self, ddl: &str) -> Result<(), StoreError>;

    /// Parse and register a statement for later execution
    async fn prepare(&self, statement: &str) -> Result<PreparedStatement, StoreError>;

    /// Execute a bound statement; selects return rows, writes return nothing
    async fn execute(&self, bound: BoundStatement) -> Result<Vec<Row>, StoreError>;
}
