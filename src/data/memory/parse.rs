//! Statement parsing for the in-memory backend
//!
//! The engine only ever emits the narrow statement grammar produced by
//! [`crate::data::schema`] and the work-queue builders, so the backend parses
//! exactly that grammar at prepare time: single-table inserts with a trailing
//! TTL bind, conjunctive equality/range selects with an optional limit, and
//! conjunctive equality deletes.

use crate::data::error::StoreError;

/// Comparison operator in a where clause; each condition carries one bind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Gt,
    Ge,
    Le,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub column: String,
    pub op: CmpOp,
}

/// A parsed, executable statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Insert {
        table: String,
        columns: Vec<String>,
        has_ttl: bool,
    },
    Select {
        table: String,
        columns: Vec<String>,
        conditions: Vec<Condition>,
        limit: Option<usize>,
    },
    Delete {
        table: String,
        conditions: Vec<Condition>,
    },
}

/// A parsed `create table if not exists` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    pub name: String,
    /// Declared column names, in order
    pub columns: Vec<String>,
    pub partition_keys: Vec<String>,
    pub clustering_keys: Vec<String>,
}

fn statement_error(statement: &str, reason: &str) -> StoreError {
    StoreError::Statement(format!("{}: {}", reason, statement))
}

/// Split a comma-separated list, ignoring commas inside parentheses
fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in body.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Extract the contents of the parenthesized block starting at `start`
/// (which must point at `(`), returning the inner text and the index just
/// past the closing paren.
fn paren_block(text: &str, start: usize) -> Result<(&str, usize), StoreError> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'(') {
        return Err(statement_error(text, "expected opening paren"));
    }
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset;
                    return Ok((&text[start + 1..end], end + 1));
                }
            }
            _ => {}
        }
    }
    Err(statement_error(text, "unbalanced parens"))
}

pub fn parse_create_table(ddl: &str) -> Result<CreateTable, StoreError> {
    let rest = ddl
        .strip_prefix("create table if not exists ")
        .or_else(|| ddl.strip_prefix("create table "))
        .ok_or_else(|| statement_error(ddl, "not a create table statement"))?;
    let paren = rest
        .find('(')
        .ok_or_else(|| statement_error(ddl, "missing column list"))?;
    let name = rest[..paren].trim().to_string();
    let (body, _) = paren_block(rest, paren)?;

    let mut columns = Vec::new();
    let mut partition_keys = Vec::new();
    let mut clustering_keys = Vec::new();
    for entry in split_top_level(body) {
        if let Some(key_spec) = entry.strip_prefix("primary key") {
            let key_spec = key_spec.trim();
            let (key_body, _) = paren_block(key_spec, 0)?;
            let key_parts = split_top_level(key_body);
            let mut parts = key_parts.into_iter();
            match parts.next() {
                Some(first) if first.starts_with('(') => {
                    // composite partition key
                    let (inner, _) = paren_block(&first, 0)?;
                    partition_keys = split_top_level(inner);
                }
                Some(first) => partition_keys.push(first),
                None => return Err(statement_error(ddl, "empty primary key")),
            }
            clustering_keys.extend(parts);
        } else {
            let column_name = entry
                .split_whitespace()
                .next()
                .ok_or_else(|| statement_error(ddl, "empty column declaration"))?;
            columns.push(column_name.to_string());
        }
    }
    if partition_keys.is_empty() {
        return Err(statement_error(ddl, "missing primary key"));
    }
    Ok(CreateTable {
        name,
        columns,
        partition_keys,
        clustering_keys,
    })
}

fn parse_conditions(clause: &str, statement: &str) -> Result<Vec<Condition>, StoreError> {
    let mut conditions = Vec::new();
    for part in clause.split(" and ") {
        let part = part.trim();
        let (column, op) = if let Some(column) = part.strip_suffix(">= ?") {
            (column, CmpOp::Ge)
        } else if let Some(column) = part.strip_suffix("<= ?") {
            (column, CmpOp::Le)
        } else if let Some(column) = part.strip_suffix("> ?") {
            (column, CmpOp::Gt)
        } else if let Some(column) = part.strip_suffix("= ?") {
            (column, CmpOp::Eq)
        } else {
            return Err(statement_error(statement, "unsupported condition"));
        };
        conditions.push(Condition {
            column: column.trim().to_string(),
            op,
        });
    }
    Ok(conditions)
}

pub fn parse_statement(statement: &str) -> Result<Plan, StoreError> {
    let statement = statement.trim();
    if let Some(rest) = statement.strip_prefix("insert into ") {
        let paren = rest
            .find('(')
            .ok_or_else(|| statement_error(statement, "missing column list"))?;
        let table = rest[..paren].trim().to_string();
        let (columns_body, after) = paren_block(rest, paren)?;
        let columns: Vec<String> = split_top_level(columns_body);
        let tail = rest[after..].trim();
        let values = tail
            .strip_prefix("values")
            .ok_or_else(|| statement_error(statement, "missing values clause"))?
            .trim();
        let (values_body, after_values) = paren_block(values, 0)?;
        let markers = split_top_level(values_body);
        if markers.len() != columns.len() || markers.iter().any(|m| m != "?") {
            return Err(statement_error(statement, "bind markers do not match columns"));
        }
        let has_ttl = values[after_values..].trim() == "using ttl ?";
        if !has_ttl && !values[after_values..].trim().is_empty() {
            return Err(statement_error(statement, "unsupported insert suffix"));
        }
        Ok(Plan::Insert {
            table,
            columns,
            has_ttl,
        })
    } else if let Some(rest) = statement.strip_prefix("select ") {
        let from = rest
            .find(" from ")
            .ok_or_else(|| statement_error(statement, "missing from clause"))?;
        let columns = split_top_level(&rest[..from]);
        let rest = &rest[from + " from ".len()..];
        let (table, clause) = match rest.find(" where ") {
            Some(idx) => (rest[..idx].trim(), &rest[idx + " where ".len()..]),
            None => return Err(statement_error(statement, "missing where clause")),
        };
        let (clause, limit) = match clause.rfind(" limit ") {
            Some(idx) => {
                let n = clause[idx + " limit ".len()..]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| statement_error(statement, "bad limit"))?;
                (&clause[..idx], Some(n))
            }
            None => (clause, None),
        };
        Ok(Plan::Select {
            table: table.to_string(),
            columns,
            conditions: parse_conditions(clause, statement)?,
            limit,
        })
    } else if let Some(rest) = statement.strip_prefix("delete from ") {
        let where_idx = rest
            .find(" where ")
            .ok_or_else(|| statement_error(statement, "missing where clause"))?;
        let table = rest[..where_idx].trim().to_string();
        let conditions = parse_conditions(&rest[where_idx + " where ".len()..], statement)?;
        if conditions.iter().any(|c| c.op != CmpOp::Eq) {
            return Err(statement_error(statement, "delete supports equality only"));
        }
        Ok(Plan::Delete { table, conditions })
    } else {
        Err(statement_error(statement, "unsupported statement"))
    }
}
