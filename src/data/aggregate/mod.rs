//! Aggregate store: level-0 ingest, multi-level rollup, and range reads
//!
//! One store instance owns the prepared-statement registry and the full-text
//! side table. The writer fans level-0 rows out to every aggregate table and
//! enqueues work-queue entries; the rollup engine drains those queues into
//! coarser buckets and up the agent-rollup tree; the reader feeds range scans
//! into the merge collectors.

mod reader;
mod rollup;
mod writer;

#[cfg(test)]
mod tests;

pub use reader::{OverallQuery, OverviewAggregate, PercentileAggregate, ThroughputAggregate, TransactionQuery};

use std::sync::Arc;

use crate::core::config::CentralConfig;
use crate::utils::time::Clock;

use super::error::StoreError;
use super::full_query_text::FullQueryTextDao;
use super::statements::StatementCache;
use super::store::{BoundStatement, Session, Value};

pub struct AggregateStore {
    session: Arc<dyn Session>,
    statements: StatementCache,
    full_query_text: FullQueryTextDao,
    config: CentralConfig,
    clock: Arc<dyn Clock>,
}

impl AggregateStore {
    /// Create tables, prepare statements, and wire up the side table.
    /// The config is validated once here and immutable afterwards.
    pub async fn build(
        session: Arc<dyn Session>,
        config: CentralConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        config
            .validate()
            .map_err(|e| StoreError::Invariant(e.to_string()))?;
        let statements = StatementCache::build(session.as_ref(), &config).await?;
        let full_query_text = FullQueryTextDao::build(session.clone(), &config).await?;
        Ok(Self {
            session,
            statements,
            full_query_text,
            config,
            clock,
        })
    }

    pub fn config(&self) -> &CentralConfig {
        &self.config
    }

    /// The agent-rollup chain of an agent id, leaf first: each `::`-separated
    /// prefix of the id is an ancestor group.
    ///
    /// `"us-east::web::agent-1"` resolves to itself, `"us-east::web"`, and
    /// `"us-east"`.
    pub fn agent_rollup_ids(agent_id: &str) -> Vec<String> {
        let mut ids = vec![agent_id.to_string()];
        let mut remainder = agent_id;
        while let Some(idx) = remainder.rfind("::") {
            remainder = &remainder[..idx];
            ids.push(remainder.to_string());
        }
        ids
    }

    /// Issue a batch of writes in parallel and wait for every ack
    pub(crate) async fn execute_batch(
        &self,
        batch: Vec<BoundStatement>,
    ) -> Result<(), StoreError> {
        let futures = batch
            .into_iter()
            .map(|bound| self.session.execute(bound));
        futures::future::try_join_all(futures).await?;
        Ok(())
    }

    pub(crate) fn opt_double_value(value: Option<f64>) -> Value {
        match value {
            Some(v) => Value::Double(v),
            None => Value::Null,
        }
    }

    pub(crate) fn opt_bigint_value(value: Option<i64>) -> Value {
        match value {
            Some(v) => Value::BigInt(v),
            None => Value::Null,
        }
    }
}
