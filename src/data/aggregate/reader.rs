//! Range reads for the UI
//!
//! One range read per call, reduction delegated to the caller-supplied
//! collector (the store itself never aggregates). Summary reads use an
//! exclusive lower bound so adjoining ranges merge without double-counting a
//! bucket boundary; the non-summary kinds read inclusively.

use crate::data::codec;
use crate::data::error::StoreError;
use crate::data::schema::{
    AUX_THREAD_PROFILE, ERROR_SUMMARY, HISTOGRAM, MAIN_THREAD_PROFILE, OVERVIEW, QUERY,
    SERVICE_CALL, SUMMARY, THROUGHPUT, Table,
};
use crate::data::store::{Row, Value};
use crate::domain::merge::{
    MutableThreadStats, OverallErrorSummaryCollector, OverallSummaryCollector, ProfileCollector,
    QueryCollector, ServiceCallCollector, TransactionErrorSummaryCollector,
    TransactionSummaryCollector,
};
use crate::domain::wire::{Histogram, ThreadStats, Timer};

use super::AggregateStore;

/// Range query over the overall (per transaction type) variant of a kind;
/// `from` is exclusive for summary kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverallQuery {
    pub transaction_type: String,
    pub from: i64,
    pub to: i64,
    pub rollup_level: usize,
}

/// Range query for the non-summary kinds; `transaction_name = None` reads the
/// overall variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    pub transaction_type: String,
    pub transaction_name: Option<String>,
    pub from: i64,
    pub to: i64,
    pub rollup_level: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverviewAggregate {
    pub capture_time: i64,
    pub total_duration_nanos: f64,
    pub transaction_count: i64,
    pub async_transactions: bool,
    pub main_thread_root_timers: Vec<Timer>,
    pub aux_thread_root_timers: Vec<Timer>,
    pub async_timers: Vec<Timer>,
    pub main_thread_stats: Option<ThreadStats>,
    pub aux_thread_stats: Option<ThreadStats>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PercentileAggregate {
    pub capture_time: i64,
    pub total_duration_nanos: f64,
    pub transaction_count: i64,
    pub duration_nanos_histogram: Histogram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputAggregate {
    pub capture_time: i64,
    pub transaction_count: i64,
}

impl AggregateStore {
    // query.from is exclusive
    pub async fn merge_overall_summary_into(
        &self,
        agent_rollup_id: &str,
        query: &OverallQuery,
        collector: &mut OverallSummaryCollector,
    ) -> Result<(), StoreError> {
        let rows = self.overall_rows(agent_rollup_id, query, &SUMMARY).await?;
        for row in &rows {
            // rows are ordered by capture time, but max() costs nothing
            collector.merge_summary(row.double(1)?, row.bigint(2)?, row.timestamp(0)?);
        }
        Ok(())
    }

    /// Group-by / sort / limit happen in the collector, the store just feeds
    /// it every per-transaction row in range.
    ///
    /// query.from is exclusive
    pub async fn merge_transaction_summaries_into(
        &self,
        agent_rollup_id: &str,
        query: &OverallQuery,
        collector: &mut TransactionSummaryCollector,
    ) -> Result<(), StoreError> {
        let rows = self.transaction_summary_rows(agent_rollup_id, query, &SUMMARY).await?;
        for row in &rows {
            collector.collect(
                row.text(1)?,
                row.double(2)?,
                row.bigint(3)?,
                row.timestamp(0)?,
            );
        }
        Ok(())
    }

    // query.from is exclusive
    pub async fn merge_overall_error_summary_into(
        &self,
        agent_rollup_id: &str,
        query: &OverallQuery,
        collector: &mut OverallErrorSummaryCollector,
    ) -> Result<(), StoreError> {
        let rows = self.overall_rows(agent_rollup_id, query, &ERROR_SUMMARY).await?;
        for row in &rows {
            collector.merge_error_summary(row.bigint(1)?, row.bigint(2)?, row.timestamp(0)?);
        }
        Ok(())
    }

    // query.from is exclusive
    pub async fn merge_transaction_error_summaries_into(
        &self,
        agent_rollup_id: &str,
        query: &OverallQuery,
        collector: &mut TransactionErrorSummaryCollector,
    ) -> Result<(), StoreError> {
        let rows = self
            .transaction_summary_rows(agent_rollup_id, query, &ERROR_SUMMARY)
            .await?;
        for row in &rows {
            collector.collect(
                row.text(1)?,
                row.bigint(2)?,
                row.bigint(3)?,
                row.timestamp(0)?,
            );
        }
        Ok(())
    }

    // query.from is inclusive
    pub async fn read_overview_aggregates(
        &self,
        agent_rollup_id: &str,
        query: &TransactionQuery,
    ) -> Result<Vec<OverviewAggregate>, StoreError> {
        let rows = self.query_rows(agent_rollup_id, query, &OVERVIEW).await?;
        let mut aggregates = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::overview_aggregate_from_row(row) {
                Ok(aggregate) => aggregates.push(aggregate),
                Err(StoreError::Decode(msg)) => {
                    // one corrupt row must not wedge the whole read
                    tracing::warn!(agent_rollup_id, error = %msg, "Skipping undecodable overview row");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(aggregates)
    }

    fn overview_aggregate_from_row(row: &Row) -> Result<OverviewAggregate, StoreError> {
        let main_thread_stats = thread_stats_from_columns(row, 7)?;
        let aux_thread_stats = thread_stats_from_columns(row, 11)?;
        Ok(OverviewAggregate {
            capture_time: row.timestamp(0)?,
            total_duration_nanos: row.double(1)?,
            transaction_count: row.bigint(2)?,
            async_transactions: row.boolean(3)?,
            main_thread_root_timers: codec::decode_messages(row.opt_blob(4)?)?,
            aux_thread_root_timers: codec::decode_messages(row.opt_blob(5)?)?,
            async_timers: codec::decode_messages(row.opt_blob(6)?)?,
            main_thread_stats,
            aux_thread_stats,
        })
    }

    // query.from is inclusive
    pub async fn read_percentile_aggregates(
        &self,
        agent_rollup_id: &str,
        query: &TransactionQuery,
    ) -> Result<Vec<PercentileAggregate>, StoreError> {
        let rows = self.query_rows(agent_rollup_id, query, &HISTOGRAM).await?;
        let mut aggregates = Vec::with_capacity(rows.len());
        for row in &rows {
            let histogram = match codec::decode_message(row.blob(3)?) {
                Ok(histogram) => histogram,
                Err(e) => {
                    tracing::warn!(agent_rollup_id, error = %e, "Skipping undecodable histogram row");
                    continue;
                }
            };
            aggregates.push(PercentileAggregate {
                capture_time: row.timestamp(0)?,
                total_duration_nanos: row.double(1)?,
                transaction_count: row.bigint(2)?,
                duration_nanos_histogram: histogram,
            });
        }
        Ok(aggregates)
    }

    // query.from is inclusive
    pub async fn read_throughput_aggregates(
        &self,
        agent_rollup_id: &str,
        query: &TransactionQuery,
    ) -> Result<Vec<ThroughputAggregate>, StoreError> {
        let rows = self.query_rows(agent_rollup_id, query, &THROUGHPUT).await?;
        let mut aggregates = Vec::with_capacity(rows.len());
        for row in &rows {
            aggregates.push(ThroughputAggregate {
                capture_time: row.timestamp(0)?,
                transaction_count: row.bigint(1)?,
            });
        }
        Ok(aggregates)
    }

    /// Resolve a full query text referenced by a query row
    pub async fn read_full_query_text(
        &self,
        full_query_text_sha1: &str,
    ) -> Result<Option<String>, StoreError> {
        self.full_query_text.full_text(full_query_text_sha1).await
    }

    // query.from is exclusive
    pub async fn merge_queries_into(
        &self,
        agent_rollup_id: &str,
        query: &TransactionQuery,
        collector: &mut QueryCollector,
    ) -> Result<(), StoreError> {
        let rows = self.query_rows(agent_rollup_id, query, &QUERY).await?;
        for row in &rows {
            let capture_time = row.timestamp(0)?;
            // full_query_text_sha1 cannot be null, it is part of the
            // clustering key; empty means "text is stored inline"
            let sha1 = row.text(3)?;
            let total_rows = row.opt_bigint(6)?;
            collector.merge_query(
                row.text(1)?,
                row.text(2)?,
                (!sha1.is_empty()).then_some(sha1),
                row.double(4)?,
                row.bigint(5)?,
                total_rows.is_some(),
                total_rows.unwrap_or(0),
            );
            collector.update_last_capture_time(capture_time);
        }
        Ok(())
    }

    // query.from is exclusive
    pub async fn merge_service_calls_into(
        &self,
        agent_rollup_id: &str,
        query: &TransactionQuery,
        collector: &mut ServiceCallCollector,
    ) -> Result<(), StoreError> {
        let rows = self.query_rows(agent_rollup_id, query, &SERVICE_CALL).await?;
        for row in &rows {
            let capture_time = row.timestamp(0)?;
            collector.merge_service_call(row.text(1)?, row.text(2)?, row.double(3)?, row.bigint(4)?);
            collector.update_last_capture_time(capture_time);
        }
        Ok(())
    }

    // query.from is exclusive
    pub async fn merge_main_thread_profiles_into(
        &self,
        agent_rollup_id: &str,
        query: &TransactionQuery,
        collector: &mut ProfileCollector,
    ) -> Result<(), StoreError> {
        self.merge_profiles_into(agent_rollup_id, query, &MAIN_THREAD_PROFILE, collector)
            .await
    }

    // query.from is exclusive
    pub async fn merge_aux_thread_profiles_into(
        &self,
        agent_rollup_id: &str,
        query: &TransactionQuery,
        collector: &mut ProfileCollector,
    ) -> Result<(), StoreError> {
        self.merge_profiles_into(agent_rollup_id, query, &AUX_THREAD_PROFILE, collector)
            .await
    }

    async fn merge_profiles_into(
        &self,
        agent_rollup_id: &str,
        query: &TransactionQuery,
        table: &'static Table,
        collector: &mut ProfileCollector,
    ) -> Result<(), StoreError> {
        let rows = self.query_rows(agent_rollup_id, query, table).await?;
        for row in &rows {
            let capture_time = row.timestamp(0)?;
            match codec::decode_message(row.blob(1)?) {
                Ok(profile) => {
                    collector.merge_profile(&profile);
                    collector.update_last_capture_time(capture_time);
                }
                Err(e) => {
                    tracing::warn!(agent_rollup_id, error = %e, "Skipping undecodable profile row");
                }
            }
        }
        Ok(())
    }

    // query.from is exclusive
    pub async fn has_main_thread_profile(
        &self,
        agent_rollup_id: &str,
        query: &TransactionQuery,
    ) -> Result<bool, StoreError> {
        let statement = self
            .statements
            .exists_main_thread_profile(query.transaction_name.is_some(), query.rollup_level);
        let rows = self
            .session
            .execute(statement.bind(Self::bind_query(agent_rollup_id, query)))
            .await?;
        Ok(!rows.is_empty())
    }

    // query.from is exclusive
    pub async fn has_aux_thread_profile(
        &self,
        agent_rollup_id: &str,
        query: &TransactionQuery,
    ) -> Result<bool, StoreError> {
        let statement = self
            .statements
            .exists_aux_thread_profile(query.transaction_name.is_some(), query.rollup_level);
        let rows = self
            .session
            .execute(statement.bind(Self::bind_query(agent_rollup_id, query)))
            .await?;
        Ok(!rows.is_empty())
    }

    // TODO only used for the data-expired message; needs a retention check
    pub fn should_have_queries(&self, _agent_rollup_id: &str, _query: &TransactionQuery) -> bool {
        false
    }

    // TODO only used for the data-expired message; needs a retention check
    pub fn should_have_service_calls(
        &self,
        _agent_rollup_id: &str,
        _query: &TransactionQuery,
    ) -> bool {
        false
    }

    // TODO only used for the data-expired message; needs a retention check
    pub fn should_have_main_thread_profile(
        &self,
        _agent_rollup_id: &str,
        _query: &TransactionQuery,
    ) -> bool {
        false
    }

    // TODO only used for the data-expired message; needs a retention check
    pub fn should_have_aux_thread_profile(
        &self,
        _agent_rollup_id: &str,
        _query: &TransactionQuery,
    ) -> bool {
        false
    }

    async fn overall_rows(
        &self,
        agent_rollup_id: &str,
        query: &OverallQuery,
        table: &'static Table,
    ) -> Result<Vec<Row>, StoreError> {
        self.session
            .execute(
                self.statements
                    .read_overall(table, query.rollup_level)
                    .bind(vec![
                        Value::Text(agent_rollup_id.to_string()),
                        Value::Text(query.transaction_type.clone()),
                        Value::Timestamp(query.from),
                        Value::Timestamp(query.to),
                    ]),
            )
            .await
    }

    async fn transaction_summary_rows(
        &self,
        agent_rollup_id: &str,
        query: &OverallQuery,
        table: &'static Table,
    ) -> Result<Vec<Row>, StoreError> {
        self.session
            .execute(
                self.statements
                    .read_transaction(table, query.rollup_level)
                    .bind(vec![
                        Value::Text(agent_rollup_id.to_string()),
                        Value::Text(query.transaction_type.clone()),
                        Value::Timestamp(query.from),
                        Value::Timestamp(query.to),
                    ]),
            )
            .await
    }

    async fn query_rows(
        &self,
        agent_rollup_id: &str,
        query: &TransactionQuery,
        table: &'static Table,
    ) -> Result<Vec<Row>, StoreError> {
        let statement = if query.transaction_name.is_none() {
            self.statements.read_overall(table, query.rollup_level)
        } else {
            self.statements.read_transaction(table, query.rollup_level)
        };
        self.session
            .execute(statement.bind(Self::bind_query(agent_rollup_id, query)))
            .await
    }
}

fn thread_stats_from_columns(row: &Row, start: usize) -> Result<Option<ThreadStats>, StoreError> {
    let mut stats = MutableThreadStats::default();
    stats.add_total_cpu_nanos(row.opt_double(start)?);
    stats.add_total_blocked_nanos(row.opt_double(start + 1)?);
    stats.add_total_waited_nanos(row.opt_double(start + 2)?);
    stats.add_total_allocated_bytes(row.opt_double(start + 3)?);
    Ok(stats.to_proto())
}
