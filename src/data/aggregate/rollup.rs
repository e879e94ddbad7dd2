//! Rollup engine
//!
//! Drains the needs-rollup work queues for one agent rollup. Two phases run
//! in order: the from-children phase folds child level-0 rows into this
//! node's level 0 (non-leaf nodes only), then the level-ascending phase folds
//! each level N-1 into level N bucket by bucket.
//!
//! The ordering discipline inside a bucket is what makes partial failure
//! safe: reduction writes are acknowledged before the next level is enqueued,
//! and the next level is enqueued before the consumed queue rows are deleted.
//! Dying between any two steps re-runs an idempotent rollup, never loses one.

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use crate::core::shutdown::ShutdownSignal;
use crate::data::codec;
use crate::data::error::StoreError;
use crate::data::expiry::{adjusted_ttl, needs_rollup_adjusted_ttl};
use crate::data::schema::{
    AUX_THREAD_PROFILE, ERROR_SUMMARY, HISTOGRAM, MAIN_THREAD_PROFILE, OVERVIEW, QUERY,
    SERVICE_CALL, SUMMARY, THROUGHPUT, Table,
};
use crate::data::store::{BoundStatement, PreparedStatement, Row, Value};
use crate::domain::merge::{
    LazyHistogram, MutableErrorSummary, MutableProfile, MutableSummary, MutableThreadStats,
    QueryCollector, ServiceCallCollector, timer,
};
use crate::domain::wire;
use crate::utils::time::rollup_capture_time;

use super::{AggregateStore, TransactionQuery};

/// Per-bucket rollup parameters
struct RollupParams<'a> {
    agent_rollup_id: &'a str,
    rollup_level: usize,
    data_ttl: i32,
    max_query_aggregates_per_type: usize,
    max_service_call_aggregates_per_type: usize,
}

/// Writes produced by reducing one bucket, flushed as one barrier
#[derive(Default)]
struct RollupWrites {
    statements: Vec<BoundStatement>,
    /// sha1s whose side-table TTL must be refreshed (from-children phase)
    refresh_sha1s: Vec<String>,
}

impl RollupWrites {
    fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    fn extend(&mut self, other: RollupWrites) {
        self.statements.extend(other.statements);
        self.refresh_sha1s.extend(other.refresh_sha1s);
    }
}

/// One work-queue bucket: every queue row for a capture time, folded together
struct NeedsRollup {
    capture_time: i64,
    transaction_types: BTreeSet<String>,
    uniqueness: Vec<Uuid>,
}

/// One from-child bucket: transaction types mapped to the children that
/// reported them
struct NeedsRollupFromChildren {
    capture_time: i64,
    keys: BTreeMap<String, BTreeSet<String>>,
    uniqueness: Vec<Uuid>,
}

impl AggregateStore {
    /// Run both rollup phases for one agent rollup.
    ///
    /// Cancellation is cooperative: the shutdown signal is checked between
    /// buckets, and an interrupted pass leaves its unconsumed queue entries
    /// intact for the next pass.
    pub async fn rollup(
        &self,
        agent_rollup_id: &str,
        parent_agent_rollup_id: Option<&str>,
        leaf: bool,
        shutdown: &ShutdownSignal,
    ) -> Result<(), StoreError> {
        let ttls = self.config.ttls_seconds();
        if !leaf {
            self.rollup_from_children(agent_rollup_id, parent_agent_rollup_id, ttls[0], shutdown)
                .await?;
        }
        for level in 1..self.config.level_count() {
            self.rollup_level(agent_rollup_id, level, ttls[level], shutdown)
                .await?;
        }
        Ok(())
    }

    // =========================================================================
    // Phase 1: from children
    // =========================================================================

    async fn rollup_from_children(
        &self,
        agent_rollup_id: &str,
        parent_agent_rollup_id: Option<&str>,
        ttl_seconds: i64,
        shutdown: &ShutdownSignal,
    ) -> Result<(), StoreError> {
        let needs_rollup_list = self.needs_rollup_from_children_list(agent_rollup_id).await?;
        let next_rollup_interval = self.config.interval_millis(1);
        for needs_rollup in needs_rollup_list {
            if shutdown.is_triggered() {
                tracing::debug!(agent_rollup_id, "Rollup from children interrupted by shutdown");
                return Ok(());
            }
            let capture_time = needs_rollup.capture_time;
            let data_ttl = adjusted_ttl(ttl_seconds, capture_time, self.clock.as_ref());
            let queue_ttl =
                needs_rollup_adjusted_ttl(data_ttl, self.config.max_rollup_interval_millis());
            let params = self.rollup_params(agent_rollup_id, 0, data_ttl);
            let mut writes = RollupWrites::default();
            for (transaction_type, child_agent_rollups) in &needs_rollup.keys {
                writes.extend(
                    self.rollup_one_from_children(
                        &params,
                        transaction_type,
                        child_agent_rollups,
                        capture_time,
                    )
                    .await?,
                );
            }
            // rollup writes must ack before anything references them
            self.flush_writes(writes).await?;

            let transaction_types: BTreeSet<String> =
                needs_rollup.keys.keys().cloned().collect();
            if let Some(parent) = parent_agent_rollup_id {
                // the parent's queue entry has to exist before this node's
                // entries are deleted, same reasoning as post_rollup
                self.session
                    .execute(self.statements.insert_needs_rollup_from_child().bind(vec![
                        Value::Text(parent.to_string()),
                        Value::Timestamp(capture_time),
                        Value::Uuid(Uuid::now_v7()),
                        Value::Text(agent_rollup_id.to_string()),
                        Value::text_set(transaction_types.iter().cloned()),
                        Value::Int(queue_ttl),
                    ]))
                    .await?;
            }
            self.post_rollup(
                agent_rollup_id,
                capture_time,
                &transaction_types,
                &needs_rollup.uniqueness,
                Some(next_rollup_interval),
                Some(self.statements.insert_needs_rollup(1)),
                self.statements.delete_needs_rollup_from_child(),
                queue_ttl,
            )
            .await?;
        }
        Ok(())
    }

    async fn rollup_one_from_children(
        &self,
        params: &RollupParams<'_>,
        transaction_type: &str,
        child_agent_rollups: &BTreeSet<String>,
        capture_time: i64,
    ) -> Result<RollupWrites, StoreError> {
        // rolling up from the same level (always 0), a single bucket wide
        let query = TransactionQuery {
            transaction_type: transaction_type.to_string(),
            transaction_name: None,
            from: capture_time,
            to: capture_time,
            rollup_level: params.rollup_level,
        };
        let mut writes = RollupWrites::default();

        let rows = self
            .rows_from_children(&query, child_agent_rollups, &SUMMARY, false)
            .await?;
        if rows.is_empty() {
            // unexpected since the queue TTL is shorter than the data TTL
            tracing::warn!(
                agent_rollup_id = params.agent_rollup_id,
                transaction_type,
                capture_time,
                "No summary rows found for rollup from children"
            );
        } else {
            writes.extend(self.rollup_overall_summary_from_rows(params, &query, &rows)?);
        }

        let rows = self
            .rows_from_children(&query, child_agent_rollups, &ERROR_SUMMARY, false)
            .await?;
        if !rows.is_empty() {
            writes.extend(self.rollup_error_summary_from_rows(params, &query, &rows)?);
        }

        let mut transaction_names = Vec::new();
        let rows = self
            .rows_from_children(&query, child_agent_rollups, &SUMMARY, true)
            .await?;
        if rows.is_empty() {
            tracing::warn!(
                agent_rollup_id = params.agent_rollup_id,
                transaction_type,
                capture_time,
                "No per-transaction summary rows found for rollup from children"
            );
        } else {
            writes.extend(self.rollup_transaction_summary_from_rows(
                params,
                &query,
                &rows,
                &mut transaction_names,
            )?);
        }

        let rows = self
            .rows_from_children(&query, child_agent_rollups, &ERROR_SUMMARY, true)
            .await?;
        if !rows.is_empty() {
            writes.extend(self.rollup_transaction_error_summary_from_rows(params, &query, &rows)?);
        }

        writes.extend(
            self.rollup_other_parts_from_children(params, &query, child_agent_rollups)
                .await?,
        );
        for transaction_name in transaction_names {
            let query = TransactionQuery {
                transaction_name: Some(transaction_name),
                ..query.clone()
            };
            writes.extend(
                self.rollup_other_parts_from_children(params, &query, child_agent_rollups)
                    .await?,
            );
        }
        Ok(writes)
    }

    async fn rollup_other_parts_from_children(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
        child_agent_rollups: &BTreeSet<String>,
    ) -> Result<RollupWrites, StoreError> {
        let mut writes = RollupWrites::default();
        let per_name = query.transaction_name.is_some();

        let rows = self
            .rows_from_children(query, child_agent_rollups, &OVERVIEW, per_name)
            .await?;
        if rows.is_empty() {
            self.warn_missing_rows(params, query, &OVERVIEW);
        } else {
            writes.extend(self.rollup_overview_from_rows(params, query, &rows)?);
        }

        let rows = self
            .rows_from_children(query, child_agent_rollups, &HISTOGRAM, per_name)
            .await?;
        if rows.is_empty() {
            self.warn_missing_rows(params, query, &HISTOGRAM);
        } else {
            writes.extend(self.rollup_histogram_from_rows(params, query, &rows)?);
        }

        let rows = self
            .rows_from_children(query, child_agent_rollups, &THROUGHPUT, per_name)
            .await?;
        if rows.is_empty() {
            self.warn_missing_rows(params, query, &THROUGHPUT);
        } else {
            writes.extend(self.rollup_throughput_from_rows(params, query, &rows)?);
        }

        let rows = self
            .rows_from_children(query, child_agent_rollups, &QUERY, per_name)
            .await?;
        if !rows.is_empty() {
            writes.extend(self.rollup_queries_from_rows(params, query, &rows, true)?);
        }

        let rows = self
            .rows_from_children(query, child_agent_rollups, &SERVICE_CALL, per_name)
            .await?;
        if !rows.is_empty() {
            writes.extend(self.rollup_service_calls_from_rows(params, query, &rows)?);
        }

        for table in [&MAIN_THREAD_PROFILE, &AUX_THREAD_PROFILE] {
            let rows = self
                .rows_from_children(query, child_agent_rollups, table, per_name)
                .await?;
            if !rows.is_empty() {
                writes.extend(self.rollup_thread_profile_from_rows(params, query, &rows, table)?);
            }
        }
        Ok(writes)
    }

    // =========================================================================
    // Phase 2: level ascending
    // =========================================================================

    async fn rollup_level(
        &self,
        agent_rollup_id: &str,
        rollup_level: usize,
        ttl_seconds: i64,
        shutdown: &ShutdownSignal,
    ) -> Result<(), StoreError> {
        let rollup_interval = self.config.interval_millis(rollup_level);
        let needs_rollup_list = self
            .needs_rollup_list(agent_rollup_id, rollup_level, rollup_interval)
            .await?;
        let next_rollup_interval = (rollup_level + 1 < self.config.level_count())
            .then(|| self.config.interval_millis(rollup_level + 1));
        for needs_rollup in needs_rollup_list {
            if shutdown.is_triggered() {
                tracing::debug!(agent_rollup_id, rollup_level, "Rollup interrupted by shutdown");
                return Ok(());
            }
            let capture_time = needs_rollup.capture_time;
            let data_ttl = adjusted_ttl(ttl_seconds, capture_time, self.clock.as_ref());
            let queue_ttl =
                needs_rollup_adjusted_ttl(data_ttl, self.config.max_rollup_interval_millis());
            let params = self.rollup_params(agent_rollup_id, rollup_level, data_ttl);
            let from = capture_time - rollup_interval;
            let mut writes = RollupWrites::default();
            for transaction_type in &needs_rollup.transaction_types {
                writes.extend(
                    self.rollup_one(&params, transaction_type, from, capture_time)
                        .await?,
                );
            }
            if writes.is_empty() {
                // the queue entry outlived its source rows (e.g. retention was
                // shortened); consume it without producing the next level
                self.post_rollup(
                    agent_rollup_id,
                    capture_time,
                    &needs_rollup.transaction_types,
                    &needs_rollup.uniqueness,
                    None,
                    None,
                    self.statements.delete_needs_rollup(rollup_level),
                    queue_ttl,
                )
                .await?;
                continue;
            }
            self.flush_writes(writes).await?;
            self.post_rollup(
                agent_rollup_id,
                capture_time,
                &needs_rollup.transaction_types,
                &needs_rollup.uniqueness,
                next_rollup_interval,
                next_rollup_interval
                    .map(|_| self.statements.insert_needs_rollup(rollup_level + 1)),
                self.statements.delete_needs_rollup(rollup_level),
                queue_ttl,
            )
            .await?;
        }
        Ok(())
    }

    async fn rollup_one(
        &self,
        params: &RollupParams<'_>,
        transaction_type: &str,
        from: i64,
        to: i64,
    ) -> Result<RollupWrites, StoreError> {
        let query = TransactionQuery {
            transaction_type: transaction_type.to_string(),
            transaction_name: None,
            from,
            to,
            rollup_level: params.rollup_level - 1,
        };
        let mut writes = RollupWrites::default();

        let rows = self.rows_for_rollup(params.agent_rollup_id, &query, &SUMMARY).await?;
        if rows.is_empty() {
            self.warn_missing_rows(params, &query, &SUMMARY);
        } else {
            writes.extend(self.rollup_overall_summary_from_rows(params, &query, &rows)?);
        }

        let rows = self
            .rows_for_rollup(params.agent_rollup_id, &query, &ERROR_SUMMARY)
            .await?;
        if !rows.is_empty() {
            writes.extend(self.rollup_error_summary_from_rows(params, &query, &rows)?);
        }

        let mut transaction_names = Vec::new();
        let rows = self
            .session
            .execute(
                self.statements
                    .read_transaction_for_rollup(&SUMMARY, query.rollup_level)
                    .bind(Self::bind_query(params.agent_rollup_id, &query)),
            )
            .await?;
        if rows.is_empty() {
            self.warn_missing_rows(params, &query, &SUMMARY);
        } else {
            writes.extend(self.rollup_transaction_summary_from_rows(
                params,
                &query,
                &rows,
                &mut transaction_names,
            )?);
        }

        let rows = self
            .session
            .execute(
                self.statements
                    .read_transaction_for_rollup(&ERROR_SUMMARY, query.rollup_level)
                    .bind(Self::bind_query(params.agent_rollup_id, &query)),
            )
            .await?;
        if !rows.is_empty() {
            writes.extend(self.rollup_transaction_error_summary_from_rows(params, &query, &rows)?);
        }

        writes.extend(self.rollup_other_parts(params, &query).await?);
        for transaction_name in transaction_names {
            let query = TransactionQuery {
                transaction_name: Some(transaction_name),
                ..query.clone()
            };
            writes.extend(self.rollup_other_parts(params, &query).await?);
        }
        Ok(writes)
    }

    async fn rollup_other_parts(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
    ) -> Result<RollupWrites, StoreError> {
        let mut writes = RollupWrites::default();

        let rows = self.rows_for_rollup(params.agent_rollup_id, query, &OVERVIEW).await?;
        if rows.is_empty() {
            self.warn_missing_rows(params, query, &OVERVIEW);
        } else {
            writes.extend(self.rollup_overview_from_rows(params, query, &rows)?);
        }

        let rows = self.rows_for_rollup(params.agent_rollup_id, query, &HISTOGRAM).await?;
        if rows.is_empty() {
            self.warn_missing_rows(params, query, &HISTOGRAM);
        } else {
            writes.extend(self.rollup_histogram_from_rows(params, query, &rows)?);
        }

        let rows = self
            .rows_for_rollup(params.agent_rollup_id, query, &THROUGHPUT)
            .await?;
        if rows.is_empty() {
            self.warn_missing_rows(params, query, &THROUGHPUT);
        } else {
            writes.extend(self.rollup_throughput_from_rows(params, query, &rows)?);
        }

        let rows = self.rows_for_rollup(params.agent_rollup_id, query, &QUERY).await?;
        if !rows.is_empty() {
            writes.extend(self.rollup_queries_from_rows(params, query, &rows, false)?);
        }

        let rows = self
            .rows_for_rollup(params.agent_rollup_id, query, &SERVICE_CALL)
            .await?;
        if !rows.is_empty() {
            writes.extend(self.rollup_service_calls_from_rows(params, query, &rows)?);
        }

        for table in [&MAIN_THREAD_PROFILE, &AUX_THREAD_PROFILE] {
            let rows = self.rows_for_rollup(params.agent_rollup_id, query, table).await?;
            if !rows.is_empty() {
                writes.extend(self.rollup_thread_profile_from_rows(params, query, &rows, table)?);
            }
        }
        Ok(writes)
    }

    // =========================================================================
    // Per-kind reductions
    // =========================================================================

    fn rollup_overall_summary_from_rows(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
        rows: &[Row],
    ) -> Result<RollupWrites, StoreError> {
        let mut summary = MutableSummary::default();
        for row in rows {
            summary.total_duration_nanos += row.double(0)?;
            summary.transaction_count += row.bigint(1)?;
        }
        let mut writes = RollupWrites::default();
        writes.statements.push(
            self.statements
                .insert_overall(&SUMMARY, params.rollup_level)
                .bind(vec![
                    Value::Text(params.agent_rollup_id.to_string()),
                    Value::Text(query.transaction_type.clone()),
                    Value::Timestamp(query.to),
                    Value::Double(summary.total_duration_nanos),
                    Value::BigInt(summary.transaction_count),
                    Value::Int(params.data_ttl),
                ]),
        );
        Ok(writes)
    }

    fn rollup_error_summary_from_rows(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
        rows: &[Row],
    ) -> Result<RollupWrites, StoreError> {
        let mut summary = MutableErrorSummary::default();
        for row in rows {
            summary.error_count += row.bigint(0)?;
            summary.transaction_count += row.bigint(1)?;
        }
        let mut writes = RollupWrites::default();
        writes.statements.push(
            self.statements
                .insert_overall(&ERROR_SUMMARY, params.rollup_level)
                .bind(vec![
                    Value::Text(params.agent_rollup_id.to_string()),
                    Value::Text(query.transaction_type.clone()),
                    Value::Timestamp(query.to),
                    Value::BigInt(summary.error_count),
                    Value::BigInt(summary.transaction_count),
                    Value::Int(params.data_ttl),
                ]),
        );
        Ok(writes)
    }

    /// Also populates `transaction_names`, the name universe for the
    /// per-transaction rollups of the non-summary tables
    fn rollup_transaction_summary_from_rows(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
        rows: &[Row],
        transaction_names: &mut Vec<String>,
    ) -> Result<RollupWrites, StoreError> {
        let mut summaries: BTreeMap<String, MutableSummary> = BTreeMap::new();
        for row in rows {
            let summary = summaries.entry(row.text(0)?.to_string()).or_default();
            summary.total_duration_nanos += row.double(1)?;
            summary.transaction_count += row.bigint(2)?;
        }
        let mut writes = RollupWrites::default();
        let statement = self.statements.insert_transaction(&SUMMARY, params.rollup_level);
        for (transaction_name, summary) in &summaries {
            writes.statements.push(statement.bind(vec![
                Value::Text(params.agent_rollup_id.to_string()),
                Value::Text(query.transaction_type.clone()),
                Value::Timestamp(query.to),
                Value::Text(transaction_name.clone()),
                Value::Double(summary.total_duration_nanos),
                Value::BigInt(summary.transaction_count),
                Value::Int(params.data_ttl),
            ]));
        }
        transaction_names.extend(summaries.into_keys());
        Ok(writes)
    }

    fn rollup_transaction_error_summary_from_rows(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
        rows: &[Row],
    ) -> Result<RollupWrites, StoreError> {
        let mut summaries: BTreeMap<String, MutableErrorSummary> = BTreeMap::new();
        for row in rows {
            let summary = summaries.entry(row.text(0)?.to_string()).or_default();
            summary.error_count += row.bigint(1)?;
            summary.transaction_count += row.bigint(2)?;
        }
        let mut writes = RollupWrites::default();
        let statement = self
            .statements
            .insert_transaction(&ERROR_SUMMARY, params.rollup_level);
        for (transaction_name, summary) in &summaries {
            writes.statements.push(statement.bind(vec![
                Value::Text(params.agent_rollup_id.to_string()),
                Value::Text(query.transaction_type.clone()),
                Value::Timestamp(query.to),
                Value::Text(transaction_name.clone()),
                Value::BigInt(summary.error_count),
                Value::BigInt(summary.transaction_count),
                Value::Int(params.data_ttl),
            ]));
        }
        Ok(writes)
    }

    fn rollup_overview_from_rows(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
        rows: &[Row],
    ) -> Result<RollupWrites, StoreError> {
        let mut total_duration_nanos = 0.0;
        let mut transaction_count = 0i64;
        let mut async_transactions = false;
        let mut main_thread_root_timers = Vec::new();
        let mut aux_thread_root_timers = Vec::new();
        let mut async_timers = Vec::new();
        let mut main_thread_stats = MutableThreadStats::default();
        let mut aux_thread_stats = MutableThreadStats::default();
        for row in rows {
            let timers: [Vec<wire::Timer>; 3] = match (
                codec::decode_messages(row.opt_blob(3)?),
                codec::decode_messages(row.opt_blob(4)?),
                codec::decode_messages(row.opt_blob(5)?),
            ) {
                (Ok(main), Ok(aux), Ok(async_t)) => [main, aux, async_t],
                _ => {
                    self.warn_undecodable_row(params, query, &OVERVIEW);
                    continue;
                }
            };
            total_duration_nanos += row.double(0)?;
            transaction_count += row.bigint(1)?;
            if row.boolean(2)? {
                async_transactions = true;
            }
            let [main, aux, async_t] = timers;
            timer::merge_root_timers(&main, &mut main_thread_root_timers);
            timer::merge_root_timers(&aux, &mut aux_thread_root_timers);
            timer::merge_root_timers(&async_t, &mut async_timers);
            main_thread_stats.add_total_cpu_nanos(row.opt_double(6)?);
            main_thread_stats.add_total_blocked_nanos(row.opt_double(7)?);
            main_thread_stats.add_total_waited_nanos(row.opt_double(8)?);
            main_thread_stats.add_total_allocated_bytes(row.opt_double(9)?);
            aux_thread_stats.add_total_cpu_nanos(row.opt_double(10)?);
            aux_thread_stats.add_total_blocked_nanos(row.opt_double(11)?);
            aux_thread_stats.add_total_waited_nanos(row.opt_double(12)?);
            aux_thread_stats.add_total_allocated_bytes(row.opt_double(13)?);
        }
        let mut values = self.rollup_key(params, query);
        values.push(Value::Double(total_duration_nanos));
        values.push(Value::BigInt(transaction_count));
        values.push(Value::Boolean(async_transactions));
        values.push(Value::Blob(codec::encode_messages(&timer::to_proto(
            &main_thread_root_timers,
        ))));
        values.push(Value::Blob(codec::encode_messages(&timer::to_proto(
            &aux_thread_root_timers,
        ))));
        values.push(Value::Blob(codec::encode_messages(&timer::to_proto(&async_timers))));
        values.push(Self::opt_double_value(main_thread_stats.total_cpu_nanos));
        values.push(Self::opt_double_value(main_thread_stats.total_blocked_nanos));
        values.push(Self::opt_double_value(main_thread_stats.total_waited_nanos));
        values.push(Self::opt_double_value(main_thread_stats.total_allocated_bytes));
        values.push(Self::opt_double_value(aux_thread_stats.total_cpu_nanos));
        values.push(Self::opt_double_value(aux_thread_stats.total_blocked_nanos));
        values.push(Self::opt_double_value(aux_thread_stats.total_waited_nanos));
        values.push(Self::opt_double_value(aux_thread_stats.total_allocated_bytes));
        values.push(Value::Int(params.data_ttl));
        let mut writes = RollupWrites::default();
        writes
            .statements
            .push(self.rollup_insert(params, query, &OVERVIEW).bind(values));
        Ok(writes)
    }

    fn rollup_histogram_from_rows(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
        rows: &[Row],
    ) -> Result<RollupWrites, StoreError> {
        let mut total_duration_nanos = 0.0;
        let mut transaction_count = 0i64;
        let mut histogram = LazyHistogram::new();
        for row in rows {
            let decoded: wire::Histogram = match codec::decode_message(row.blob(2)?) {
                Ok(decoded) => decoded,
                Err(_) => {
                    self.warn_undecodable_row(params, query, &HISTOGRAM);
                    continue;
                }
            };
            if let Err(e) = histogram.merge(&decoded) {
                tracing::warn!(
                    agent_rollup_id = params.agent_rollup_id,
                    error = %e,
                    "Skipping unmergeable histogram row"
                );
                continue;
            }
            total_duration_nanos += row.double(0)?;
            transaction_count += row.bigint(1)?;
        }
        let mut values = self.rollup_key(params, query);
        values.push(Value::Double(total_duration_nanos));
        values.push(Value::BigInt(transaction_count));
        values.push(Value::Blob(codec::encode_message(&histogram.to_proto()?)));
        values.push(Value::Int(params.data_ttl));
        let mut writes = RollupWrites::default();
        writes
            .statements
            .push(self.rollup_insert(params, query, &HISTOGRAM).bind(values));
        Ok(writes)
    }

    fn rollup_throughput_from_rows(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
        rows: &[Row],
    ) -> Result<RollupWrites, StoreError> {
        let mut transaction_count = 0i64;
        for row in rows {
            transaction_count += row.bigint(0)?;
        }
        let mut values = self.rollup_key(params, query);
        values.push(Value::BigInt(transaction_count));
        values.push(Value::Int(params.data_ttl));
        let mut writes = RollupWrites::default();
        writes
            .statements
            .push(self.rollup_insert(params, query, &THROUGHPUT).bind(values));
        Ok(writes)
    }

    fn rollup_queries_from_rows(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
        rows: &[Row],
        rollup_from_children: bool,
    ) -> Result<RollupWrites, StoreError> {
        let mut collector = QueryCollector::new(params.max_query_aggregates_per_type);
        for row in rows {
            let sha1 = row.text(2)?;
            let total_rows = row.opt_bigint(5)?;
            collector.merge_query(
                row.text(0)?,
                row.text(1)?,
                (!sha1.is_empty()).then_some(sha1),
                row.double(3)?,
                row.bigint(4)?,
                total_rows.is_some(),
                total_rows.unwrap_or(0),
            );
        }
        let mut writes = RollupWrites::default();
        let statement = self.rollup_insert(params, query, &QUERY);
        for (query_type, queries) in collector.sorted_and_capped() {
            for merged in queries {
                let mut values = self.rollup_key(params, query);
                values.push(Value::Text(query_type.clone()));
                values.push(Value::Text(merged.truncated_text.clone()));
                // empty string rather than null, it is part of the clustering key
                values.push(Value::Text(merged.full_text_sha1.clone().unwrap_or_default()));
                values.push(Value::Double(merged.total_duration_nanos));
                values.push(Value::BigInt(merged.execution_count));
                values.push(Self::opt_bigint_value(
                    merged.has_total_rows.then_some(merged.total_rows),
                ));
                values.push(Value::Int(params.data_ttl));
                writes.statements.push(statement.bind(values));
                if rollup_from_children {
                    if let Some(sha1) = merged.full_text_sha1 {
                        writes.refresh_sha1s.push(sha1);
                    }
                }
            }
        }
        Ok(writes)
    }

    fn rollup_service_calls_from_rows(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
        rows: &[Row],
    ) -> Result<RollupWrites, StoreError> {
        let mut collector =
            ServiceCallCollector::new(params.max_service_call_aggregates_per_type);
        for row in rows {
            collector.merge_service_call(row.text(0)?, row.text(1)?, row.double(2)?, row.bigint(3)?);
        }
        let mut writes = RollupWrites::default();
        let statement = self.rollup_insert(params, query, &SERVICE_CALL);
        for (service_call_type, service_calls) in collector.sorted_and_capped() {
            for merged in service_calls {
                let mut values = self.rollup_key(params, query);
                values.push(Value::Text(service_call_type.clone()));
                values.push(Value::Text(merged.text.clone()));
                values.push(Value::Double(merged.total_duration_nanos));
                values.push(Value::BigInt(merged.execution_count));
                values.push(Value::Int(params.data_ttl));
                writes.statements.push(statement.bind(values));
            }
        }
        Ok(writes)
    }

    fn rollup_thread_profile_from_rows(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
        rows: &[Row],
        table: &'static Table,
    ) -> Result<RollupWrites, StoreError> {
        let mut profile = MutableProfile::default();
        for row in rows {
            match codec::decode_message::<wire::Profile>(row.blob(0)?) {
                Ok(decoded) => profile.merge(&decoded),
                Err(_) => self.warn_undecodable_row(params, query, table),
            }
        }
        let mut values = self.rollup_key(params, query);
        values.push(Value::Blob(codec::encode_message(&profile.to_proto())));
        values.push(Value::Int(params.data_ttl));
        let mut writes = RollupWrites::default();
        writes
            .statements
            .push(self.rollup_insert(params, query, table).bind(values));
        Ok(writes)
    }

    // =========================================================================
    // Work-queue plumbing
    // =========================================================================

    async fn needs_rollup_list(
        &self,
        agent_rollup_id: &str,
        rollup_level: usize,
        rollup_interval: i64,
    ) -> Result<Vec<NeedsRollup>, StoreError> {
        let rows = self
            .session
            .execute(
                self.statements
                    .read_needs_rollup(rollup_level)
                    .bind(vec![Value::Text(agent_rollup_id.to_string())]),
            )
            .await?;
        let mut buckets: BTreeMap<i64, NeedsRollup> = BTreeMap::new();
        for row in &rows {
            let capture_time = row.timestamp(0)?;
            let bucket = buckets.entry(capture_time).or_insert_with(|| NeedsRollup {
                capture_time,
                transaction_types: BTreeSet::new(),
                uniqueness: Vec::new(),
            });
            bucket.uniqueness.push(row.uuid(1)?);
            bucket
                .transaction_types
                .extend(row.text_set(2)?.iter().cloned());
        }
        let mut list: Vec<NeedsRollup> = buckets.into_values().collect();
        if let Some(last) = list.last() {
            // the most recent bucket is usually still being added to; skip it
            // unless it is already a full interval old, in which case it must
            // roll up now or risk expiring un-rolled-up
            if last.capture_time > self.clock.current_time_millis() - rollup_interval {
                list.pop();
            }
        }
        Ok(list)
    }

    async fn needs_rollup_from_children_list(
        &self,
        agent_rollup_id: &str,
    ) -> Result<Vec<NeedsRollupFromChildren>, StoreError> {
        let rows = self
            .session
            .execute(
                self.statements
                    .read_needs_rollup_from_child()
                    .bind(vec![Value::Text(agent_rollup_id.to_string())]),
            )
            .await?;
        let mut buckets: BTreeMap<i64, NeedsRollupFromChildren> = BTreeMap::new();
        for row in &rows {
            let capture_time = row.timestamp(0)?;
            let uniqueness = row.uuid(1)?;
            let child_agent_rollup = row.text(2)?.to_string();
            let bucket = buckets
                .entry(capture_time)
                .or_insert_with(|| NeedsRollupFromChildren {
                    capture_time,
                    keys: BTreeMap::new(),
                    uniqueness: Vec::new(),
                });
            for transaction_type in row.text_set(3)? {
                bucket
                    .keys
                    .entry(transaction_type.clone())
                    .or_default()
                    .insert(child_agent_rollup.clone());
            }
            bucket.uniqueness.push(uniqueness);
        }
        Ok(buckets.into_values().collect())
    }

    /// Enqueue the next level (if any), then delete the consumed queue rows.
    ///
    /// The insert has to come first: enqueue-after-delete could lose the next
    /// level forever on a crash in between, while this order merely re-runs
    /// an idempotent rollup.
    #[allow(clippy::too_many_arguments)]
    async fn post_rollup(
        &self,
        agent_rollup_id: &str,
        capture_time: i64,
        keys: &BTreeSet<String>,
        uniqueness: &[Uuid],
        next_rollup_interval: Option<i64>,
        insert_needs_rollup: Option<&PreparedStatement>,
        delete_needs_rollup: &PreparedStatement,
        queue_ttl: i32,
    ) -> Result<(), StoreError> {
        if let (Some(next_rollup_interval), Some(insert_needs_rollup)) =
            (next_rollup_interval, insert_needs_rollup)
        {
            let next_capture_time = rollup_capture_time(capture_time, next_rollup_interval);
            // intentionally not part of the delete batch below
            self.session
                .execute(insert_needs_rollup.bind(vec![
                    Value::Text(agent_rollup_id.to_string()),
                    Value::Timestamp(next_capture_time),
                    Value::Uuid(Uuid::now_v7()),
                    Value::text_set(keys.iter().cloned()),
                    Value::Int(queue_ttl),
                ]))
                .await?;
        }
        let deletes: Vec<BoundStatement> = uniqueness
            .iter()
            .map(|&uniqueness| {
                delete_needs_rollup.bind(vec![
                    Value::Text(agent_rollup_id.to_string()),
                    Value::Timestamp(capture_time),
                    Value::Uuid(uniqueness),
                ])
            })
            .collect();
        self.execute_batch(deletes).await
    }

    // =========================================================================
    // Shared helpers
    // =========================================================================

    fn rollup_params<'a>(
        &self,
        agent_rollup_id: &'a str,
        rollup_level: usize,
        data_ttl: i32,
    ) -> RollupParams<'a> {
        let advanced = self.config.advanced_for(agent_rollup_id);
        RollupParams {
            agent_rollup_id,
            rollup_level,
            data_ttl,
            max_query_aggregates_per_type: advanced.max_query_aggregates_per_type,
            max_service_call_aggregates_per_type: advanced.max_service_call_aggregates_per_type,
        }
    }

    async fn flush_writes(&self, writes: RollupWrites) -> Result<(), StoreError> {
        let RollupWrites {
            statements,
            refresh_sha1s,
        } = writes;
        // side-table refreshes before the rows that reference them
        for sha1 in refresh_sha1s {
            self.full_query_text.update_ttl(&sha1).await?;
        }
        self.execute_batch(statements).await
    }

    pub(crate) fn bind_query(agent_rollup_id: &str, query: &TransactionQuery) -> Vec<Value> {
        let mut values = vec![
            Value::Text(agent_rollup_id.to_string()),
            Value::Text(query.transaction_type.clone()),
        ];
        if let Some(transaction_name) = &query.transaction_name {
            values.push(Value::Text(transaction_name.clone()));
        }
        values.push(Value::Timestamp(query.from));
        values.push(Value::Timestamp(query.to));
        values
    }

    async fn rows_for_rollup(
        &self,
        agent_rollup_id: &str,
        query: &TransactionQuery,
        table: &'static Table,
    ) -> Result<Vec<Row>, StoreError> {
        let statement = if query.transaction_name.is_none() {
            self.statements.read_overall_for_rollup(table, query.rollup_level)
        } else {
            self.statements
                .read_transaction_for_rollup(table, query.rollup_level)
        };
        self.session
            .execute(statement.bind(Self::bind_query(agent_rollup_id, query)))
            .await
    }

    /// Single-bucket reads across child agent rollups; `transaction` selects
    /// the per-transaction variant (used for the summary name universe)
    async fn rows_from_children(
        &self,
        query: &TransactionQuery,
        child_agent_rollups: &BTreeSet<String>,
        table: &'static Table,
        transaction: bool,
    ) -> Result<Vec<Row>, StoreError> {
        let statement = if transaction || query.transaction_name.is_some() {
            self.statements.read_transaction_for_rollup_from_child(table)
        } else {
            self.statements.read_overall_for_rollup_from_child(table)
        };
        let mut rows = Vec::new();
        for child_agent_rollup in child_agent_rollups {
            let mut values = vec![
                Value::Text(child_agent_rollup.clone()),
                Value::Text(query.transaction_type.clone()),
            ];
            if let Some(transaction_name) = &query.transaction_name {
                values.push(Value::Text(transaction_name.clone()));
            }
            values.push(Value::Timestamp(query.to));
            rows.extend(self.session.execute(statement.bind(values)).await?);
        }
        Ok(rows)
    }

    fn rollup_key(&self, params: &RollupParams<'_>, query: &TransactionQuery) -> Vec<Value> {
        let mut values = vec![
            Value::Text(params.agent_rollup_id.to_string()),
            Value::Text(query.transaction_type.clone()),
        ];
        if let Some(transaction_name) = &query.transaction_name {
            values.push(Value::Text(transaction_name.clone()));
        }
        values.push(Value::Timestamp(query.to));
        values
    }

    fn rollup_insert(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
        table: &'static Table,
    ) -> &PreparedStatement {
        if query.transaction_name.is_none() {
            self.statements.insert_overall(table, params.rollup_level)
        } else {
            self.statements.insert_transaction(table, params.rollup_level)
        }
    }

    fn warn_missing_rows(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
        table: &'static Table,
    ) {
        // unexpected since the queue TTL is shorter than the data TTL; happens
        // for queue entries that outlived their data after a retention change
        tracing::warn!(
            agent_rollup_id = params.agent_rollup_id,
            table = table.partial_name,
            transaction_type = %query.transaction_type,
            transaction_name = query.transaction_name.as_deref().unwrap_or(""),
            from = query.from,
            to = query.to,
            "No rows found for rollup"
        );
    }

    fn warn_undecodable_row(
        &self,
        params: &RollupParams<'_>,
        query: &TransactionQuery,
        table: &'static Table,
    ) {
        tracing::warn!(
            agent_rollup_id = params.agent_rollup_id,
            table = table.partial_name,
            transaction_type = %query.transaction_type,
            "Skipping undecodable row during rollup"
        );
    }
}
