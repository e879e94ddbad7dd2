//! Level-0 ingest
//!
//! One `store` call persists everything an agent submitted for one capture
//! tick. Ordering is load-bearing: side-table writes complete before any
//! aggregate row references their sha1, aggregate writes complete before the
//! work-queue entries that announce them, and the call only returns once the
//! work-queue writes are acknowledged. A failed call is retried whole by the
//! agent; duplicate work-queue entries are harmless because rollups are
//! idempotent.

use uuid::Uuid;

use crate::data::codec;
use crate::data::error::StoreError;
use crate::data::expiry::{adjusted_ttl, needs_rollup_adjusted_ttl};
use crate::data::schema::{
    AUX_THREAD_PROFILE, ERROR_SUMMARY, HISTOGRAM, MAIN_THREAD_PROFILE, OVERVIEW, QUERY,
    SERVICE_CALL, SUMMARY, THROUGHPUT,
};
use crate::data::store::{BoundStatement, Value};
use crate::domain::wire::{Aggregate, AggregatesByType, SharedQueryText};
use crate::utils::hash::sha1_hex;
use crate::utils::time::rollup_capture_time;

use super::AggregateStore;

impl AggregateStore {
    /// Persist one capture tick of aggregates for `agent_id`
    pub async fn store(
        &self,
        agent_id: &str,
        capture_time: i64,
        aggregates_by_type: &[AggregatesByType],
        initial_shared_query_texts: &[SharedQueryText],
    ) -> Result<(), StoreError> {
        if aggregates_by_type.is_empty() {
            return Ok(());
        }
        let agent_rollup_ids = Self::agent_rollup_ids(agent_id);
        let ttls = self.config.ttls_seconds();
        let data_ttl = adjusted_ttl(ttls[0], capture_time, self.clock.as_ref());

        // resolve shared query texts, truncating oversized ones through the
        // side table; all side-table writes must ack before aggregate rows
        // reference their sha1
        let truncate = self.config.storage.query_text_truncate;
        let mut shared_query_texts = Vec::with_capacity(initial_shared_query_texts.len());
        for shared_query_text in initial_shared_query_texts {
            if shared_query_text.full_text_sha1.is_empty() {
                let full_text = &shared_query_text.full_text;
                if full_text.chars().count() > truncate {
                    let full_text_sha1 = sha1_hex(full_text);
                    self.full_query_text.store(&full_text_sha1, full_text).await?;
                    shared_query_texts.push(SharedQueryText {
                        full_text: String::new(),
                        truncated_text: full_text.chars().take(truncate).collect(),
                        full_text_sha1,
                    });
                } else {
                    shared_query_texts.push(shared_query_text.clone());
                }
            } else {
                self.full_query_text
                    .update_ttl(&shared_query_text.full_text_sha1)
                    .await?;
                shared_query_texts.push(shared_query_text.clone());
            }
        }

        let mut batch = Vec::new();
        for aggregates in aggregates_by_type {
            let transaction_type = &aggregates.transaction_type;
            let overall = aggregates.overall_aggregate.as_ref().ok_or_else(|| {
                StoreError::invariant(format!(
                    "missing overall aggregate for transaction type {}",
                    transaction_type
                ))
            })?;
            self.collect_aggregate_writes(
                &mut batch,
                agent_id,
                transaction_type,
                None,
                capture_time,
                overall,
                &shared_query_texts,
                data_ttl,
            )?;
            for transaction_aggregate in &aggregates.transaction_aggregates {
                let aggregate = transaction_aggregate.aggregate.as_ref().ok_or_else(|| {
                    StoreError::invariant(format!(
                        "missing aggregate for transaction name {}",
                        transaction_aggregate.transaction_name
                    ))
                })?;
                self.collect_aggregate_writes(
                    &mut batch,
                    agent_id,
                    transaction_type,
                    Some(&transaction_aggregate.transaction_name),
                    capture_time,
                    aggregate,
                    &shared_query_texts,
                    data_ttl,
                )?;
            }
        }
        // wait for success before inserting "needs rollup" records
        self.execute_batch(batch).await?;

        let transaction_types: Vec<String> = aggregates_by_type
            .iter()
            .map(|a| a.transaction_type.clone())
            .collect();
        let queue_ttl =
            needs_rollup_adjusted_ttl(data_ttl, self.config.max_rollup_interval_millis());
        let mut queue_batch = Vec::new();
        if agent_rollup_ids.len() > 1 {
            queue_batch.push(self.statements.insert_needs_rollup_from_child().bind(vec![
                Value::Text(agent_rollup_ids[1].clone()),
                Value::Timestamp(capture_time),
                Value::Uuid(Uuid::now_v7()),
                Value::Text(agent_id.to_string()),
                Value::text_set(transaction_types.iter().cloned()),
                Value::Int(queue_ttl),
            ]));
        }
        let level1_capture =
            rollup_capture_time(capture_time, self.config.interval_millis(1));
        queue_batch.push(self.statements.insert_needs_rollup(1).bind(vec![
            Value::Text(agent_id.to_string()),
            Value::Timestamp(level1_capture),
            Value::Uuid(Uuid::now_v7()),
            Value::text_set(transaction_types),
            Value::Int(queue_ttl),
        ]));
        self.execute_batch(queue_batch).await
    }

    /// Level-0 writes for one (transaction type, optional transaction name)
    #[allow(clippy::too_many_arguments)]
    fn collect_aggregate_writes(
        &self,
        batch: &mut Vec<BoundStatement>,
        agent_rollup_id: &str,
        transaction_type: &str,
        transaction_name: Option<&str>,
        capture_time: i64,
        aggregate: &Aggregate,
        shared_query_texts: &[SharedQueryText],
        data_ttl: i32,
    ) -> Result<(), StoreError> {
        const LEVEL: usize = 0;
        let key = |tn: Option<&str>| -> Vec<Value> {
            let mut values = vec![
                Value::Text(agent_rollup_id.to_string()),
                Value::Text(transaction_type.to_string()),
            ];
            if let Some(tn) = tn {
                values.push(Value::Text(tn.to_string()));
            }
            values.push(Value::Timestamp(capture_time));
            values
        };

        // summary: transaction_name trails capture_time (clustering order)
        let mut values = vec![
            Value::Text(agent_rollup_id.to_string()),
            Value::Text(transaction_type.to_string()),
            Value::Timestamp(capture_time),
        ];
        if let Some(tn) = transaction_name {
            values.push(Value::Text(tn.to_string()));
        }
        values.push(Value::Double(aggregate.total_duration_nanos));
        values.push(Value::BigInt(aggregate.transaction_count));
        values.push(Value::Int(data_ttl));
        batch.push(self.insert(&SUMMARY, transaction_name, LEVEL).bind(values));

        if aggregate.error_count > 0 {
            let mut values = vec![
                Value::Text(agent_rollup_id.to_string()),
                Value::Text(transaction_type.to_string()),
                Value::Timestamp(capture_time),
            ];
            if let Some(tn) = transaction_name {
                values.push(Value::Text(tn.to_string()));
            }
            values.push(Value::BigInt(aggregate.error_count));
            values.push(Value::BigInt(aggregate.transaction_count));
            values.push(Value::Int(data_ttl));
            batch.push(
                self.insert(&ERROR_SUMMARY, transaction_name, LEVEL)
                    .bind(values),
            );
        }

        let mut values = key(transaction_name);
        values.push(Value::Double(aggregate.total_duration_nanos));
        values.push(Value::BigInt(aggregate.transaction_count));
        values.push(Value::Boolean(aggregate.async_transactions));
        values.push(timer_blob(&aggregate.main_thread_root_timers));
        values.push(timer_blob(&aggregate.aux_thread_root_timers));
        values.push(timer_blob(&aggregate.async_timers));
        let main = aggregate.main_thread_stats.as_ref();
        values.push(Self::opt_double_value(main.and_then(|s| s.total_cpu_nanos)));
        values.push(Self::opt_double_value(main.and_then(|s| s.total_blocked_nanos)));
        values.push(Self::opt_double_value(main.and_then(|s| s.total_waited_nanos)));
        values.push(Self::opt_double_value(main.and_then(|s| s.total_allocated_bytes)));
        let aux = aggregate.aux_thread_stats.as_ref();
        values.push(Self::opt_double_value(aux.and_then(|s| s.total_cpu_nanos)));
        values.push(Self::opt_double_value(aux.and_then(|s| s.total_blocked_nanos)));
        values.push(Self::opt_double_value(aux.and_then(|s| s.total_waited_nanos)));
        values.push(Self::opt_double_value(aux.and_then(|s| s.total_allocated_bytes)));
        values.push(Value::Int(data_ttl));
        batch.push(self.insert(&OVERVIEW, transaction_name, LEVEL).bind(values));

        let mut values = key(transaction_name);
        values.push(Value::Double(aggregate.total_duration_nanos));
        values.push(Value::BigInt(aggregate.transaction_count));
        let histogram = aggregate.duration_nanos_histogram.clone().unwrap_or_default();
        values.push(Value::Blob(codec::encode_message(&histogram)));
        values.push(Value::Int(data_ttl));
        batch.push(self.insert(&HISTOGRAM, transaction_name, LEVEL).bind(values));

        let mut values = key(transaction_name);
        values.push(Value::BigInt(aggregate.transaction_count));
        values.push(Value::Int(data_ttl));
        batch.push(self.insert(&THROUGHPUT, transaction_name, LEVEL).bind(values));

        if let Some(profile) = &aggregate.main_thread_profile {
            let mut values = key(transaction_name);
            values.push(Value::Blob(codec::encode_message(profile)));
            values.push(Value::Int(data_ttl));
            batch.push(
                self.insert(&MAIN_THREAD_PROFILE, transaction_name, LEVEL)
                    .bind(values),
            );
        }
        if let Some(profile) = &aggregate.aux_thread_profile {
            let mut values = key(transaction_name);
            values.push(Value::Blob(codec::encode_message(profile)));
            values.push(Value::Int(data_ttl));
            batch.push(
                self.insert(&AUX_THREAD_PROFILE, transaction_name, LEVEL)
                    .bind(values),
            );
        }

        for queries_by_type in &aggregate.queries_by_type {
            for query in &queries_by_type.queries {
                let shared_query_text = shared_query_texts
                    .get(query.shared_query_text_index as usize)
                    .ok_or_else(|| {
                        StoreError::invariant(format!(
                            "shared query text index {} out of range",
                            query.shared_query_text_index
                        ))
                    })?;
                let mut values = key(transaction_name);
                values.push(Value::Text(queries_by_type.query_type.clone()));
                if shared_query_text.full_text_sha1.is_empty() {
                    values.push(Value::Text(shared_query_text.full_text.clone()));
                    // full_query_text_sha1 participates in the clustering key,
                    // so absent is the empty string rather than null
                    values.push(Value::Text(String::new()));
                } else {
                    values.push(Value::Text(shared_query_text.truncated_text.clone()));
                    values.push(Value::Text(shared_query_text.full_text_sha1.clone()));
                }
                values.push(Value::Double(query.total_duration_nanos));
                values.push(Value::BigInt(query.execution_count));
                values.push(Self::opt_bigint_value(query.total_rows));
                values.push(Value::Int(data_ttl));
                batch.push(self.insert(&QUERY, transaction_name, LEVEL).bind(values));
            }
        }

        for service_calls_by_type in &aggregate.service_calls_by_type {
            for service_call in &service_calls_by_type.service_calls {
                let mut values = key(transaction_name);
                values.push(Value::Text(service_calls_by_type.service_call_type.clone()));
                values.push(Value::Text(service_call.text.clone()));
                values.push(Value::Double(service_call.total_duration_nanos));
                values.push(Value::BigInt(service_call.execution_count));
                values.push(Value::Int(data_ttl));
                batch.push(self.insert(&SERVICE_CALL, transaction_name, LEVEL).bind(values));
            }
        }
        Ok(())
    }

    fn insert(
        &self,
        table: &'static crate::data::schema::Table,
        transaction_name: Option<&str>,
        level: usize,
    ) -> &crate::data::store::PreparedStatement {
        if transaction_name.is_some() {
            self.statements.insert_transaction(table, level)
        } else {
            self.statements.insert_overall(table, level)
        }
    }
}

/// Empty timer lists store as null rather than a zero-length blob
fn timer_blob(timers: &[crate::domain::wire::Timer]) -> Value {
    if timers.is_empty() {
        Value::Null
    } else {
        Value::Blob(codec::encode_messages(timers))
    }
}
