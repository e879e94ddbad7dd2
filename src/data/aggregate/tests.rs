//! End-to-end scenarios over the in-memory backend: ingest, multi-level
//! rollup, hierarchy rollup, work-queue discipline, dedup, and capping.

use std::sync::Arc;

use crate::core::config::{AdvancedConfig, CentralConfig, RollupConfig, StorageConfig};
use crate::core::shutdown::ShutdownSignal;
use crate::data::memory::MemorySession;
use crate::data::store::{Session, Value};
use crate::domain::merge::{
    OverallSummaryCollector, ProfileCollector, QueryCollector, ServiceCallCollector,
    SummarySortOrder, TransactionSummaryCollector,
};
use crate::domain::wire::{
    Aggregate, AggregatesByType, Histogram, Profile, ProfileNode, QueriesByType, Query,
    ServiceCall, ServiceCallsByType, SharedQueryText, ThreadStats, Timer, TransactionAggregate,
};
use crate::utils::hash::sha1_hex;
use crate::utils::time::ManualClock;

use super::{AggregateStore, OverallQuery, TransactionQuery};

struct Harness {
    clock: Arc<ManualClock>,
    session: Arc<MemorySession>,
    store: AggregateStore,
}

fn test_config() -> CentralConfig {
    CentralConfig {
        rollup_configs: vec![
            RollupConfig::new(60_000),
            RollupConfig::new(300_000),
            RollupConfig::new(1_800_000),
        ],
        storage: StorageConfig {
            rollup_expiration_hours: vec![24, 24, 48],
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn harness() -> Harness {
    harness_with(test_config()).await
}

async fn harness_with(config: CentralConfig) -> Harness {
    let clock = ManualClock::new(0);
    let session = Arc::new(MemorySession::new(clock.clone()));
    let store = AggregateStore::build(session.clone(), config, clock.clone())
        .await
        .unwrap();
    Harness {
        clock,
        session,
        store,
    }
}

fn aggregate(total_duration_nanos: f64, transaction_count: i64) -> Aggregate {
    Aggregate {
        total_duration_nanos,
        transaction_count,
        duration_nanos_histogram: Some(Histogram {
            ordered_raw_values: vec![total_duration_nanos as i64],
            encoded_bytes: Vec::new(),
        }),
        ..Default::default()
    }
}

fn by_type(transaction_type: &str, overall: Aggregate) -> AggregatesByType {
    AggregatesByType {
        transaction_type: transaction_type.to_string(),
        overall_aggregate: Some(overall),
        transaction_aggregates: Vec::new(),
    }
}

fn overall_query(level: usize, from: i64, to: i64) -> OverallQuery {
    OverallQuery {
        transaction_type: "Web".to_string(),
        from,
        to,
        rollup_level: level,
    }
}

fn transaction_query(level: usize, from: i64, to: i64) -> TransactionQuery {
    TransactionQuery {
        transaction_type: "Web".to_string(),
        transaction_name: None,
        from,
        to,
        rollup_level: level,
    }
}

/// Capture times currently queued in a work-queue table for one agent rollup
async fn queue_capture_times(harness: &Harness, table: &str, agent_rollup_id: &str) -> Vec<i64> {
    let statement = harness
        .session
        .prepare(&format!(
            "select capture_time from {} where agent_rollup = ?",
            table
        ))
        .await
        .unwrap();
    harness
        .session
        .execute(statement.bind(vec![Value::Text(agent_rollup_id.to_string())]))
        .await
        .unwrap()
        .iter()
        .map(|row| row.timestamp(0).unwrap())
        .collect()
}

async fn overall_summary(
    harness: &Harness,
    agent_rollup_id: &str,
    level: usize,
    from: i64,
    to: i64,
) -> (f64, i64, i64) {
    let mut collector = OverallSummaryCollector::default();
    harness
        .store
        .merge_overall_summary_into(agent_rollup_id, &overall_query(level, from, to), &mut collector)
        .await
        .unwrap();
    let summary = collector.summary();
    (
        summary.total_duration_nanos,
        summary.transaction_count,
        collector.last_capture_time(),
    )
}

// =============================================================================
// S1: single bucket rollup
// =============================================================================

#[tokio::test]
async fn test_single_bucket_rollup() {
    let harness = harness().await;
    harness.clock.set(130_000);
    harness
        .store
        .store("agent-1", 60_000, &[by_type("Web", aggregate(100.0, 1))], &[])
        .await
        .unwrap();
    harness
        .store
        .store("agent-1", 120_000, &[by_type("Web", aggregate(300.0, 2))], &[])
        .await
        .unwrap();

    // both captures land in the 300_000 level-1 bucket
    assert_eq!(
        queue_capture_times(&harness, "aggregate_needs_rollup_1", "agent-1").await,
        vec![300_000, 300_000]
    );

    // one full interval past the bucket, so the last-bucket rule lets it roll
    harness.clock.set(700_000);
    harness
        .store
        .rollup("agent-1", None, true, &ShutdownSignal::never())
        .await
        .unwrap();

    let (duration, count, capture) = overall_summary(&harness, "agent-1", 1, 0, 300_000).await;
    assert_eq!(duration, 400.0);
    assert_eq!(count, 3);
    assert_eq!(capture, 300_000);

    assert!(queue_capture_times(&harness, "aggregate_needs_rollup_1", "agent-1")
        .await
        .is_empty());
    assert_eq!(
        queue_capture_times(&harness, "aggregate_needs_rollup_2", "agent-1").await,
        vec![1_800_000]
    );
}

#[tokio::test]
async fn test_rollup_rows_are_bucket_aligned() {
    let harness = harness().await;
    harness.clock.set(130_000);
    harness
        .store
        .store("agent-1", 60_000, &[by_type("Web", aggregate(100.0, 1))], &[])
        .await
        .unwrap();
    harness.clock.set(700_000);
    harness
        .store
        .rollup("agent-1", None, true, &ShutdownSignal::never())
        .await
        .unwrap();
    let throughput = harness
        .store
        .read_throughput_aggregates("agent-1", &transaction_query(1, 0, 600_000))
        .await
        .unwrap();
    assert_eq!(throughput.len(), 1);
    assert_eq!(throughput[0].capture_time % 300_000, 0);
    assert_eq!(throughput[0].transaction_count, 1);
}

// =============================================================================
// S2: rollup from children
// =============================================================================

fn with_transaction(mut aggregates: AggregatesByType, name: &str, agg: Aggregate) -> AggregatesByType {
    aggregates.transaction_aggregates.push(TransactionAggregate {
        transaction_name: name.to_string(),
        aggregate: Some(agg),
    });
    aggregates
}

#[tokio::test]
async fn test_rollup_from_children() {
    let harness = harness().await;
    harness.clock.set(70_000);
    harness
        .store
        .store(
            "grp::agent-a",
            60_000,
            &[with_transaction(
                by_type("Web", aggregate(100.0, 1)),
                "/checkout",
                aggregate(100.0, 1),
            )],
            &[],
        )
        .await
        .unwrap();
    harness
        .store
        .store(
            "grp::agent-b",
            60_000,
            &[with_transaction(
                by_type("Web", aggregate(200.0, 1)),
                "/checkout",
                aggregate(200.0, 1),
            )],
            &[],
        )
        .await
        .unwrap();

    assert_eq!(
        queue_capture_times(&harness, "aggregate_needs_rollup_from_child", "grp").await,
        vec![60_000, 60_000]
    );

    harness
        .store
        .rollup("grp", None, false, &ShutdownSignal::never())
        .await
        .unwrap();

    // parent's level-0 rows carry both children's data for the single bucket
    let (duration, count, capture) = overall_summary(&harness, "grp", 0, 0, 60_000).await;
    assert_eq!(duration, 300.0);
    assert_eq!(count, 2);
    assert_eq!(capture, 60_000);

    let mut names = TransactionSummaryCollector::default();
    harness
        .store
        .merge_transaction_summaries_into("grp", &overall_query(0, 0, 60_000), &mut names)
        .await
        .unwrap();
    let result = names.result(SummarySortOrder::TotalTime, 10);
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].transaction_name, "/checkout");
    assert_eq!(result[0].total_duration_nanos, 300.0);

    assert!(
        queue_capture_times(&harness, "aggregate_needs_rollup_from_child", "grp")
            .await
            .is_empty()
    );
    assert_eq!(
        queue_capture_times(&harness, "aggregate_needs_rollup_1", "grp").await,
        vec![300_000]
    );
}

// =============================================================================
// S3: last-bucket skipping
// =============================================================================

#[tokio::test]
async fn test_last_bucket_is_skipped_while_still_filling() {
    let harness = harness().await;
    harness.clock.set(950_000);
    harness
        .store
        .store("agent-1", 540_000, &[by_type("Web", aggregate(100.0, 1))], &[])
        .await
        .unwrap();
    harness
        .store
        .store("agent-1", 840_000, &[by_type("Web", aggregate(200.0, 1))], &[])
        .await
        .unwrap();

    // wall clock is within one interval of the 900_000 bucket
    harness.clock.set(1_000_000);
    harness
        .store
        .rollup("agent-1", None, true, &ShutdownSignal::never())
        .await
        .unwrap();

    let (duration, count, _) = overall_summary(&harness, "agent-1", 1, 300_000, 600_000).await;
    assert_eq!(duration, 100.0);
    assert_eq!(count, 1);
    let (duration, count, _) = overall_summary(&harness, "agent-1", 1, 600_000, 900_000).await;
    assert_eq!(duration, 0.0);
    assert_eq!(count, 0);
    assert_eq!(
        queue_capture_times(&harness, "aggregate_needs_rollup_1", "agent-1").await,
        vec![900_000]
    );

    // a full interval later, the stalled bucket must roll up before its TTL
    harness.clock.set(1_300_000);
    harness
        .store
        .rollup("agent-1", None, true, &ShutdownSignal::never())
        .await
        .unwrap();
    let (duration, count, _) = overall_summary(&harness, "agent-1", 1, 600_000, 900_000).await;
    assert_eq!(duration, 200.0);
    assert_eq!(count, 1);
    assert!(queue_capture_times(&harness, "aggregate_needs_rollup_1", "agent-1")
        .await
        .is_empty());
}

// =============================================================================
// S4: idempotency
// =============================================================================

#[tokio::test]
async fn test_rollup_is_idempotent() {
    let harness = harness().await;
    harness.clock.set(130_000);
    harness
        .store
        .store("agent-1", 60_000, &[by_type("Web", aggregate(100.0, 1))], &[])
        .await
        .unwrap();
    harness
        .store
        .store("agent-1", 120_000, &[by_type("Web", aggregate(300.0, 2))], &[])
        .await
        .unwrap();
    harness.clock.set(700_000);
    harness
        .store
        .rollup("agent-1", None, true, &ShutdownSignal::never())
        .await
        .unwrap();
    let first = overall_summary(&harness, "agent-1", 1, 0, 300_000).await;
    let first_queue =
        queue_capture_times(&harness, "aggregate_needs_rollup_2", "agent-1").await;

    harness
        .store
        .rollup("agent-1", None, true, &ShutdownSignal::never())
        .await
        .unwrap();
    assert_eq!(overall_summary(&harness, "agent-1", 1, 0, 300_000).await, first);
    assert_eq!(
        queue_capture_times(&harness, "aggregate_needs_rollup_2", "agent-1").await,
        first_queue
    );
}

#[tokio::test]
async fn test_duplicate_queue_rows_produce_extra_work_not_wrong_answers() {
    let harness = harness().await;
    harness.clock.set(130_000);
    harness
        .store
        .store("agent-1", 60_000, &[by_type("Web", aggregate(100.0, 1))], &[])
        .await
        .unwrap();
    harness.clock.set(700_000);
    harness
        .store
        .rollup("agent-1", None, true, &ShutdownSignal::never())
        .await
        .unwrap();
    let first = overall_summary(&harness, "agent-1", 1, 0, 300_000).await;

    // a resurrected queue row (e.g. after gc_grace) re-announces the bucket
    let insert = harness
        .session
        .prepare(
            "insert into aggregate_needs_rollup_1 (agent_rollup, capture_time, uniqueness, \
             transaction_types) values (?, ?, ?, ?) using ttl ?",
        )
        .await
        .unwrap();
    harness
        .session
        .execute(insert.bind(vec![
            Value::Text("agent-1".to_string()),
            Value::Timestamp(300_000),
            Value::Uuid(uuid::Uuid::now_v7()),
            Value::text_set(["Web".to_string()]),
            Value::Int(3600),
        ]))
        .await
        .unwrap();

    harness
        .store
        .rollup("agent-1", None, true, &ShutdownSignal::never())
        .await
        .unwrap();
    assert_eq!(overall_summary(&harness, "agent-1", 1, 0, 300_000).await, first);
    assert!(queue_capture_times(&harness, "aggregate_needs_rollup_1", "agent-1")
        .await
        .is_empty());
}

// =============================================================================
// S5: query text dedup through the side table
// =============================================================================

fn query_aggregate(duration: f64) -> Aggregate {
    Aggregate {
        queries_by_type: vec![QueriesByType {
            query_type: "SQL".to_string(),
            queries: vec![Query {
                shared_query_text_index: 0,
                total_duration_nanos: duration,
                execution_count: 1,
                total_rows: Some(5),
            }],
        }],
        ..aggregate(duration, 1)
    }
}

#[tokio::test]
async fn test_oversized_query_text_dedups_through_side_table() {
    let harness = harness().await;
    let long_text = format!(
        "SELECT o.id, o.created_at, c.name, c.email FROM orders o JOIN customers c \
         ON o.customer_id = c.id WHERE o.status = ? AND o.created_at > ? {}",
        "ORDER BY o.created_at DESC".repeat(3)
    );
    assert!(long_text.chars().count() > 120);
    let shared = SharedQueryText {
        full_text: long_text.clone(),
        truncated_text: String::new(),
        full_text_sha1: String::new(),
    };

    harness.clock.set(130_000);
    harness
        .store
        .store(
            "agent-1",
            60_000,
            &[by_type("Web", query_aggregate(100.0))],
            std::slice::from_ref(&shared),
        )
        .await
        .unwrap();
    harness
        .store
        .store(
            "agent-1",
            120_000,
            &[by_type("Web", query_aggregate(200.0))],
            std::slice::from_ref(&shared),
        )
        .await
        .unwrap();

    harness.clock.set(700_000);
    harness
        .store
        .rollup("agent-1", None, true, &ShutdownSignal::never())
        .await
        .unwrap();

    let mut collector = QueryCollector::new(100);
    harness
        .store
        .merge_queries_into("agent-1", &transaction_query(1, 0, 300_000), &mut collector)
        .await
        .unwrap();
    let result = collector.sorted_and_capped();
    let queries = &result["SQL"];
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].execution_count, 2);
    assert_eq!(queries[0].total_duration_nanos, 300.0);
    assert_eq!(queries[0].total_rows, 10);
    assert_eq!(queries[0].truncated_text.chars().count(), 120);

    // no orphan sha1: the reference resolves in the side table
    let sha1 = queries[0].full_text_sha1.clone().unwrap();
    assert_eq!(sha1, sha1_hex(&long_text));
    assert_eq!(
        harness.store.read_full_query_text(&sha1).await.unwrap(),
        Some(long_text)
    );
}

// =============================================================================
// S6: top-N capping
// =============================================================================

#[tokio::test]
async fn test_query_capping_keeps_top_n_by_duration() {
    let mut config = test_config();
    config.advanced.insert(
        "agent-1".to_string(),
        AdvancedConfig {
            max_query_aggregates_per_type: 10,
            max_service_call_aggregates_per_type: 10,
        },
    );
    let harness = harness_with(config).await;

    let shared_query_texts: Vec<SharedQueryText> = (1..=15)
        .map(|i| SharedQueryText {
            full_text: format!("select {} from t", i),
            truncated_text: String::new(),
            full_text_sha1: String::new(),
        })
        .collect();
    let queries: Vec<Query> = (1..=15)
        .map(|i| Query {
            shared_query_text_index: i - 1,
            total_duration_nanos: i as f64,
            execution_count: 1,
            total_rows: None,
        })
        .collect();
    let agg = Aggregate {
        queries_by_type: vec![QueriesByType {
            query_type: "SQL".to_string(),
            queries,
        }],
        ..aggregate(120.0, 15)
    };

    harness.clock.set(70_000);
    harness
        .store
        .store("agent-1", 60_000, &[by_type("Web", agg)], &shared_query_texts)
        .await
        .unwrap();
    harness.clock.set(700_000);
    harness
        .store
        .rollup("agent-1", None, true, &ShutdownSignal::never())
        .await
        .unwrap();

    let mut collector = QueryCollector::new(100);
    harness
        .store
        .merge_queries_into("agent-1", &transaction_query(1, 0, 300_000), &mut collector)
        .await
        .unwrap();
    let result = collector.sorted_and_capped();
    let kept = &result["SQL"];
    assert_eq!(kept.len(), 10);
    let mut durations: Vec<f64> = kept.iter().map(|q| q.total_duration_nanos).collect();
    durations.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(durations, (6..=15).map(|i| i as f64).collect::<Vec<_>>());
}

// =============================================================================
// Overview, service calls, profiles
// =============================================================================

#[tokio::test]
async fn test_overview_rollup_merges_timers_and_thread_stats() {
    let harness = harness().await;
    let mut first = aggregate(100.0, 1);
    first.async_transactions = false;
    first.main_thread_root_timers = vec![Timer {
        name: "http".to_string(),
        extended: false,
        total_nanos: 90.0,
        count: 1,
        child_timers: Vec::new(),
    }];
    first.main_thread_stats = Some(ThreadStats {
        total_cpu_nanos: Some(50.0),
        ..Default::default()
    });
    // aux stats absent on the first row, present on the second: they must
    // accumulate independently of main
    let mut second = aggregate(300.0, 2);
    second.async_transactions = true;
    second.main_thread_root_timers = vec![Timer {
        name: "http".to_string(),
        extended: false,
        total_nanos: 250.0,
        count: 2,
        child_timers: Vec::new(),
    }];
    second.aux_thread_stats = Some(ThreadStats {
        total_blocked_nanos: Some(7.0),
        ..Default::default()
    });

    harness.clock.set(130_000);
    harness
        .store
        .store("agent-1", 60_000, &[by_type("Web", first)], &[])
        .await
        .unwrap();
    harness
        .store
        .store("agent-1", 120_000, &[by_type("Web", second)], &[])
        .await
        .unwrap();
    harness.clock.set(700_000);
    harness
        .store
        .rollup("agent-1", None, true, &ShutdownSignal::never())
        .await
        .unwrap();

    let overviews = harness
        .store
        .read_overview_aggregates("agent-1", &transaction_query(1, 300_000, 300_000))
        .await
        .unwrap();
    assert_eq!(overviews.len(), 1);
    let overview = &overviews[0];
    assert_eq!(overview.total_duration_nanos, 400.0);
    assert_eq!(overview.transaction_count, 3);
    assert!(overview.async_transactions);
    assert_eq!(overview.main_thread_root_timers.len(), 1);
    assert_eq!(overview.main_thread_root_timers[0].total_nanos, 340.0);
    assert_eq!(overview.main_thread_root_timers[0].count, 3);
    let main_stats = overview.main_thread_stats.as_ref().unwrap();
    assert_eq!(main_stats.total_cpu_nanos, Some(50.0));
    assert_eq!(main_stats.total_blocked_nanos, None);
    let aux_stats = overview.aux_thread_stats.as_ref().unwrap();
    assert_eq!(aux_stats.total_blocked_nanos, Some(7.0));
    assert_eq!(aux_stats.total_cpu_nanos, None);
}

#[tokio::test]
async fn test_service_call_rollup_and_read() {
    let harness = harness().await;
    let mut agg = aggregate(100.0, 1);
    agg.service_calls_by_type = vec![ServiceCallsByType {
        service_call_type: "HTTP".to_string(),
        service_calls: vec![ServiceCall {
            text: "GET /api/users".to_string(),
            total_duration_nanos: 80.0,
            execution_count: 2,
        }],
    }];
    harness.clock.set(130_000);
    harness
        .store
        .store("agent-1", 60_000, &[by_type("Web", agg.clone())], &[])
        .await
        .unwrap();
    harness
        .store
        .store("agent-1", 120_000, &[by_type("Web", agg)], &[])
        .await
        .unwrap();
    harness.clock.set(700_000);
    harness
        .store
        .rollup("agent-1", None, true, &ShutdownSignal::never())
        .await
        .unwrap();

    let mut collector = ServiceCallCollector::new(100);
    harness
        .store
        .merge_service_calls_into("agent-1", &transaction_query(1, 0, 300_000), &mut collector)
        .await
        .unwrap();
    let result = collector.sorted_and_capped();
    assert_eq!(result["HTTP"][0].total_duration_nanos, 160.0);
    assert_eq!(result["HTTP"][0].execution_count, 4);
}

#[tokio::test]
async fn test_profile_rollup_and_exists_probe() {
    let harness = harness().await;
    let mut agg = aggregate(100.0, 1);
    agg.main_thread_profile = Some(Profile {
        root_nodes: vec![ProfileNode {
            frame: "Controller.handle".to_string(),
            sample_count: 4,
            child_nodes: Vec::new(),
        }],
    });
    harness.clock.set(130_000);
    harness
        .store
        .store("agent-1", 60_000, &[by_type("Web", agg.clone())], &[])
        .await
        .unwrap();
    harness
        .store
        .store("agent-1", 120_000, &[by_type("Web", agg)], &[])
        .await
        .unwrap();
    harness.clock.set(700_000);
    harness
        .store
        .rollup("agent-1", None, true, &ShutdownSignal::never())
        .await
        .unwrap();

    let mut collector = ProfileCollector::default();
    harness
        .store
        .merge_main_thread_profiles_into(
            "agent-1",
            &transaction_query(1, 0, 300_000),
            &mut collector,
        )
        .await
        .unwrap();
    assert_eq!(collector.profile().sample_count(), 8);

    assert!(harness
        .store
        .has_main_thread_profile("agent-1", &transaction_query(1, 0, 300_000))
        .await
        .unwrap());
    assert!(!harness
        .store
        .has_aux_thread_profile("agent-1", &transaction_query(1, 0, 300_000))
        .await
        .unwrap());
}

// =============================================================================
// Error summary gating
// =============================================================================

#[tokio::test]
async fn test_error_summary_only_written_when_errors_present() {
    let harness = harness().await;
    let mut failing = aggregate(100.0, 2);
    failing.error_count = 1;
    harness.clock.set(130_000);
    harness
        .store
        .store("agent-1", 60_000, &[by_type("Web", aggregate(50.0, 1))], &[])
        .await
        .unwrap();
    harness
        .store
        .store("agent-1", 120_000, &[by_type("Web", failing)], &[])
        .await
        .unwrap();
    harness.clock.set(700_000);
    harness
        .store
        .rollup("agent-1", None, true, &ShutdownSignal::never())
        .await
        .unwrap();

    let mut collector = crate::domain::merge::OverallErrorSummaryCollector::default();
    harness
        .store
        .merge_overall_error_summary_into(
            "agent-1",
            &overall_query(1, 0, 300_000),
            &mut collector,
        )
        .await
        .unwrap();
    let summary = collector.summary();
    assert_eq!(summary.error_count, 1);
    // only the failing capture contributed a row
    assert_eq!(summary.transaction_count, 2);
}

// =============================================================================
// Queue convergence and cancellation
// =============================================================================

#[tokio::test]
async fn test_queues_drain_once_stores_cease() {
    let harness = harness().await;
    harness.clock.set(130_000);
    for capture in [60_000, 120_000, 540_000] {
        harness.clock.set(capture + 10_000);
        harness
            .store
            .store("agent-1", capture, &[by_type("Web", aggregate(10.0, 1))], &[])
            .await
            .unwrap();
    }
    // far enough ahead that no bucket is "still filling"
    harness.clock.set(10_000_000);
    for _ in 0..3 {
        harness
            .store
            .rollup("agent-1", None, true, &ShutdownSignal::never())
            .await
            .unwrap();
    }
    for table in ["aggregate_needs_rollup_1", "aggregate_needs_rollup_2"] {
        assert!(
            queue_capture_times(&harness, table, "agent-1").await.is_empty(),
            "{} not drained",
            table
        );
    }
    // sum preservation across both levels
    let (duration, count, _) = overall_summary(&harness, "agent-1", 2, 0, 1_800_000).await;
    assert_eq!(duration, 30.0);
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_triggered_shutdown_leaves_queue_intact() {
    let harness = harness().await;
    harness.clock.set(130_000);
    harness
        .store
        .store("agent-1", 60_000, &[by_type("Web", aggregate(100.0, 1))], &[])
        .await
        .unwrap();
    harness.clock.set(700_000);

    let (tx, signal) = ShutdownSignal::new();
    tx.send(true).unwrap();
    harness
        .store
        .rollup("agent-1", None, true, &signal)
        .await
        .unwrap();

    // nothing consumed, nothing written
    assert_eq!(
        queue_capture_times(&harness, "aggregate_needs_rollup_1", "agent-1").await,
        vec![300_000]
    );
    let (_, count, _) = overall_summary(&harness, "agent-1", 1, 0, 300_000).await;
    assert_eq!(count, 0);
}
