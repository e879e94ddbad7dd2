//! Agent wire format
//!
//! Protobuf messages submitted by agents once per capture tick and stored in
//! blob columns. Timer lists are persisted as length-delimited sequences,
//! histograms and profiles as single messages (see [`crate::data::codec`]).

/// A timer tree node; the tree is keyed by (name, extended)
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Timer {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bool, tag = "2")]
    pub extended: bool,
    #[prost(double, tag = "3")]
    pub total_nanos: f64,
    #[prost(int64, tag = "4")]
    pub count: i64,
    #[prost(message, repeated, tag = "5")]
    pub child_timers: Vec<Timer>,
}

/// Per-thread resource usage; every field is optional because agents only
/// report what the runtime exposes
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThreadStats {
    #[prost(double, optional, tag = "1")]
    pub total_cpu_nanos: Option<f64>,
    #[prost(double, optional, tag = "2")]
    pub total_blocked_nanos: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub total_waited_nanos: Option<f64>,
    #[prost(double, optional, tag = "4")]
    pub total_allocated_bytes: Option<f64>,
}

/// Streaming duration histogram: raw values while small, HDR-encoded once the
/// raw representation stops paying for itself
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Histogram {
    #[prost(int64, repeated, tag = "1")]
    pub ordered_raw_values: Vec<i64>,
    #[prost(bytes = "vec", tag = "2")]
    pub encoded_bytes: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProfileNode {
    #[prost(string, tag = "1")]
    pub frame: String,
    #[prost(int64, tag = "2")]
    pub sample_count: i64,
    #[prost(message, repeated, tag = "3")]
    pub child_nodes: Vec<ProfileNode>,
}

/// A sampled call tree
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Profile {
    #[prost(message, repeated, tag = "1")]
    pub root_nodes: Vec<ProfileNode>,
}

/// One query rollup entry; the text lives in the shared query text list and
/// is referenced by index to keep repeated texts off the wire
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Query {
    #[prost(int32, tag = "1")]
    pub shared_query_text_index: i32,
    #[prost(double, tag = "2")]
    pub total_duration_nanos: f64,
    #[prost(int64, tag = "3")]
    pub execution_count: i64,
    #[prost(int64, optional, tag = "4")]
    pub total_rows: Option<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueriesByType {
    #[prost(string, tag = "1")]
    pub query_type: String,
    #[prost(message, repeated, tag = "2")]
    pub queries: Vec<Query>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceCall {
    #[prost(string, tag = "1")]
    pub text: String,
    #[prost(double, tag = "2")]
    pub total_duration_nanos: f64,
    #[prost(int64, tag = "3")]
    pub execution_count: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServiceCallsByType {
    #[prost(string, tag = "1")]
    pub service_call_type: String,
    #[prost(message, repeated, tag = "2")]
    pub service_calls: Vec<ServiceCall>,
}

/// A query text shared across the aggregates of one store call.
///
/// Either `full_text` is set (first submission), or `truncated_text` +
/// `full_text_sha1` reference a text the collector already knows.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SharedQueryText {
    #[prost(string, tag = "1")]
    pub full_text: String,
    #[prost(string, tag = "2")]
    pub truncated_text: String,
    #[prost(string, tag = "3")]
    pub full_text_sha1: String,
}

/// One minute of aggregated transaction data, overall or per transaction name
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Aggregate {
    #[prost(double, tag = "1")]
    pub total_duration_nanos: f64,
    #[prost(int64, tag = "2")]
    pub transaction_count: i64,
    #[prost(int64, tag = "3")]
    pub error_count: i64,
    #[prost(bool, tag = "4")]
    pub async_transactions: bool,
    #[prost(message, repeated, tag = "5")]
    pub main_thread_root_timers: Vec<Timer>,
    #[prost(message, repeated, tag = "6")]
    pub aux_thread_root_timers: Vec<Timer>,
    #[prost(message, repeated, tag = "7")]
    pub async_timers: Vec<Timer>,
    #[prost(message, optional, tag = "8")]
    pub main_thread_stats: Option<ThreadStats>,
    #[prost(message, optional, tag = "9")]
    pub aux_thread_stats: Option<ThreadStats>,
    #[prost(message, optional, tag = "10")]
    pub duration_nanos_histogram: Option<Histogram>,
    #[prost(message, optional, tag = "11")]
    pub main_thread_profile: Option<Profile>,
    #[prost(message, optional, tag = "12")]
    pub aux_thread_profile: Option<Profile>,
    #[prost(message, repeated, tag = "13")]
    pub queries_by_type: Vec<QueriesByType>,
    #[prost(message, repeated, tag = "14")]
    pub service_calls_by_type: Vec<ServiceCallsByType>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionAggregate {
    #[prost(string, tag = "1")]
    pub transaction_name: String,
    #[prost(message, optional, tag = "2")]
    pub aggregate: Option<Aggregate>,
}

/// Everything an agent submits for one transaction type in one capture tick
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AggregatesByType {
    #[prost(string, tag = "1")]
    pub transaction_type: String,
    #[prost(message, optional, tag = "2")]
    pub overall_aggregate: Option<Aggregate>,
    #[prost(message, repeated, tag = "3")]
    pub transaction_aggregates: Vec<TransactionAggregate>,
}
