//! Aggregate table catalog and statement text generation
//!
//! Each aggregate kind is one table family, parameterized by rollup level and
//! by whether the row is overall (`tt`) or per-transaction (`tn`). Summary
//! tables differ structurally: their partition key excludes transaction_name
//! (it becomes the first clustering key after capture_time) so that one range
//! read can group across names, and their UI reads use an exclusive lower
//! bound so merges from adjoining ranges never double-count a boundary.

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub type_name: &'static str,
}

impl Column {
    const fn new(name: &'static str, type_name: &'static str) -> Self {
        Self { name, type_name }
    }
}

/// Declarative description of one aggregate table family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    pub partial_name: &'static str,
    pub columns: &'static [Column],
    pub cluster_keys: &'static [&'static str],
    pub summary: bool,
    pub from_inclusive: bool,
}

pub const SUMMARY: Table = Table {
    partial_name: "summary",
    columns: &[
        Column::new("total_duration_nanos", "double"),
        Column::new("transaction_count", "bigint"),
    ],
    cluster_keys: &[],
    summary: true,
    from_inclusive: false,
};

pub const ERROR_SUMMARY: Table = Table {
    partial_name: "error_summary",
    columns: &[
        Column::new("error_count", "bigint"),
        Column::new("transaction_count", "bigint"),
    ],
    cluster_keys: &[],
    summary: true,
    from_inclusive: false,
};

pub const OVERVIEW: Table = Table {
    partial_name: "overview",
    columns: &[
        Column::new("total_duration_nanos", "double"),
        Column::new("transaction_count", "bigint"),
        Column::new("async_transactions", "boolean"),
        Column::new("main_thread_root_timers", "blob"),
        Column::new("aux_thread_root_timers", "blob"),
        Column::new("async_timers", "blob"),
        // the eight thread-stat columns are nullable
        Column::new("main_thread_total_cpu_nanos", "double"),
        Column::new("main_thread_total_blocked_nanos", "double"),
        Column::new("main_thread_total_waited_nanos", "double"),
        Column::new("main_thread_total_allocated_bytes", "double"),
        Column::new("aux_thread_total_cpu_nanos", "double"),
        Column::new("aux_thread_total_blocked_nanos", "double"),
        Column::new("aux_thread_total_waited_nanos", "double"),
        Column::new("aux_thread_total_allocated_bytes", "double"),
    ],
    cluster_keys: &[],
    summary: false,
    from_inclusive: true,
};

pub const HISTOGRAM: Table = Table {
    partial_name: "histogram",
    columns: &[
        Column::new("total_duration_nanos", "double"),
        Column::new("transaction_count", "bigint"),
        Column::new("duration_nanos_histogram", "blob"),
    ],
    cluster_keys: &[],
    summary: false,
    from_inclusive: true,
};

pub const THROUGHPUT: Table = Table {
    partial_name: "throughput",
    columns: &[Column::new("transaction_count", "bigint")],
    cluster_keys: &[],
    summary: false,
    from_inclusive: true,
};

pub const QUERY: Table = Table {
    partial_name: "query",
    columns: &[
        Column::new("query_type", "varchar"),
        Column::new("truncated_query_text", "varchar"),
        // empty when truncated_query_text is really the full query text
        // (not null since this column participates in the clustering key)
        Column::new("full_query_text_sha1", "varchar"),
        Column::new("total_duration_nanos", "double"),
        Column::new("execution_count", "bigint"),
        Column::new("total_rows", "bigint"),
    ],
    cluster_keys: &["query_type", "truncated_query_text", "full_query_text_sha1"],
    summary: false,
    from_inclusive: false,
};

pub const SERVICE_CALL: Table = Table {
    partial_name: "service_call",
    columns: &[
        Column::new("service_call_type", "varchar"),
        Column::new("service_call_text", "varchar"),
        Column::new("total_duration_nanos", "double"),
        Column::new("execution_count", "bigint"),
    ],
    cluster_keys: &["service_call_type", "service_call_text"],
    summary: false,
    from_inclusive: false,
};

pub const MAIN_THREAD_PROFILE: Table = Table {
    partial_name: "main_thread_profile",
    columns: &[Column::new("main_thread_profile", "blob")],
    cluster_keys: &[],
    summary: false,
    from_inclusive: false,
};

pub const AUX_THREAD_PROFILE: Table = Table {
    partial_name: "aux_thread_profile",
    columns: &[Column::new("aux_thread_profile", "blob")],
    cluster_keys: &[],
    summary: false,
    from_inclusive: false,
};

pub const ALL_TABLES: [&Table; 9] = [
    &SUMMARY,
    &ERROR_SUMMARY,
    &OVERVIEW,
    &HISTOGRAM,
    &THROUGHPUT,
    &QUERY,
    &SERVICE_CALL,
    &MAIN_THREAD_PROFILE,
    &AUX_THREAD_PROFILE,
];

// =============================================================================
// Table Names & Options
// =============================================================================

pub fn table_name(partial_name: &str, transaction: bool, level: usize) -> String {
    let variant = if transaction { "tn" } else { "tt" };
    format!("aggregate_{}_{}_rollup_{}", variant, partial_name, level)
}

/// Time-window compaction options sized so a full retention spans roughly
/// thirty windows
pub fn twcs_options(expiration_hours: i64) -> String {
    let window_hours = (expiration_hours / 30).max(1);
    format!(
        "compaction = {{ 'class' : 'TimeWindowCompactionStrategy', \
         'compaction_window_unit' : 'hours', 'compaction_window_size' : {} }}",
        window_hours
    )
}

pub const LCS: &str = "compaction = { 'class' : 'LeveledCompactionStrategy' }";

// =============================================================================
// DDL
// =============================================================================

pub fn create_table_query(table: &Table, transaction: bool, level: usize) -> String {
    let mut sb = String::from("create table if not exists ");
    sb.push_str(&table_name(table.partial_name, transaction, level));
    sb.push_str(" (agent_rollup varchar, transaction_type varchar");
    if transaction {
        sb.push_str(", transaction_name varchar");
    }
    sb.push_str(", capture_time timestamp");
    for column in table.columns {
        sb.push_str(", ");
        sb.push_str(column.name);
        sb.push(' ');
        sb.push_str(column.type_name);
    }
    sb.push_str(", primary key ((agent_rollup, transaction_type");
    if transaction {
        sb.push_str(", transaction_name");
    }
    sb.push_str("), capture_time");
    for cluster_key in table.cluster_keys {
        sb.push_str(", ");
        sb.push_str(cluster_key);
    }
    sb.push_str("))");
    sb
}

pub fn create_summary_table_query(table: &Table, transaction: bool, level: usize) -> String {
    let mut sb = String::from("create table if not exists ");
    sb.push_str(&table_name(table.partial_name, transaction, level));
    sb.push_str(" (agent_rollup varchar, transaction_type varchar, capture_time timestamp");
    if transaction {
        sb.push_str(", transaction_name varchar");
    }
    for column in table.columns {
        sb.push_str(", ");
        sb.push_str(column.name);
        sb.push(' ');
        sb.push_str(column.type_name);
    }
    sb.push_str(", primary key ((agent_rollup, transaction_type), capture_time");
    if transaction {
        sb.push_str(", transaction_name");
    }
    sb.push_str("))");
    sb
}

// =============================================================================
// Insert Statements
// =============================================================================

pub fn insert_ps(table: &Table, transaction: bool, level: usize) -> String {
    let mut sb = String::from("insert into ");
    sb.push_str(&table_name(table.partial_name, transaction, level));
    sb.push_str(" (agent_rollup, transaction_type");
    if transaction {
        sb.push_str(", transaction_name");
    }
    sb.push_str(", capture_time");
    for column in table.columns {
        sb.push_str(", ");
        sb.push_str(column.name);
    }
    sb.push_str(") values (?, ?, ?");
    if transaction {
        sb.push_str(", ?");
    }
    for _ in table.columns {
        sb.push_str(", ?");
    }
    sb.push_str(") using ttl ?");
    sb
}

pub fn insert_summary_ps(table: &Table, transaction: bool, level: usize) -> String {
    let mut sb = String::from("insert into ");
    sb.push_str(&table_name(table.partial_name, transaction, level));
    sb.push_str(" (agent_rollup, transaction_type, capture_time");
    if transaction {
        sb.push_str(", transaction_name");
    }
    for column in table.columns {
        sb.push_str(", ");
        sb.push_str(column.name);
    }
    sb.push_str(") values (?, ?, ?");
    if transaction {
        sb.push_str(", ?");
    }
    for _ in table.columns {
        sb.push_str(", ?");
    }
    sb.push_str(") using ttl ?");
    sb
}

// =============================================================================
// Read Statements
// =============================================================================

fn push_column_names(sb: &mut String, columns: &[Column]) {
    let mut add_separator = false;
    for column in columns {
        if add_separator {
            sb.push_str(", ");
        }
        sb.push_str(column.name);
        add_separator = true;
    }
}

pub fn read_ps(table: &Table, transaction: bool, level: usize) -> String {
    let mut sb = String::from("select capture_time");
    for column in table.columns {
        sb.push_str(", ");
        sb.push_str(column.name);
    }
    sb.push_str(" from ");
    sb.push_str(&table_name(table.partial_name, transaction, level));
    sb.push_str(" where agent_rollup = ? and transaction_type = ?");
    if transaction {
        sb.push_str(" and transaction_name = ?");
    }
    sb.push_str(" and capture_time >");
    if table.from_inclusive {
        sb.push('=');
    }
    sb.push_str(" ? and capture_time <= ?");
    sb
}

pub fn read_for_rollup_ps(table: &Table, transaction: bool, level: usize) -> String {
    let mut sb = String::from("select ");
    push_column_names(&mut sb, table.columns);
    sb.push_str(" from ");
    sb.push_str(&table_name(table.partial_name, transaction, level));
    sb.push_str(" where agent_rollup = ? and transaction_type = ?");
    if transaction {
        sb.push_str(" and transaction_name = ?");
    }
    sb.push_str(" and capture_time > ? and capture_time <= ?");
    sb
}

pub fn read_for_rollup_from_child_ps(table: &Table, transaction: bool, level: usize) -> String {
    let mut sb = String::from("select ");
    push_column_names(&mut sb, table.columns);
    sb.push_str(" from ");
    sb.push_str(&table_name(table.partial_name, transaction, level));
    sb.push_str(" where agent_rollup = ? and transaction_type = ?");
    if transaction {
        sb.push_str(" and transaction_name = ?");
    }
    sb.push_str(" and capture_time = ?");
    sb
}

pub fn read_summary_ps(table: &Table, transaction: bool, level: usize) -> String {
    // capture_time is selected so collectors can track the last capture time
    // of the rollup level when merging in recent non-rolled-up data
    let mut sb = String::from("select capture_time");
    if transaction {
        sb.push_str(", transaction_name");
    }
    for column in table.columns {
        sb.push_str(", ");
        sb.push_str(column.name);
    }
    sb.push_str(" from ");
    sb.push_str(&table_name(table.partial_name, transaction, level));
    sb.push_str(" where agent_rollup = ? and transaction_type = ? and capture_time >");
    if table.from_inclusive {
        sb.push('=');
    }
    sb.push_str(" ? and capture_time <= ?");
    sb
}

pub fn read_summary_for_rollup_ps(table: &Table, transaction: bool, level: usize) -> String {
    let mut sb = String::from("select ");
    if transaction {
        sb.push_str("transaction_name, ");
    }
    push_column_names(&mut sb, table.columns);
    sb.push_str(" from ");
    sb.push_str(&table_name(table.partial_name, transaction, level));
    sb.push_str(" where agent_rollup = ? and transaction_type = ? and capture_time > ?");
    sb.push_str(" and capture_time <= ?");
    sb
}

pub fn read_summary_for_rollup_from_child_ps(
    table: &Table,
    transaction: bool,
    level: usize,
) -> String {
    let mut sb = String::from("select ");
    if transaction {
        sb.push_str("transaction_name, ");
    }
    push_column_names(&mut sb, table.columns);
    sb.push_str(" from ");
    sb.push_str(&table_name(table.partial_name, transaction, level));
    sb.push_str(" where agent_rollup = ? and transaction_type = ? and capture_time = ?");
    sb
}

pub fn exists_ps(table: &Table, transaction: bool, level: usize) -> String {
    let mut sb = String::from("select agent_rollup from ");
    sb.push_str(&table_name(table.partial_name, transaction, level));
    sb.push_str(" where agent_rollup = ? and transaction_type = ?");
    if transaction {
        sb.push_str(" and transaction_name = ?");
    }
    sb.push_str(" and capture_time >");
    if table.from_inclusive {
        sb.push('=');
    }
    sb.push_str(" ? and capture_time <= ? limit 1");
    sb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name() {
        assert_eq!(
            table_name("summary", false, 0),
            "aggregate_tt_summary_rollup_0"
        );
        assert_eq!(table_name("query", true, 3), "aggregate_tn_query_rollup_3");
    }

    #[test]
    fn test_create_table_query_with_cluster_keys() {
        assert_eq!(
            create_table_query(&QUERY, true, 1),
            "create table if not exists aggregate_tn_query_rollup_1 \
             (agent_rollup varchar, transaction_type varchar, transaction_name varchar, \
             capture_time timestamp, query_type varchar, truncated_query_text varchar, \
             full_query_text_sha1 varchar, total_duration_nanos double, \
             execution_count bigint, total_rows bigint, \
             primary key ((agent_rollup, transaction_type, transaction_name), \
             capture_time, query_type, truncated_query_text, full_query_text_sha1))"
        );
    }

    #[test]
    fn test_create_summary_table_partition_excludes_transaction_name() {
        let ddl = create_summary_table_query(&SUMMARY, true, 0);
        assert!(ddl.contains("primary key ((agent_rollup, transaction_type), capture_time, transaction_name)"));
    }

    #[test]
    fn test_insert_ps_bind_order() {
        assert_eq!(
            insert_ps(&THROUGHPUT, false, 2),
            "insert into aggregate_tt_throughput_rollup_2 \
             (agent_rollup, transaction_type, capture_time, transaction_count) \
             values (?, ?, ?, ?) using ttl ?"
        );
        // summary transaction inserts put transaction_name after capture_time,
        // matching the clustering order
        assert_eq!(
            insert_summary_ps(&SUMMARY, true, 0),
            "insert into aggregate_tn_summary_rollup_0 \
             (agent_rollup, transaction_type, capture_time, transaction_name, \
             total_duration_nanos, transaction_count) \
             values (?, ?, ?, ?, ?, ?) using ttl ?"
        );
    }

    #[test]
    fn test_read_lower_bound_inclusivity() {
        // overview UI reads are inclusive, summary UI reads exclusive
        assert!(read_ps(&OVERVIEW, false, 0).contains("capture_time >= ?"));
        assert!(read_summary_ps(&SUMMARY, false, 0).contains("capture_time > ?"));
        // rollup reads are always exclusive regardless of from_inclusive
        assert!(read_for_rollup_ps(&OVERVIEW, false, 0).contains("capture_time > ?"));
        assert!(read_summary_for_rollup_ps(&SUMMARY, true, 0).contains("capture_time > ?"));
    }

    #[test]
    fn test_exists_ps_has_limit() {
        let ps = exists_ps(&MAIN_THREAD_PROFILE, true, 1);
        assert!(ps.ends_with("limit 1"));
        assert!(ps.starts_with("select agent_rollup from aggregate_tn_main_thread_profile_rollup_1"));
    }

    #[test]
    fn test_catalog_shape() {
        assert_eq!(ALL_TABLES.len(), 9);
        let summaries: Vec<_> = ALL_TABLES.iter().filter(|t| t.summary).collect();
        assert_eq!(summaries.len(), 2);
        // clustering keys only exist on query/service_call
        for table in ALL_TABLES {
            if !table.cluster_keys.is_empty() {
                assert!(matches!(table.partial_name, "query" | "service_call"));
            }
        }
    }
}
