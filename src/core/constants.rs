// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "perfhub";

/// Environment variable overriding the config file path
pub const ENV_CONFIG: &str = "PERFHUB_CENTRAL_CONFIG";

// =============================================================================
// Rollup Defaults
// =============================================================================

/// Default rollup intervals in milliseconds, one per level.
///
/// Level 0 is the raw per-minute capture interval; higher levels are
/// progressively coarser. Each interval must be a multiple of the previous.
pub const DEFAULT_ROLLUP_INTERVALS_MILLIS: [i64; 4] =
    [60_000, 300_000, 1_800_000, 14_400_000];

/// Default per-level retention in hours (2 weeks, 2 weeks, 2 months, 2 years)
pub const DEFAULT_ROLLUP_EXPIRATION_HOURS: [i64; 4] = [336, 336, 1440, 17520];

// =============================================================================
// Aggregate Limits
// =============================================================================

/// Query texts longer than this are truncated in aggregate rows; the full
/// text moves to the side table keyed by its SHA-1.
pub const DEFAULT_QUERY_TEXT_TRUNCATE: usize = 120;

/// Default cap on distinct queries kept per query type in a rollup bucket
pub const DEFAULT_MAX_QUERY_AGGREGATES_PER_TYPE: usize = 500;

/// Default cap on distinct service calls kept per type in a rollup bucket
pub const DEFAULT_MAX_SERVICE_CALL_AGGREGATES_PER_TYPE: usize = 500;

// =============================================================================
// Work Queue
// =============================================================================

/// gc_grace_seconds for the needs-rollup work-queue tables (3 hours, matching
/// the store's default hint window so resurrected rows only produce extra
/// idempotent work)
pub const NEEDS_ROLLUP_GC_GRACE_SECONDS: i64 = 10_800;

/// Safety margin subtracted from the work-queue TTL on top of the largest
/// rollup interval, so consumed entries always find their source rows alive
pub const NEEDS_ROLLUP_TTL_SLACK_SECONDS: i64 = 3_600;

/// Floor for every computed TTL, in seconds
pub const MIN_TTL_SECONDS: i64 = 60;

// =============================================================================
// Scheduler Defaults
// =============================================================================

/// Default delay between rollup passes over all agent rollups
pub const DEFAULT_ROLLUP_PASS_INTERVAL_SECS: u64 = 30;

/// Default number of concurrently running per-agent rollup tasks
pub const DEFAULT_ROLLUP_WORKERS: usize = 4;
