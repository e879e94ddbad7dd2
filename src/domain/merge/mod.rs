//! Merge/reduce library
//!
//! Pure, associative, commutative reductions over the aggregate kinds. The
//! rollup engine uses them to fold N source rows into one coarser row; the
//! reader feeds range scans into the same collectors so the UI sees identical
//! semantics for rolled-up and freshly-merged data.

pub mod histogram;
pub mod profile;
pub mod query;
pub mod service_call;
pub mod summary;
pub mod thread_stats;
pub mod timer;

pub use histogram::LazyHistogram;
pub use profile::{MutableProfile, ProfileCollector};
pub use query::{MutableQuery, QueryCollector};
pub use service_call::{MutableServiceCall, ServiceCallCollector};
pub use summary::{
    ErrorSummarySortOrder, MutableErrorSummary, MutableSummary, OverallErrorSummaryCollector,
    OverallSummaryCollector, SummarySortOrder, TransactionErrorSummary,
    TransactionErrorSummaryCollector, TransactionSummary, TransactionSummaryCollector,
};
pub use thread_stats::MutableThreadStats;
pub use timer::MutableTimer;
