//! Summary and error-summary reductions
//!
//! The store cannot aggregate, so group-by, sort, and limit for the summary
//! kinds all happen here. Collectors track the last capture time they saw so
//! callers can splice in live (not yet rolled up) data.

use std::collections::HashMap;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MutableSummary {
    pub total_duration_nanos: f64,
    pub transaction_count: i64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MutableErrorSummary {
    pub error_count: i64,
    pub transaction_count: i64,
}

// =============================================================================
// Overall Collectors
// =============================================================================

#[derive(Debug, Default)]
pub struct OverallSummaryCollector {
    summary: MutableSummary,
    last_capture_time: i64,
}

impl OverallSummaryCollector {
    pub fn merge_summary(
        &mut self,
        total_duration_nanos: f64,
        transaction_count: i64,
        capture_time: i64,
    ) {
        self.summary.total_duration_nanos += total_duration_nanos;
        self.summary.transaction_count += transaction_count;
        self.last_capture_time = self.last_capture_time.max(capture_time);
    }

    pub fn summary(&self) -> MutableSummary {
        self.summary
    }

    pub fn last_capture_time(&self) -> i64 {
        self.last_capture_time
    }
}

#[derive(Debug, Default)]
pub struct OverallErrorSummaryCollector {
    summary: MutableErrorSummary,
    last_capture_time: i64,
}

impl OverallErrorSummaryCollector {
    pub fn merge_error_summary(
        &mut self,
        error_count: i64,
        transaction_count: i64,
        capture_time: i64,
    ) {
        self.summary.error_count += error_count;
        self.summary.transaction_count += transaction_count;
        self.last_capture_time = self.last_capture_time.max(capture_time);
    }

    pub fn summary(&self) -> MutableErrorSummary {
        self.summary
    }

    pub fn last_capture_time(&self) -> i64 {
        self.last_capture_time
    }
}

// =============================================================================
// Per-Transaction Collectors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarySortOrder {
    TotalTime,
    AverageTime,
    Throughput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionSummary {
    pub transaction_name: String,
    pub total_duration_nanos: f64,
    pub transaction_count: i64,
}

#[derive(Debug, Default)]
pub struct TransactionSummaryCollector {
    summaries: HashMap<String, MutableSummary>,
    last_capture_time: i64,
}

impl TransactionSummaryCollector {
    pub fn collect(
        &mut self,
        transaction_name: &str,
        total_duration_nanos: f64,
        transaction_count: i64,
        capture_time: i64,
    ) {
        let summary = self
            .summaries
            .entry(transaction_name.to_string())
            .or_default();
        summary.total_duration_nanos += total_duration_nanos;
        summary.transaction_count += transaction_count;
        self.last_capture_time = self.last_capture_time.max(capture_time);
    }

    pub fn last_capture_time(&self) -> i64 {
        self.last_capture_time
    }

    /// Sorted, limited result; ties resolve by name for a stable order
    pub fn result(&self, sort_order: SummarySortOrder, limit: usize) -> Vec<TransactionSummary> {
        let mut result: Vec<TransactionSummary> = self
            .summaries
            .iter()
            .map(|(name, summary)| TransactionSummary {
                transaction_name: name.clone(),
                total_duration_nanos: summary.total_duration_nanos,
                transaction_count: summary.transaction_count,
            })
            .collect();
        result.sort_by(|a, b| {
            let key = |s: &TransactionSummary| match sort_order {
                SummarySortOrder::TotalTime => s.total_duration_nanos,
                SummarySortOrder::AverageTime => {
                    if s.transaction_count == 0 {
                        0.0
                    } else {
                        s.total_duration_nanos / s.transaction_count as f64
                    }
                }
                SummarySortOrder::Throughput => s.transaction_count as f64,
            };
            key(b)
                .partial_cmp(&key(a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.transaction_name.cmp(&b.transaction_name))
        });
        result.truncate(limit);
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSummarySortOrder {
    ErrorCount,
    ErrorRate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionErrorSummary {
    pub transaction_name: String,
    pub error_count: i64,
    pub transaction_count: i64,
}

#[derive(Debug, Default)]
pub struct TransactionErrorSummaryCollector {
    summaries: HashMap<String, MutableErrorSummary>,
    last_capture_time: i64,
}

impl TransactionErrorSummaryCollector {
    pub fn collect(
        &mut self,
        transaction_name: &str,
        error_count: i64,
        transaction_count: i64,
        capture_time: i64,
    ) {
        let summary = self
            .summaries
            .entry(transaction_name.to_string())
            .or_default();
        summary.error_count += error_count;
        summary.transaction_count += transaction_count;
        self.last_capture_time = self.last_capture_time.max(capture_time);
    }

    pub fn last_capture_time(&self) -> i64 {
        self.last_capture_time
    }

    pub fn result(
        &self,
        sort_order: ErrorSummarySortOrder,
        limit: usize,
    ) -> Vec<TransactionErrorSummary> {
        let mut result: Vec<TransactionErrorSummary> = self
            .summaries
            .iter()
            .filter(|(_, summary)| summary.error_count > 0)
            .map(|(name, summary)| TransactionErrorSummary {
                transaction_name: name.clone(),
                error_count: summary.error_count,
                transaction_count: summary.transaction_count,
            })
            .collect();
        result.sort_by(|a, b| {
            let key = |s: &TransactionErrorSummary| match sort_order {
                ErrorSummarySortOrder::ErrorCount => s.error_count as f64,
                ErrorSummarySortOrder::ErrorRate => {
                    if s.transaction_count == 0 {
                        0.0
                    } else {
                        s.error_count as f64 / s.transaction_count as f64
                    }
                }
            };
            key(b)
                .partial_cmp(&key(a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.transaction_name.cmp(&b.transaction_name))
        });
        result.truncate(limit);
        result
    }
}
