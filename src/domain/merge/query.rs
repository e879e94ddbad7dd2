//! Per-query rollup collection with top-N capping
//!
//! Queries group by (type, truncated text, full-text sha1). Durations and
//! execution counts sum; total_rows uses flag-OR semantics — the merged flag
//! is set once any input reports row counts, and only reported values sum.
//! Output is capped to the N highest total durations per query type, so the
//! cap is approximate across levels: a query just under the cap at one level
//! can drop out of the next, but never reappear from nowhere.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct MutableQuery {
    pub truncated_text: String,
    /// None when `truncated_text` holds the entire query text
    pub full_text_sha1: Option<String>,
    pub total_duration_nanos: f64,
    pub execution_count: i64,
    pub has_total_rows: bool,
    pub total_rows: i64,
}

impl MutableQuery {
    fn new(truncated_text: &str, full_text_sha1: Option<&str>) -> Self {
        Self {
            truncated_text: truncated_text.to_string(),
            full_text_sha1: full_text_sha1.map(str::to_string),
            total_duration_nanos: 0.0,
            execution_count: 0,
            has_total_rows: false,
            total_rows: 0,
        }
    }

    fn add_to_total_rows(&mut self, has_total_rows: bool, total_rows: i64) {
        if has_total_rows {
            self.has_total_rows = true;
            self.total_rows += total_rows;
        }
    }
}

#[derive(Debug)]
pub struct QueryCollector {
    limit_per_type: usize,
    queries: HashMap<String, HashMap<(String, Option<String>), MutableQuery>>,
    last_capture_time: i64,
}

impl QueryCollector {
    pub fn new(limit_per_type: usize) -> Self {
        Self {
            limit_per_type,
            queries: HashMap::new(),
            last_capture_time: 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn merge_query(
        &mut self,
        query_type: &str,
        truncated_text: &str,
        full_text_sha1: Option<&str>,
        total_duration_nanos: f64,
        execution_count: i64,
        has_total_rows: bool,
        total_rows: i64,
    ) {
        let query = self
            .queries
            .entry(query_type.to_string())
            .or_default()
            .entry((truncated_text.to_string(), full_text_sha1.map(str::to_string)))
            .or_insert_with(|| MutableQuery::new(truncated_text, full_text_sha1));
        query.total_duration_nanos += total_duration_nanos;
        query.execution_count += execution_count;
        query.add_to_total_rows(has_total_rows, total_rows);
    }

    pub fn update_last_capture_time(&mut self, capture_time: i64) {
        self.last_capture_time = self.last_capture_time.max(capture_time);
    }

    pub fn last_capture_time(&self) -> i64 {
        self.last_capture_time
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Per-type results, highest total duration first, capped to the limit
    pub fn sorted_and_capped(&self) -> BTreeMap<String, Vec<MutableQuery>> {
        let mut result = BTreeMap::new();
        for (query_type, queries) in &self.queries {
            let mut list: Vec<MutableQuery> = queries.values().cloned().collect();
            list.sort_by(|a, b| {
                b.total_duration_nanos
                    .partial_cmp(&a.total_duration_nanos)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.truncated_text.cmp(&b.truncated_text))
            });
            list.truncate(self.limit_per_type);
            result.insert(query_type.clone(), list);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_by_type_text_and_sha1() {
        let mut collector = QueryCollector::new(10);
        collector.merge_query("SQL", "select 1", None, 100.0, 1, false, 0);
        collector.merge_query("SQL", "select 1", None, 50.0, 2, false, 0);
        collector.merge_query("SQL", "select 1", Some("abc"), 25.0, 1, false, 0);
        collector.merge_query("HTTP", "select 1", None, 10.0, 1, false, 0);

        let result = collector.sorted_and_capped();
        assert_eq!(result["SQL"].len(), 2);
        assert_eq!(result["HTTP"].len(), 1);
        let merged = &result["SQL"][0];
        assert_eq!(merged.total_duration_nanos, 150.0);
        assert_eq!(merged.execution_count, 3);
    }

    #[test]
    fn test_total_rows_flag_or_semantics() {
        let mut collector = QueryCollector::new(10);
        collector.merge_query("SQL", "q", None, 1.0, 1, false, 0);
        collector.merge_query("SQL", "q", None, 1.0, 1, true, 7);
        collector.merge_query("SQL", "q", None, 1.0, 1, true, 3);
        let result = collector.sorted_and_capped();
        let query = &result["SQL"][0];
        assert!(query.has_total_rows);
        assert_eq!(query.total_rows, 10);

        let mut never = QueryCollector::new(10);
        never.merge_query("SQL", "q", None, 1.0, 1, false, 0);
        assert!(!never.sorted_and_capped()["SQL"][0].has_total_rows);
    }

    #[test]
    fn test_caps_to_top_n_by_duration() {
        let mut collector = QueryCollector::new(10);
        for duration in 1..=15 {
            collector.merge_query(
                "SQL",
                &format!("query-{:02}", duration),
                None,
                duration as f64,
                1,
                false,
                0,
            );
        }
        let result = collector.sorted_and_capped();
        let kept = &result["SQL"];
        assert_eq!(kept.len(), 10);
        assert_eq!(kept[0].total_duration_nanos, 15.0);
        assert_eq!(kept[9].total_duration_nanos, 6.0);
    }

    #[test]
    fn test_capped_result_is_subset_of_inputs() {
        let inputs: Vec<String> = (0..25).map(|i| format!("query-{}", i)).collect();
        let mut collector = QueryCollector::new(5);
        for (i, text) in inputs.iter().enumerate() {
            collector.merge_query("SQL", text, None, i as f64, 1, false, 0);
        }
        for query in &collector.sorted_and_capped()["SQL"] {
            assert!(inputs.contains(&query.truncated_text));
        }
    }
}
