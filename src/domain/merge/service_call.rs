//! Per-service-call rollup collection, capped like queries but without the
//! full-text indirection (service call texts are short)

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct MutableServiceCall {
    pub text: String,
    pub total_duration_nanos: f64,
    pub execution_count: i64,
}

#[derive(Debug)]
pub struct ServiceCallCollector {
    limit_per_type: usize,
    service_calls: HashMap<String, HashMap<String, MutableServiceCall>>,
    last_capture_time: i64,
}

impl ServiceCallCollector {
    pub fn new(limit_per_type: usize) -> Self {
        Self {
            limit_per_type,
            service_calls: HashMap::new(),
            last_capture_time: 0,
        }
    }

    pub fn merge_service_call(
        &mut self,
        service_call_type: &str,
        text: &str,
        total_duration_nanos: f64,
        execution_count: i64,
    ) {
        let service_call = self
            .service_calls
            .entry(service_call_type.to_string())
            .or_default()
            .entry(text.to_string())
            .or_insert_with(|| MutableServiceCall {
                text: text.to_string(),
                total_duration_nanos: 0.0,
                execution_count: 0,
            });
        service_call.total_duration_nanos += total_duration_nanos;
        service_call.execution_count += execution_count;
    }

    pub fn update_last_capture_time(&mut self, capture_time: i64) {
        self.last_capture_time = self.last_capture_time.max(capture_time);
    }

    pub fn last_capture_time(&self) -> i64 {
        self.last_capture_time
    }

    pub fn is_empty(&self) -> bool {
        self.service_calls.is_empty()
    }

    /// Per-type results, highest total duration first, capped to the limit
    pub fn sorted_and_capped(&self) -> BTreeMap<String, Vec<MutableServiceCall>> {
        let mut result = BTreeMap::new();
        for (service_call_type, service_calls) in &self.service_calls {
            let mut list: Vec<MutableServiceCall> = service_calls.values().cloned().collect();
            list.sort_by(|a, b| {
                b.total_duration_nanos
                    .partial_cmp(&a.total_duration_nanos)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.text.cmp(&b.text))
            });
            list.truncate(self.limit_per_type);
            result.insert(service_call_type.clone(), list);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sums_by_type_and_text() {
        let mut collector = ServiceCallCollector::new(10);
        collector.merge_service_call("HTTP", "GET /api/users", 500.0, 2);
        collector.merge_service_call("HTTP", "GET /api/users", 250.0, 1);
        collector.merge_service_call("GRPC", "Users/List", 100.0, 1);
        let result = collector.sorted_and_capped();
        assert_eq!(result["HTTP"][0].total_duration_nanos, 750.0);
        assert_eq!(result["HTTP"][0].execution_count, 3);
        assert_eq!(result["GRPC"].len(), 1);
    }

    #[test]
    fn test_caps_per_type() {
        let mut collector = ServiceCallCollector::new(3);
        for i in 0..8 {
            collector.merge_service_call("HTTP", &format!("call-{}", i), i as f64, 1);
        }
        let result = collector.sorted_and_capped();
        assert_eq!(result["HTTP"].len(), 3);
        assert_eq!(result["HTTP"][0].total_duration_nanos, 7.0);
    }
}
