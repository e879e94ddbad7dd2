//! Streaming duration histogram
//!
//! Small buckets keep their raw values; once the raw list outgrows the HDR
//! representation the histogram flips to an HDR-encoded form and stays there.
//! The wire message carries whichever representation is active, so merging
//! must accept both.

use hdrhistogram::Histogram;
use hdrhistogram::serialization::{Deserializer, Serializer, V2Serializer};

use crate::data::error::StoreError;
use crate::domain::wire;

/// Raw values are kept until this many, matching the break-even point with
/// the HDR encoding
const RAW_VALUE_LIMIT: usize = 1024;

/// Two significant digits keeps percentile error under 1%
const SIGNIFICANT_DIGITS: u8 = 2;

#[derive(Clone)]
pub struct LazyHistogram {
    raw_values: Vec<i64>,
    histogram: Option<Histogram<u64>>,
}

impl Default for LazyHistogram {
    fn default() -> Self {
        Self {
            raw_values: Vec::new(),
            histogram: None,
        }
    }
}

impl LazyHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value_nanos: i64) {
        match &mut self.histogram {
            Some(histogram) => record(histogram, value_nanos),
            None => {
                self.raw_values.push(value_nanos);
                if self.raw_values.len() > RAW_VALUE_LIMIT {
                    self.convert_to_hdr();
                }
            }
        }
    }

    /// Merge a stored histogram blob into this one
    pub fn merge(&mut self, proto: &wire::Histogram) -> Result<(), StoreError> {
        for &value in &proto.ordered_raw_values {
            self.add(value);
        }
        if !proto.encoded_bytes.is_empty() {
            let mut cursor = std::io::Cursor::new(&proto.encoded_bytes);
            let decoded: Histogram<u64> = Deserializer::new()
                .deserialize(&mut cursor)
                .map_err(|e| StoreError::Decode(format!("hdr histogram: {}", e)))?;
            if self.histogram.is_none() {
                self.convert_to_hdr();
            }
            let histogram = self.histogram.as_mut().expect("converted above");
            histogram
                .add(&decoded)
                .map_err(|e| StoreError::Decode(format!("hdr histogram add: {}", e)))?;
        }
        Ok(())
    }

    pub fn count(&self) -> u64 {
        match &self.histogram {
            Some(histogram) => histogram.len(),
            None => self.raw_values.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn value_at_percentile(&self, percentile: f64) -> i64 {
        match &self.histogram {
            Some(histogram) => histogram.value_at_quantile(percentile / 100.0) as i64,
            None => {
                if self.raw_values.is_empty() {
                    return 0;
                }
                let mut sorted = self.raw_values.clone();
                sorted.sort_unstable();
                let index = ((percentile / 100.0 * sorted.len() as f64).ceil() as usize)
                    .saturating_sub(1)
                    .min(sorted.len() - 1);
                sorted[index]
            }
        }
    }

    pub fn to_proto(&self) -> Result<wire::Histogram, StoreError> {
        match &self.histogram {
            Some(histogram) => {
                let mut encoded_bytes = Vec::new();
                V2Serializer::new()
                    .serialize(histogram, &mut encoded_bytes)
                    .map_err(|e| StoreError::Decode(format!("hdr histogram encode: {}", e)))?;
                Ok(wire::Histogram {
                    ordered_raw_values: Vec::new(),
                    encoded_bytes,
                })
            }
            None => {
                let mut ordered_raw_values = self.raw_values.clone();
                ordered_raw_values.sort_unstable();
                Ok(wire::Histogram {
                    ordered_raw_values,
                    encoded_bytes: Vec::new(),
                })
            }
        }
    }

    fn convert_to_hdr(&mut self) {
        let mut histogram =
            Histogram::<u64>::new(SIGNIFICANT_DIGITS).expect("valid significant digits");
        for &value in &self.raw_values {
            record(&mut histogram, value);
        }
        self.raw_values.clear();
        self.histogram = Some(histogram);
    }
}

fn record(histogram: &mut Histogram<u64>, value_nanos: i64) {
    // auto-resizing histogram only rejects values it cannot represent at all
    let value = value_nanos.max(0) as u64;
    if let Err(e) = histogram.record(value) {
        tracing::warn!(value, error = %e, "Dropping unrecordable histogram value");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_merge_preserves_exact_percentiles() {
        let mut histogram = LazyHistogram::new();
        for value in [100, 200, 300, 400, 500] {
            histogram.add(value);
        }
        assert_eq!(histogram.count(), 5);
        assert_eq!(histogram.value_at_percentile(50.0), 300);
        assert_eq!(histogram.value_at_percentile(100.0), 500);
    }

    #[test]
    fn test_roundtrip_stays_raw_below_limit() {
        let mut histogram = LazyHistogram::new();
        for value in [30, 10, 20] {
            histogram.add(value);
        }
        let proto = histogram.to_proto().unwrap();
        assert_eq!(proto.ordered_raw_values, vec![10, 20, 30]);
        assert!(proto.encoded_bytes.is_empty());
    }

    #[test]
    fn test_converts_to_hdr_above_limit() {
        let mut histogram = LazyHistogram::new();
        for value in 0..=RAW_VALUE_LIMIT as i64 {
            histogram.add(value * 1_000);
        }
        let proto = histogram.to_proto().unwrap();
        assert!(proto.ordered_raw_values.is_empty());
        assert!(!proto.encoded_bytes.is_empty());
        assert_eq!(histogram.count(), RAW_VALUE_LIMIT as u64 + 1);
    }

    #[test]
    fn test_merge_raw_into_hdr_and_back() {
        let mut big = LazyHistogram::new();
        for value in 0..2_000i64 {
            big.add(value * 1_000);
        }
        let big_proto = big.to_proto().unwrap();

        let mut small = LazyHistogram::new();
        small.add(50_000);

        let mut merged = LazyHistogram::new();
        merged.merge(&small.to_proto().unwrap()).unwrap();
        merged.merge(&big_proto).unwrap();
        assert_eq!(merged.count(), 2_001);

        // sum is preserved through a re-encode cycle
        let reencoded = merged.to_proto().unwrap();
        let mut again = LazyHistogram::new();
        again.merge(&reencoded).unwrap();
        assert_eq!(again.count(), 2_001);
    }

    #[test]
    fn test_percentile_error_is_bounded_after_conversion() {
        let mut histogram = LazyHistogram::new();
        for value in 1..=10_000i64 {
            histogram.add(value);
        }
        let p50 = histogram.value_at_percentile(50.0);
        assert!((p50 - 5_000).abs() <= 5_000 / 100 + 1, "p50 was {}", p50);
    }
}
