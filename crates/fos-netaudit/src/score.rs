//! Aggregate Scorer
//!
//! Reduces the merged records of one context to six summary metrics.

use serde::Serialize;

use crate::record::ResourceRecord;

/// Summary metrics of one context. Ratios are in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub nb: usize,
    pub ratio_cache_controle: f64,
    pub ratio_http2: f64,
    pub secure: f64,
    /// Count, not a ratio
    pub bad_encoded: usize,
    pub encoded: f64,
}

impl AnalysisSummary {
    /// Score a set of merged records. An empty set scores zero everywhere.
    pub fn from_records(records: &[ResourceRecord]) -> Self {
        let nb = records.len();
        if nb == 0 {
            return Self::default();
        }

        let count = |pred: fn(&ResourceRecord) -> bool| records.iter().filter(|r| pred(r)).count();
        let ratio = |n: usize| n as f64 / nb as f64;

        Self {
            nb,
            ratio_cache_controle: ratio(count(ResourceRecord::has_cache_lifetime)),
            ratio_http2: ratio(count(ResourceRecord::is_http2)),
            secure: ratio(count(ResourceRecord::is_secure)),
            bad_encoded: count(ResourceRecord::is_badly_encoded),
            encoded: ratio(count(ResourceRecord::is_encoded)),
        }
    }
}

/// Summary row for one (page, context) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub url: String,
    pub context: String,
    #[serde(flatten)]
    pub summary: AnalysisSummary,
}

impl AnalysisResult {
    pub fn new(url: &str, context: &str, records: &[ResourceRecord]) -> Self {
        Self {
            url: url.to_string(),
            context: context.to_string(),
            summary: AnalysisSummary::from_records(records),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        cache_control: Option<&str>,
        protocol: &str,
        security_state: &str,
        content_encoding: &str,
        encoded: u64,
        decoded: u64,
    ) -> ResourceRecord {
        ResourceRecord {
            url: format!("https://a.test/{}", encoded),
            cache_control: cache_control.map(str::to_string),
            protocol: protocol.to_string(),
            security_state: Some(security_state.to_string()),
            content_encoding: content_encoding.to_string(),
            encoded_data_length: Some(encoded),
            decoded_data_length: Some(decoded),
            ..Default::default()
        }
    }

    #[test]
    fn test_four_resources() {
        let records = vec![
            record(Some("max-age=3600"), "h2", "secure", "gzip", 100, 300),
            record(Some("max-age=0"), "http/1.1", "", "", 200, 200),
            record(Some("no-store"), "h2", "secure", "br", 50, 150),
            record(None, "h2", "secure", "", 10, 10),
        ];
        let summary = AnalysisSummary::from_records(&records);
        assert_eq!(summary.nb, 4);
        assert_eq!(summary.ratio_cache_controle, 0.25);
        assert_eq!(summary.ratio_http2, 0.75);
        assert_eq!(summary.secure, 0.75);
        assert_eq!(summary.encoded, 0.5);
        assert_eq!(summary.bad_encoded, 0);
    }

    #[test]
    fn test_empty_is_zero() {
        let summary = AnalysisSummary::from_records(&[]);
        assert_eq!(summary, AnalysisSummary::default());
        assert!(!summary.ratio_http2.is_nan());
        assert!(!summary.encoded.is_nan());
    }

    #[test]
    fn test_bad_encoded_counted() {
        let mut records = vec![
            record(None, "h2", "secure", "gzip", 500, 100),
            record(None, "h2", "secure", "gzip", 500, 100),
        ];
        records[1].decoded_data_length = None;
        let summary = AnalysisSummary::from_records(&records);
        assert_eq!(summary.bad_encoded, 1);
    }

    #[test]
    fn test_result_serializes_flat() {
        let result = AnalysisResult::new("https://a.test/", "home", &[]);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["url"], "https://a.test/");
        assert_eq!(value["context"], "home");
        assert_eq!(value["nb"], 0);
        assert_eq!(value["ratioCacheControle"], 0.0);
        assert_eq!(value["badEncoded"], 0);
    }
}
