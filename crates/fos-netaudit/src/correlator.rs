//! Protocol Correlator
//!
//! Joins "response observed" and "load finished" events on their request id
//! and turns the pair into a URL-keyed record update.

use std::collections::HashMap;

use crate::AuditError;
use crate::config::AuditConfig;
use crate::protocol::{LoadFinished, ProtocolResponse, ResponseObserved};
use crate::record::ResourcePatch;

/// Pending responses waiting for their load to finish
#[derive(Debug)]
pub struct ProtocolCorrelator {
    responses: HashMap<String, ProtocolResponse>,
    config: AuditConfig,
}

impl ProtocolCorrelator {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            responses: HashMap::new(),
            config: config.clone(),
        }
    }

    /// Remember a response until its load completes
    pub fn observe_response(&mut self, event: ResponseObserved) {
        self.responses.insert(event.request_id, event.response);
    }

    /// Resolve a finished load into a record update.
    ///
    /// Returns `Ok(None)` for excluded protocols (inline `data` resources)
    /// and `OrderingViolation` when the request id was never observed.
    pub fn finish_loading(&mut self, event: &LoadFinished) -> Result<Option<ResourcePatch>, AuditError> {
        let response = self.responses.remove(&event.request_id).ok_or_else(|| {
            AuditError::OrderingViolation { request_id: event.request_id.clone() }
        })?;

        if self.config.is_excluded_protocol(&response.protocol) {
            tracing::debug!("Skipping {} resource {}", response.protocol, response.url);
            return Ok(None);
        }

        Ok(Some(build_patch(&response, event.encoded_data_length)))
    }

    /// Number of responses still waiting for a load event
    pub fn pending(&self) -> usize {
        self.responses.len()
    }

    /// Forget every pending response, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.responses.len();
        self.responses.clear();
        dropped
    }
}

fn build_patch(response: &ProtocolResponse, wire_length: f64) -> ResourcePatch {
    let declared = response.headers.content_length();
    // The protocol reports whole bytes as a float
    let wire = wire_length.max(0.0) as i64;

    ResourcePatch {
        url: response.url.clone(),
        status: Some(response.status),
        mime_type: Some(response.mime_type.clone()),
        content_encoding: Some(response.content_encoding().to_string()),
        response_header_size: declared
            .and_then(|d| i64::try_from(d).ok())
            .and_then(|d| wire.checked_sub(d)),
        encoded_data_length: declared,
        from_cache: Some(response.from_cache()),
        cache_control: response.cache_control().map(str::to_string),
        protocol: Some(response.protocol.clone()),
        security_state: response.security_state.clone(),
        security_protocole: response.security_protocol().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Headers, SecurityDetails};

    fn observed(id: &str, response: ProtocolResponse) -> ResponseObserved {
        ResponseObserved { request_id: id.to_string(), response }
    }

    fn finished(id: &str, wire: f64) -> LoadFinished {
        LoadFinished { request_id: id.to_string(), encoded_data_length: wire }
    }

    #[test]
    fn test_correlates_by_request_id() {
        let mut correlator = ProtocolCorrelator::new(&AuditConfig::default());
        let mut response = ProtocolResponse::new("https://a.test/app.js", 200, "h2");
        response.mime_type = "application/javascript".into();
        response.headers = Headers::new()
            .with("content-encoding", "gzip")
            .with("Content-Length", "900")
            .with("cache-control", "max-age=600");
        response.security_state = Some("secure".into());
        response.security_details = Some(SecurityDetails { protocol: Some("TLS 1.3".into()) });
        response.from_disk_cache = true;

        correlator.observe_response(observed("r1", response));
        assert_eq!(correlator.pending(), 1);

        let patch = correlator.finish_loading(&finished("r1", 1200.0)).unwrap().unwrap();
        assert_eq!(correlator.pending(), 0);
        assert_eq!(patch.url, "https://a.test/app.js");
        assert_eq!(patch.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(patch.encoded_data_length, Some(900));
        assert_eq!(patch.response_header_size, Some(300));
        assert_eq!(patch.cache_control.as_deref(), Some("max-age=600"));
        assert_eq!(patch.from_cache, Some(true));
        assert_eq!(patch.security_protocole.as_deref(), Some("TLS 1.3"));
    }

    #[test]
    fn test_data_protocol_skipped() {
        let mut correlator = ProtocolCorrelator::new(&AuditConfig::default());
        correlator.observe_response(observed("d1", ProtocolResponse::new("data:image/png;base64,AAAA", 200, "data")));
        assert_eq!(correlator.finish_loading(&finished("d1", 0.0)).unwrap(), None);
    }

    #[test]
    fn test_unknown_request_id() {
        let mut correlator = ProtocolCorrelator::new(&AuditConfig::default());
        let result = correlator.finish_loading(&finished("ghost", 10.0));
        assert!(matches!(result, Err(AuditError::OrderingViolation { ref request_id }) if request_id == "ghost"));
    }

    #[test]
    fn test_missing_content_length() {
        let mut correlator = ProtocolCorrelator::new(&AuditConfig::default());
        correlator.observe_response(observed("r2", ProtocolResponse::new("https://a.test/", 200, "http/1.1")));
        let patch = correlator.finish_loading(&finished("r2", 512.0)).unwrap().unwrap();
        assert_eq!(patch.encoded_data_length, None);
        assert_eq!(patch.response_header_size, None);
        assert_eq!(patch.content_encoding.as_deref(), Some(""));
    }

    #[test]
    fn test_same_url_retried() {
        let mut correlator = ProtocolCorrelator::new(&AuditConfig::default());
        correlator.observe_response(observed("a", ProtocolResponse::new("https://a.test/x", 503, "h2")));
        correlator.observe_response(observed("b", ProtocolResponse::new("https://a.test/x", 200, "h2")));
        let first = correlator.finish_loading(&finished("a", 10.0)).unwrap().unwrap();
        let second = correlator.finish_loading(&finished("b", 10.0)).unwrap().unwrap();
        assert_eq!(first.status, Some(503));
        assert_eq!(second.status, Some(200));
    }

    #[test]
    fn test_oversized_content_length() {
        let mut correlator = ProtocolCorrelator::new(&AuditConfig::default());
        let mut response = ProtocolResponse::new("https://a.test/huge", 200, "h2");
        response.headers = Headers::new().with("Content-Length", "9223372036854775808");
        correlator.observe_response(observed("big", response));
        let patch = correlator.finish_loading(&finished("big", 10.0)).unwrap().unwrap();
        assert_eq!(patch.encoded_data_length, Some(9223372036854775808));
        assert_eq!(patch.response_header_size, None);
    }

    #[test]
    fn test_configured_exclusions() {
        let config = AuditConfig { excluded_protocols: vec!["blob".into()], ..Default::default() };
        let mut correlator = ProtocolCorrelator::new(&config);
        correlator.observe_response(observed("b1", ProtocolResponse::new("blob:https://a.test/1", 200, "blob")));
        correlator.observe_response(observed("d1", ProtocolResponse::new("data:text/plain,hi", 200, "data")));
        assert_eq!(correlator.finish_loading(&finished("b1", 0.0)).unwrap(), None);
        assert!(correlator.finish_loading(&finished("d1", 0.0)).unwrap().is_some());
    }

    #[test]
    fn test_clear_pending() {
        let mut correlator = ProtocolCorrelator::new(&AuditConfig::default());
        correlator.observe_response(observed("1", ProtocolResponse::new("https://a.test/", 200, "h2")));
        correlator.observe_response(observed("2", ProtocolResponse::new("https://a.test/x", 200, "h2")));
        assert_eq!(correlator.clear(), 2);
        assert_eq!(correlator.pending(), 0);
        assert!(correlator.finish_loading(&finished("1", 10.0)).is_err());
    }
}
