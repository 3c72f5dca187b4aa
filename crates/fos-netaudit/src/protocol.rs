//! Protocol Events
//!
//! Typed views of the low-level network events emitted by a browser
//! debugging session. Field names follow the DevTools protocol wire format.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::AuditError;

pub const RESPONSE_RECEIVED: &str = "Network.responseReceived";
pub const LOADING_FINISHED: &str = "Network.loadingFinished";

/// Response headers with tolerant name lookup
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Headers(HashMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.0.insert(name.to_string(), value.to_string());
        self
    }

    /// Look up a header: exact spelling, then lowercase, then the
    /// lexicographically smallest case-insensitive match.
    pub fn get(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.0.get(name) {
            return Some(value.as_str());
        }
        if let Some(value) = self.0.get(&name.to_ascii_lowercase()) {
            return Some(value.as_str());
        }
        self.0.iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, v)| v.as_str())
    }

    /// Declared `Content-Length`, if present and numeric
    pub fn content_length(&self) -> Option<u64> {
        self.get("Content-Length").and_then(|v| v.trim().parse().ok())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// TLS details of a response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityDetails {
    #[serde(default)]
    pub protocol: Option<String>,
}

/// Response payload of a "response observed" event
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolResponse {
    pub url: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub security_state: Option<String>,
    #[serde(default)]
    pub security_details: Option<SecurityDetails>,
    #[serde(default)]
    pub from_disk_cache: bool,
    #[serde(default)]
    pub from_service_worker: bool,
    #[serde(default)]
    pub from_prefetch_cache: bool,
}

impl ProtocolResponse {
    pub fn new(url: &str, status: u16, protocol: &str) -> Self {
        Self {
            url: url.to_string(),
            status,
            protocol: protocol.to_string(),
            ..Default::default()
        }
    }

    /// Served from disk, service worker or prefetch cache
    pub fn from_cache(&self) -> bool {
        self.from_disk_cache || self.from_service_worker || self.from_prefetch_cache
    }

    /// `Content-Encoding` value, empty when uncompressed
    pub fn content_encoding(&self) -> &str {
        self.headers.get("Content-Encoding").unwrap_or("")
    }

    pub fn cache_control(&self) -> Option<&str> {
        self.headers.get("Cache-Control")
    }

    pub fn security_protocol(&self) -> Option<&str> {
        self.security_details.as_ref().and_then(|d| d.protocol.as_deref())
    }
}

/// "Response observed" event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseObserved {
    pub request_id: String,
    pub response: ProtocolResponse,
}

/// "Load finished" event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadFinished {
    pub request_id: String,
    /// Bytes received on the wire, headers included
    #[serde(default)]
    pub encoded_data_length: f64,
}

/// Low-level protocol event
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    ResponseObserved(ResponseObserved),
    LoadFinished(LoadFinished),
}

impl ProtocolEvent {
    /// Decode an event from its protocol method name and params.
    ///
    /// Methods this crate does not consume decode to `None`.
    pub fn from_method(method: &str, params: Value) -> Result<Option<Self>, AuditError> {
        let event = match method {
            RESPONSE_RECEIVED => Self::ResponseObserved(decode(method, params)?),
            LOADING_FINISHED => Self::LoadFinished(decode(method, params)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn request_id(&self) -> &str {
        match self {
            Self::ResponseObserved(e) => &e.request_id,
            Self::LoadFinished(e) => &e.request_id,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(method: &str, params: Value) -> Result<T, AuditError> {
    serde_json::from_value(params)
        .map_err(|e| AuditError::InvalidEvent(format!("{}: {}", method, e)))
}

/// Browser debugging session used to instrument a navigation
#[allow(async_fn_in_trait)]
pub trait ProtocolSession {
    /// Drop everything the browser has cached
    async fn clear_browser_cache(&mut self) -> Result<(), AuditError>;

    /// Start delivering network events
    async fn enable_network(&mut self) -> Result<(), AuditError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_exact_case_preferred() {
        let headers = Headers::new()
            .with("Content-Encoding", "gzip")
            .with("content-encoding", "br");
        assert_eq!(headers.get("Content-Encoding"), Some("gzip"));
        assert_eq!(headers.get("content-encoding"), Some("br"));
    }

    #[test]
    fn test_header_case_insensitive_fallback() {
        let headers = Headers::new().with("CACHE-CONTROL", "max-age=60");
        assert_eq!(headers.get("Cache-Control"), Some("max-age=60"));
        assert_eq!(headers.get("Expires"), None);
    }

    #[test]
    fn test_header_mixed_spellings_resolve_stably() {
        let headers = Headers::new()
            .with("CONTENT-ENCODING", "br")
            .with("Content-encoding", "gzip");
        for _ in 0..16 {
            assert_eq!(headers.clone().get("Content-Encoding"), Some("br"));
        }

        let headers = headers.with("content-encoding", "deflate");
        assert_eq!(headers.get("Content-Encoding"), Some("deflate"));
    }

    #[test]
    fn test_content_length() {
        assert_eq!(Headers::new().with("content-length", " 512 ").content_length(), Some(512));
        assert_eq!(Headers::new().with("Content-Length", "abc").content_length(), None);
        assert_eq!(Headers::new().content_length(), None);
    }

    #[test]
    fn test_decode_response_received() {
        let params = json!({
            "requestId": "1000.1",
            "loaderId": "L1",
            "type": "Document",
            "response": {
                "url": "https://example.com/",
                "status": 200,
                "mimeType": "text/html",
                "headers": {"content-encoding": "br", "Cache-Control": "max-age=60"},
                "protocol": "h2",
                "securityState": "secure",
                "securityDetails": {"protocol": "TLS 1.3", "cipher": "AES_128_GCM"},
                "fromDiskCache": false,
                "fromServiceWorker": true
            }
        });
        let event = ProtocolEvent::from_method(RESPONSE_RECEIVED, params).unwrap().unwrap();
        let ProtocolEvent::ResponseObserved(observed) = event else {
            panic!("expected response event");
        };
        assert_eq!(observed.request_id, "1000.1");
        let response = observed.response;
        assert_eq!(response.content_encoding(), "br");
        assert_eq!(response.cache_control(), Some("max-age=60"));
        assert_eq!(response.security_protocol(), Some("TLS 1.3"));
        assert!(response.from_cache());
    }

    #[test]
    fn test_decode_loading_finished() {
        let params = json!({"requestId": "7", "timestamp": 1.5, "encodedDataLength": 1432.0});
        let event = ProtocolEvent::from_method(LOADING_FINISHED, params).unwrap().unwrap();
        assert_eq!(event.request_id(), "7");
        assert_eq!(event, ProtocolEvent::LoadFinished(LoadFinished {
            request_id: "7".into(),
            encoded_data_length: 1432.0,
        }));
    }

    #[test]
    fn test_unknown_method_ignored() {
        let event = ProtocolEvent::from_method("Network.requestWillBeSent", json!({})).unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn test_malformed_params() {
        let result = ProtocolEvent::from_method(LOADING_FINISHED, json!({"encodedDataLength": 3}));
        assert!(matches!(result, Err(AuditError::InvalidEvent(_))));
    }
}
