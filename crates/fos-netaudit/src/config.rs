//! Audit Configuration

use std::env;
use std::path::Path;

use serde::Deserialize;

use crate::AuditError;

/// Audit configuration options
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Clear the browser cache while arming a navigation
    pub clear_browser_cache: bool,

    /// Response protocols that never produce a record
    pub excluded_protocols: Vec<String>,

    /// Store receiving one summary row per context
    pub summary_store: String,

    /// Store receiving one row per resource
    pub detail_store: String,

    /// Measure decoded payload sizes
    pub measure_payloads: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            clear_browser_cache: true,
            excluded_protocols: vec!["data".to_string()],
            summary_store: "requests_checker".to_string(),
            detail_store: "requests_checker_details".to_string(),
            measure_payloads: true,
        }
    }
}

impl AuditConfig {
    /// Load configuration from a JSON file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AuditError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Parse configuration from JSON text
    pub fn from_json(text: &str) -> Result<Self, AuditError> {
        serde_json::from_str(text).map_err(|e| AuditError::Config(e.to_string()))
    }

    /// Apply `FOS_NETAUDIT_*` environment overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("FOS_NETAUDIT_CLEAR_CACHE").and_then(|v| parse_flag(&v)) {
            self.clear_browser_cache = v;
        }
        if let Some(v) = lookup("FOS_NETAUDIT_MEASURE_PAYLOADS").and_then(|v| parse_flag(&v)) {
            self.measure_payloads = v;
        }
        self
    }

    /// Whether responses with this protocol are skipped
    pub fn is_excluded_protocol(&self, protocol: &str) -> bool {
        self.excluded_protocols.iter().any(|p| p == protocol)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
