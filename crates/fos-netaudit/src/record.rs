//! Resource Records
//!
//! Per-context storage of everything learned about each requested URL.

use std::collections::HashMap;

use serde::Serialize;

use crate::payload::SizeMap;

/// Everything known about one URL requested during a navigation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    #[serde(rename = "src")]
    pub url: String,
    pub status: u16,
    pub mime_type: String,
    /// Empty when the response was not compressed
    pub content_encoding: String,
    /// Wire bytes minus declared body bytes
    pub response_header_size: Option<i64>,
    /// Body length declared by `Content-Length`
    pub encoded_data_length: Option<u64>,
    /// Body length after decompression, filled at merge time
    pub decoded_data_length: Option<u64>,
    pub from_cache: bool,
    pub cache_control: Option<String>,
    pub protocol: String,
    pub security_state: Option<String>,
    pub security_protocole: Option<String>,
}

impl ResourceRecord {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Overwrite the fields carried by `patch`, leaving the rest untouched
    pub fn apply(&mut self, patch: ResourcePatch) {
        if let Some(v) = patch.status { self.status = v; }
        if let Some(v) = patch.mime_type { self.mime_type = v; }
        if let Some(v) = patch.content_encoding { self.content_encoding = v; }
        if let Some(v) = patch.response_header_size { self.response_header_size = Some(v); }
        if let Some(v) = patch.encoded_data_length { self.encoded_data_length = Some(v); }
        if let Some(v) = patch.from_cache { self.from_cache = v; }
        if let Some(v) = patch.cache_control { self.cache_control = Some(v); }
        if let Some(v) = patch.protocol { self.protocol = v; }
        if let Some(v) = patch.security_state { self.security_state = Some(v); }
        if let Some(v) = patch.security_protocole { self.security_protocole = Some(v); }
    }

    /// Cache-Control allows reuse for a non-zero lifetime
    pub fn has_cache_lifetime(&self) -> bool {
        self.cache_control
            .as_deref()
            .is_some_and(|cc| cc.contains("max-age") && !cc.contains("max-age=0"))
    }

    pub fn is_http2(&self) -> bool {
        self.protocol.contains("h2")
    }

    pub fn is_secure(&self) -> bool {
        self.security_state
            .as_deref()
            .is_some_and(|s| !s.is_empty() && s != "unknown")
    }

    pub fn is_encoded(&self) -> bool {
        !self.content_encoding.is_empty()
    }

    /// Declared body larger than the decoded payload. Unset lengths never count.
    pub fn is_badly_encoded(&self) -> bool {
        match (self.encoded_data_length, self.decoded_data_length) {
            (Some(encoded), Some(decoded)) => encoded > decoded,
            _ => false,
        }
    }
}

/// Partial update for a [`ResourceRecord`]; `None` means "not carried"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourcePatch {
    pub url: String,
    pub status: Option<u16>,
    pub mime_type: Option<String>,
    pub content_encoding: Option<String>,
    pub response_header_size: Option<i64>,
    pub encoded_data_length: Option<u64>,
    pub from_cache: Option<bool>,
    pub cache_control: Option<String>,
    pub protocol: Option<String>,
    pub security_state: Option<String>,
    pub security_protocole: Option<String>,
}

/// Records of one named context
#[derive(Debug, Clone, Default)]
pub struct ContextData {
    records: HashMap<String, ResourceRecord>,
    order: Vec<String>,
}

impl ContextData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update the record for `patch.url`
    pub fn upsert(&mut self, patch: ResourcePatch) {
        if !self.records.contains_key(&patch.url) {
            self.order.push(patch.url.clone());
        }
        self.records
            .entry(patch.url.clone())
            .or_insert_with(|| ResourceRecord::new(&patch.url))
            .apply(patch);
    }

    pub fn get(&self, url: &str) -> Option<&ResourceRecord> {
        self.records.get(url)
    }

    /// Records in order of first observation
    pub fn records(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.order.iter().filter_map(|url| self.records.get(url))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Named contexts of one navigation, in registration order
#[derive(Debug, Default)]
pub struct NavigationContexts {
    contexts: Vec<(String, ContextData)>,
    current: Option<usize>,
    /// Data observed before any context was named
    unnamed: ContextData,
    /// Decoded sizes for the whole navigation; every context joins on it
    sizes: SizeMap,
}

impl NavigationContexts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context and make it current.
    ///
    /// The first registration adopts anything observed before it. A name
    /// that is already known becomes current again with its data intact.
    pub fn register(&mut self, name: &str) {
        if let Some(index) = self.position(name) {
            self.current = Some(index);
            return;
        }
        let data = if self.contexts.is_empty() {
            std::mem::take(&mut self.unnamed)
        } else {
            ContextData::new()
        };
        self.contexts.push((name.to_string(), data));
        self.current = Some(self.contexts.len() - 1);
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.map(|i| self.contexts[i].0.as_str())
    }

    pub fn current_mut(&mut self) -> &mut ContextData {
        match self.current {
            Some(i) => &mut self.contexts[i].1,
            None => &mut self.unnamed,
        }
    }

    pub fn sizes(&self) -> &SizeMap {
        &self.sizes
    }

    pub fn sizes_mut(&mut self) -> &mut SizeMap {
        &mut self.sizes
    }

    pub fn get(&self, name: &str) -> Option<&ContextData> {
        self.position(name).map(|i| &self.contexts[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextData)> {
        self.contexts.iter().map(|(name, data)| (name.as_str(), data))
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.contexts.iter().position(|(n, _)| n == name)
    }
}
