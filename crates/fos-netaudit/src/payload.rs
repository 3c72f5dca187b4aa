//! Payload Size Observer
//!
//! Measures decoded response bodies. Sizes are keyed by URL only, so a
//! retried URL overwrites the earlier measurement.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;

use crate::AuditError;

/// Pending read of a decoded response body, resolving to its length
pub type BodyFuture = Pin<Box<dyn Future<Output = io::Result<u64>> + Send>>;

/// High-level "response completed" signal
pub struct CompletedResponse {
    pub url: String,
    pub status: u16,
    body: BodyFuture,
}

impl CompletedResponse {
    pub fn new<F>(url: &str, status: u16, body: F) -> Self
    where
        F: Future<Output = io::Result<Vec<u8>>> + Send + 'static,
    {
        Self::from_future(url, status, Box::pin(async move { body.await.map(|bytes| bytes.len() as u64) }))
    }

    fn from_future(url: &str, status: u16, body: BodyFuture) -> Self {
        Self {
            url: url.to_string(),
            status,
            body,
        }
    }

    /// Response whose decoded length is already known; nothing is buffered
    pub fn with_length(url: &str, status: u16, length: u64) -> Self {
        Self::from_future(url, status, Box::pin(async move { Ok(length) }))
    }

    /// Response whose body is already in memory
    pub fn ready(url: &str, status: u16, body: Vec<u8>) -> Self {
        Self::new(url, status, async move { Ok(body) })
    }

    /// Response whose body read fails with `error`
    pub fn failed(url: &str, status: u16, error: io::Error) -> Self {
        Self::from_future(url, status, Box::pin(async move { Err(error) }))
    }

    /// Success status class
    pub fn is_ok(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

impl fmt::Debug for CompletedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletedResponse")
            .field("url", &self.url)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Read and measure a completed response.
///
/// Returns `None` for responses outside the success class; those are never
/// measured.
pub async fn measure(response: CompletedResponse) -> Option<Result<u64, AuditError>> {
    if !response.is_ok() {
        return None;
    }
    let result = response.body.await
        .map_err(|e| AuditError::PayloadRead(format!("{}: {}", response.url, e)));
    Some(result)
}

/// Decoded payload sizes by URL
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SizeMap {
    sizes: HashMap<String, u64>,
}

impl SizeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a measurement; the latest one for a URL wins
    pub fn record(&mut self, url: &str, size: u64) {
        self.sizes.insert(url.to_string(), size);
    }

    pub fn get(&self, url: &str) -> Option<u64> {
        self.sizes.get(url).copied()
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}
