//! fOS Network Audit
//!
//! Correlates the two event streams a page load produces and scores the
//! resulting requests.
//!
//! Features:
//! - Protocol correlation (response observed + load finished, keyed by request id)
//! - Decoded payload measurement (keyed by URL)
//! - Per-context record merging
//! - Aggregate scoring (cache control, HTTP/2, HTTPS, compression)
//! - Result stores with labelled column schemas
//!
//! # Example
//! ```rust,ignore
//! use fos_netaudit::{AuditConfig, MemorySink, RequestsAudit};
//!
//! let mut audit = RequestsAudit::new(AuditConfig::default(), MemorySink::new());
//! let handle = audit.start_navigation(&mut session).await?;
//! // ... feed events through `handle` ...
//! audit.run_navigation().await;
//! audit.analyse("https://example.com");
//! ```

pub mod config;
pub mod protocol;
pub mod record;
pub mod correlator;
pub mod payload;
pub mod merge;
pub mod score;
pub mod sink;
pub mod navigation;
pub mod audit;
pub mod replay;

pub use config::AuditConfig;
pub use protocol::{Headers, LoadFinished, ProtocolEvent, ProtocolResponse, ProtocolSession, ResponseObserved, SecurityDetails};
pub use record::{ContextData, NavigationContexts, ResourcePatch, ResourceRecord};
pub use correlator::ProtocolCorrelator;
pub use payload::{BodyFuture, CompletedResponse, SizeMap};
pub use merge::merge;
pub use score::{AnalysisResult, AnalysisSummary};
pub use sink::{JsonLinesSink, MemorySink, ResultSink, StoreSchema};
pub use navigation::{Navigation, NavigationEvent, NavigationHandle, NavigationState};
pub use audit::RequestsAudit;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Audit error
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Load finished for unknown request: {request_id}")]
    OrderingViolation { request_id: String },

    #[error("Payload read failed: {0}")]
    PayloadRead(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Protocol session error: {0}")]
    Session(String),

    #[error("Result sink error: {0}")]
    Sink(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Navigation not armed")]
    NotArmed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
