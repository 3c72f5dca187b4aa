//! Requests Checker
//!
//! Audit entry point: installs the result stores, owns the current
//! navigation and turns its contexts into detail and summary rows.

use serde::Serialize;

use crate::AuditError;
use crate::config::AuditConfig;
use crate::merge::merge;
use crate::navigation::{Navigation, NavigationHandle};
use crate::protocol::ProtocolSession;
use crate::record::ResourceRecord;
use crate::score::AnalysisResult;
use crate::sink::{ResultSink, StoreSchema};

/// Detail row: one merged record tagged with its page and context
#[derive(Serialize)]
struct DetailRow<'a> {
    url: &'a str,
    context: &'a str,
    #[serde(flatten)]
    record: &'a ResourceRecord,
}

/// Network requests audit
#[derive(Debug)]
pub struct RequestsAudit<S: ResultSink> {
    config: AuditConfig,
    sink: S,
    navigation: Option<Navigation>,
}

impl<S: ResultSink> RequestsAudit<S> {
    /// Create the audit and declare its two stores on `sink`
    pub fn new(config: AuditConfig, mut sink: S) -> Self {
        for schema in [StoreSchema::summary(&config.summary_store), StoreSchema::detail(&config.detail_store)] {
            if let Err(e) = sink.install_store(&schema) {
                tracing::warn!("Failed to install store {}: {}", schema.name, e);
            }
        }
        Self { config, sink, navigation: None }
    }

    pub fn name(&self) -> &'static str {
        "Requests Checker"
    }

    pub fn id(&self) -> &'static str {
        "requests_checker"
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Begin a fresh navigation, discarding the previous one
    pub async fn start_navigation<P: ProtocolSession>(&mut self, session: &mut P) -> Result<NavigationHandle, AuditError> {
        self.navigation = None;
        let mut navigation = Navigation::new(self.config.clone());
        navigation.arm(session).await?;
        let handle = navigation.handle();
        self.navigation = Some(navigation);
        Ok(handle)
    }

    pub fn navigation(&self) -> Option<&Navigation> {
        self.navigation.as_ref()
    }

    pub fn navigation_mut(&mut self) -> Option<&mut Navigation> {
        self.navigation.as_mut()
    }

    /// Drive the current navigation until it ends
    pub async fn run_navigation(&mut self) {
        if let Some(navigation) = self.navigation.as_mut() {
            navigation.run().await;
        }
    }

    /// Emit detail and summary rows for every named context of the current
    /// navigation. Always succeeds; sink failures are logged.
    pub fn analyse(&mut self, page: &str) -> bool {
        let Self { config, sink, navigation } = self;
        let Some(navigation) = navigation.as_ref() else {
            tracing::debug!("No navigation to analyse for {}", page);
            return true;
        };

        let contexts = navigation.contexts();
        for (name, data) in contexts.iter() {
            if name.is_empty() {
                continue;
            }
            analyse_context(sink, config, page, name, merge(data, contexts.sizes()));
        }
        true
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

fn analyse_context<S: ResultSink>(sink: &mut S, config: &AuditConfig, page: &str, context: &str, records: Vec<ResourceRecord>) -> AnalysisResult {
    for record in &records {
        let row = DetailRow { url: page, context, record };
        if let Err(e) = add_row(sink, &config.detail_store, &row) {
            tracing::warn!("Dropping detail row for {}: {}", record.url, e);
        }
    }

    let result = AnalysisResult::new(page, context, &records);
    let summary = &result.summary;
    tracing::info!(
        target: "requests_checker",
        url = page,
        context,
        nb = summary.nb,
        ratio_cache_controle = summary.ratio_cache_controle,
        ratio_http2 = summary.ratio_http2,
        secure = summary.secure,
        bad_encoded = summary.bad_encoded,
        encoded = summary.encoded,
        "Requests Checker"
    );

    if let Err(e) = add_row(sink, &config.summary_store, &result) {
        tracing::warn!("Dropping summary row for {} / {}: {}", page, context, e);
    }
    result
}

fn add_row<S: ResultSink, T: Serialize>(sink: &mut S, store: &str, row: &T) -> Result<(), AuditError> {
    sink.add(store, serde_json::to_value(row)?)
}
