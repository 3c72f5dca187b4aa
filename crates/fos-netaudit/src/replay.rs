//! Capture Replay
//!
//! Feeds a recorded navigation (JSON lines) through the audit. Each line is
//! tagged by `event`:
//!
//! ```text
//! {"event":"context","name":"home"}
//! {"event":"cdp","method":"Network.responseReceived","params":{...}}
//! {"event":"response","url":"https://a.test/","status":200,"bodyLength":5120}
//! {"event":"response","url":"https://a.test/big","status":200,"bodyError":"reset"}
//! {"event":"end"}
//! ```

use std::io::{self, BufRead};

use serde::Deserialize;
use serde_json::Value;

use crate::AuditError;
use crate::audit::RequestsAudit;
use crate::navigation::NavigationEvent;
use crate::payload::CompletedResponse;
use crate::protocol::{ProtocolEvent, ProtocolSession};
use crate::sink::ResultSink;

/// One line of a capture file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CaptureLine {
    Context {
        name: String,
    },
    Cdp {
        method: String,
        #[serde(default)]
        params: Value,
    },
    Response {
        url: String,
        status: u16,
        #[serde(default, rename = "bodyLength")]
        body_length: Option<u64>,
        #[serde(default, rename = "bodyError")]
        body_error: Option<String>,
    },
    End,
}

impl CaptureLine {
    pub fn parse(line: &str) -> Result<Self, AuditError> {
        serde_json::from_str(line).map_err(|e| AuditError::InvalidEvent(e.to_string()))
    }

    /// Convert to a navigation event; protocol methods the audit does not
    /// consume yield `None`.
    pub fn into_event(self) -> Result<Option<NavigationEvent>, AuditError> {
        let event = match self {
            Self::Context { name } => NavigationEvent::ContextRegistered { name },
            Self::Cdp { method, params } => match ProtocolEvent::from_method(&method, params)? {
                Some(event) => NavigationEvent::Protocol(event),
                None => return Ok(None),
            },
            Self::Response { url, status, body_length, body_error } => {
                let response = match body_error {
                    Some(error) => CompletedResponse::failed(&url, status, io::Error::other(error)),
                    None => CompletedResponse::with_length(&url, status, body_length.unwrap_or(0)),
                };
                NavigationEvent::ResponseCompleted(response)
            }
            Self::End => NavigationEvent::Ended,
        };
        Ok(Some(event))
    }
}

/// Session stand-in for recorded captures; instrumentation already happened
#[derive(Debug, Default)]
pub struct ReplaySession;

impl ProtocolSession for ReplaySession {
    async fn clear_browser_cache(&mut self) -> Result<(), AuditError> {
        tracing::debug!("Replay: browser cache clear skipped");
        Ok(())
    }

    async fn enable_network(&mut self) -> Result<(), AuditError> {
        tracing::debug!("Replay: network events come from capture");
        Ok(())
    }
}

/// Replay counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub lines: usize,
    pub events: usize,
    pub ignored: usize,
    pub invalid: usize,
}

/// Replay one navigation from `reader` and analyse it as `page`
pub async fn replay<R, S, P>(reader: R, audit: &mut RequestsAudit<S>, session: &mut P, page: &str) -> Result<ReplayStats, AuditError>
where
    R: BufRead,
    S: ResultSink,
    P: ProtocolSession,
{
    let handle = audit.start_navigation(session).await?;
    let mut stats = ReplayStats::default();
    let mut ended = false;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        stats.lines += 1;

        let event = match CaptureLine::parse(&line).and_then(CaptureLine::into_event) {
            Ok(Some(event)) => event,
            Ok(None) => {
                stats.ignored += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!("Line {}: {}", index + 1, e);
                stats.invalid += 1;
                continue;
            }
        };

        ended |= matches!(event, NavigationEvent::Ended);
        handle.send(event)?;
        stats.events += 1;
        if ended {
            break;
        }
    }

    if !ended {
        handle.end()?;
    }

    audit.run_navigation().await;
    audit.analyse(page);
    Ok(stats)
}
