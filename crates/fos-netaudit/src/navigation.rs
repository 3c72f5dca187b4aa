//! Navigation Lifecycle
//!
//! One `Navigation` owns all state gathered while a page is visited. Events
//! from both streams arrive on a single channel and are applied one at a
//! time by the owning task, so the maps are never shared.
//!
//! ```text
//!  protocol events ──┐
//!  context changes ──┼──► channel ──► Navigation::run ──► contexts
//!  completed bodies ─┘        ▲                             ▲
//!                             └── body read tasks ──────────┘ (sizes)
//! ```

use smol::Task;
use smol::channel::{self, Receiver, Sender};

use crate::AuditError;
use crate::config::AuditConfig;
use crate::correlator::ProtocolCorrelator;
use crate::payload::{self, CompletedResponse};
use crate::protocol::{ProtocolEvent, ProtocolSession};
use crate::record::NavigationContexts;

/// Navigation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationState {
    /// Created, session not instrumented yet
    Idle,
    /// Cache cleared and network events enabled
    Armed,
    /// At least one event applied
    Receiving,
    /// Navigation finished; only pending measurements are applied
    Ended,
}

/// Event delivered to a navigation
#[derive(Debug)]
pub enum NavigationEvent {
    /// Subsequent events belong to this named context
    ContextRegistered { name: String },
    Protocol(ProtocolEvent),
    ResponseCompleted(CompletedResponse),
    Ended,
}

#[derive(Debug)]
struct Measurement {
    url: String,
    result: Result<u64, AuditError>,
}

#[derive(Debug)]
enum Inbound {
    Event(NavigationEvent),
    Measured(Measurement),
}

/// Cloneable producer side of a navigation's event queue
#[derive(Debug, Clone)]
pub struct NavigationHandle {
    tx: Sender<Inbound>,
}

impl NavigationHandle {
    /// Queue an event. Fails once the navigation has been dropped.
    pub fn send(&self, event: NavigationEvent) -> Result<(), AuditError> {
        self.tx.try_send(Inbound::Event(event))
            .map_err(|_| AuditError::Session("navigation closed".into()))
    }

    pub fn register_context(&self, name: &str) -> Result<(), AuditError> {
        self.send(NavigationEvent::ContextRegistered { name: name.to_string() })
    }

    pub fn protocol(&self, event: ProtocolEvent) -> Result<(), AuditError> {
        self.send(NavigationEvent::Protocol(event))
    }

    pub fn response_completed(&self, response: CompletedResponse) -> Result<(), AuditError> {
        self.send(NavigationEvent::ResponseCompleted(response))
    }

    pub fn end(&self) -> Result<(), AuditError> {
        self.send(NavigationEvent::Ended)
    }
}

/// State of one page visit
#[derive(Debug)]
pub struct Navigation {
    state: NavigationState,
    config: AuditConfig,
    correlator: ProtocolCorrelator,
    contexts: NavigationContexts,
    tx: Sender<Inbound>,
    rx: Receiver<Inbound>,
    /// In-flight body reads
    reads: Vec<Task<()>>,
}

impl Navigation {
    pub fn new(config: AuditConfig) -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            state: NavigationState::Idle,
            correlator: ProtocolCorrelator::new(&config),
            config,
            contexts: NavigationContexts::new(),
            tx,
            rx,
            reads: Vec::new(),
        }
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn handle(&self) -> NavigationHandle {
        NavigationHandle { tx: self.tx.clone() }
    }

    pub fn contexts(&self) -> &NavigationContexts {
        &self.contexts
    }

    /// Responses observed whose load has not finished
    pub fn pending_responses(&self) -> usize {
        self.correlator.pending()
    }

    /// Body reads that have not completed yet
    pub fn in_flight_reads(&self) -> usize {
        self.reads.iter().filter(|t| !t.is_finished()).count()
    }

    /// Instrument the session: clear the browser cache (if configured) and
    /// enable network events.
    pub async fn arm<S: ProtocolSession>(&mut self, session: &mut S) -> Result<(), AuditError> {
        if self.state != NavigationState::Idle {
            return Ok(());
        }
        if self.config.clear_browser_cache {
            session.clear_browser_cache().await?;
        }
        session.enable_network().await?;
        self.state = NavigationState::Armed;
        tracing::debug!("Navigation armed");
        Ok(())
    }

    /// Apply queued events until `Ended`, then wait for in-flight body reads.
    pub async fn run(&mut self) {
        while self.state != NavigationState::Ended {
            match self.rx.recv().await {
                Ok(inbound) => self.process(inbound),
                Err(_) => break,
            }
        }
        self.settle().await;
    }

    /// Wait for every in-flight body read and apply its measurement
    pub async fn settle(&mut self) {
        let reads = std::mem::take(&mut self.reads);
        for task in reads {
            task.await;
        }
        self.drain();
    }

    /// End the navigation without waiting; unfinished reads are cancelled
    /// and their URLs keep no decoded size.
    pub fn abort(&mut self) {
        let cancelled = self.in_flight_reads();
        if cancelled > 0 {
            tracing::debug!("Cancelling {} body reads", cancelled);
        }
        self.reads.clear();
        self.correlator.clear();
        self.state = NavigationState::Ended;
        self.drain();
    }

    /// Apply one event on the current task
    pub fn dispatch(&mut self, event: NavigationEvent) {
        match self.state {
            NavigationState::Idle => {
                tracing::warn!("Dropping event before navigation was armed: {:?}", event);
                return;
            }
            NavigationState::Ended => {
                tracing::debug!("Dropping event after navigation ended: {:?}", event);
                return;
            }
            NavigationState::Armed | NavigationState::Receiving => {}
        }

        match event {
            NavigationEvent::ContextRegistered { name } => {
                tracing::debug!("New context: {}", name);
                self.contexts.register(&name);
            }
            NavigationEvent::Protocol(event) => {
                self.state = NavigationState::Receiving;
                self.on_protocol(event);
            }
            NavigationEvent::ResponseCompleted(response) => {
                self.state = NavigationState::Receiving;
                self.on_response_completed(response);
            }
            NavigationEvent::Ended => {
                let unfinished = self.correlator.clear();
                tracing::debug!(
                    "Navigation ended with {} contexts, {} responses never finished loading",
                    self.contexts.len(),
                    unfinished
                );
                self.state = NavigationState::Ended;
            }
        }
    }

    fn process(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Event(event) => self.dispatch(event),
            Inbound::Measured(measurement) => self.on_measurement(measurement),
        }
    }

    fn drain(&mut self) {
        while let Ok(inbound) = self.rx.try_recv() {
            self.process(inbound);
        }
    }

    fn on_protocol(&mut self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::ResponseObserved(observed) => {
                self.correlator.observe_response(observed);
            }
            ProtocolEvent::LoadFinished(finished) => match self.correlator.finish_loading(&finished) {
                Ok(Some(patch)) => self.contexts.current_mut().upsert(patch),
                Ok(None) => {}
                Err(e) => tracing::warn!("Dropping load event: {}", e),
            },
        }
    }

    fn on_response_completed(&mut self, response: CompletedResponse) {
        if !self.config.measure_payloads || !response.is_ok() {
            return;
        }

        let url = response.url.clone();
        let tx = self.tx.clone();
        let task = smol::spawn(async move {
            if let Some(result) = payload::measure(response).await {
                // Closed only when the navigation is gone
                let _ = tx.send(Inbound::Measured(Measurement { url, result })).await;
            }
        });

        self.reads.retain(|t| !t.is_finished());
        self.reads.push(task);
    }

    fn on_measurement(&mut self, measurement: Measurement) {
        let Measurement { url, result } = measurement;
        match result {
            Ok(size) => self.contexts.sizes_mut().record(&url, size),
            Err(e) => tracing::warn!("{}", e),
        }
    }
}
