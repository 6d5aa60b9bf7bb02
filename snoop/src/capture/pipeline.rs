//! # Event Stream Pipeline
//!
//! Owns the raw event source and turns it into a stream of [`TracedEvent`]s.
//!
//! ## Lifecycle
//!
//! ```text
//! Created ──start──▶ Attaching ──▶ Streaming ──shutdown──▶ Draining ──▶ Closed
//!                        │
//!                        └──any failure──▶ Failed
//! ```
//!
//! ## Tasks
//!
//! - **Decode task**: polls the source, decodes, filters and forwards events
//!   in arrival order. Forwarding waits for room in the bounded output
//!   channel, so a slow consumer slows the decode task down and the kernel
//!   ring buffer fills up. Records that overflow it are lost at the source,
//!   visible only as missing events.
//! - **Coordinator**: waits for a termination request and tears everything
//!   down (see [`shutdown`](super::shutdown)).

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::decoder::decode;
use super::ebpf_setup::EbpfInstrumentation;
use super::event::TracedEvent;
use super::filter::{MessageFilter, Verdict};
use super::probes::{attach_probes, Instrumentation};
use super::shutdown::{termination_signal, DecoderExit, ShutdownHandle, Teardown};
use super::source::EventSource;
use crate::domain::{PidFilter, TraceError};

/// Default number of decoded events buffered for the consumer
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracerState {
    /// Configured, nothing loaded or attached
    Created,
    /// Loading the program and attaching probes
    Attaching,
    /// Probes attached, events flowing
    Streaming,
    /// Shutdown in progress
    Draining,
    /// All resources released, output stream closed
    Closed,
    /// Startup failed; nothing is attached
    Failed,
}

impl fmt::Display for TracerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TracerState::Created => "created",
            TracerState::Attaching => "attaching",
            TracerState::Streaming => "streaming",
            TracerState::Draining => "draining",
            TracerState::Closed => "closed",
            TracerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything the tracer needs before it starts
#[derive(Debug, Clone)]
pub struct TracerConfig {
    /// Compiled probe object
    pub program: PathBuf,
    /// TLS library the probes attach to
    pub binary: PathBuf,
    pub pid_filter: PidFilter,
    /// Decoded events buffered for the consumer (at least 1)
    pub channel_capacity: usize,
}

impl TracerConfig {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, binary: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            binary: binary.into(),
            pid_filter: PidFilter::All,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_pid_filter(mut self, pid_filter: PidFilter) -> Self {
        self.pid_filter = pid_filter;
        self
    }

    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// Per-run counters, reported when the pipeline closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Raw records taken from the source
    pub received: u64,
    pub decoded: u64,
    pub decode_failures: u64,
    /// Decoded events rejected by the filter (no content or another process)
    pub dropped: u64,
    /// Events handed to the consumer
    pub forwarded: u64,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records, {} decoded, {} undecodable, {} filtered, {} forwarded",
            self.received, self.decoded, self.decode_failures, self.dropped, self.forwarded
        )
    }
}

/// A TLS tracer that has not been started yet
///
/// Single use: once started (or failed) it cannot be started again.
pub struct Tracer {
    config: TracerConfig,
    state: Arc<watch::Sender<TracerState>>,
}

impl Tracer {
    #[must_use]
    pub fn new(config: TracerConfig) -> Self {
        let (state, _) = watch::channel(TracerState::Created);
        Self { config, state: Arc::new(state) }
    }

    #[must_use]
    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> TracerState {
        *self.state.borrow()
    }

    /// Load the configured probe object, attach it and start streaming
    ///
    /// Shuts down on SIGINT or SIGTERM. Must be called inside a Tokio
    /// runtime.
    ///
    /// # Errors
    /// Returns an error if the object cannot be loaded, any probe fails to
    /// attach, or the event table cannot be opened.
    pub fn start(&mut self) -> Result<TraceSession, TraceError> {
        self.begin()?;
        let instrumentation = match EbpfInstrumentation::load(&self.config.program) {
            Ok(instrumentation) => instrumentation,
            Err(e) => return Err(self.fail(e)),
        };
        self.launch(instrumentation, termination_signal())
    }

    /// Start streaming from an already loaded instrumentation program
    ///
    /// The pipeline shuts down when `signal` resolves, when a
    /// [`ShutdownHandle`] is triggered, or when the source runs dry.
    ///
    /// # Errors
    /// Returns an error if any probe fails to attach or the event table
    /// cannot be opened. `instrumentation` is released before returning.
    pub fn start_with<I, F>(
        &mut self,
        instrumentation: I,
        signal: F,
    ) -> Result<TraceSession, TraceError>
    where
        I: Instrumentation,
        F: Future<Output = ()> + Send + 'static,
    {
        self.begin()?;
        self.launch(instrumentation, signal)
    }

    fn begin(&mut self) -> Result<(), TraceError> {
        if self.state() != TracerState::Created {
            return Err(TraceError::AlreadyStarted);
        }
        self.state.send_replace(TracerState::Attaching);
        info!("Attaching probes to {}", self.config.binary.display());
        Ok(())
    }

    fn fail(&mut self, error: TraceError) -> TraceError {
        error!("Tracer startup failed: {error}");
        self.state.send_replace(TracerState::Failed);
        error
    }

    fn launch<I, F>(&mut self, mut instrumentation: I, signal: F) -> Result<TraceSession, TraceError>
    where
        I: Instrumentation,
        F: Future<Output = ()> + Send + 'static,
    {
        let opened = attach_probes(&mut instrumentation, &self.config.binary)
            .and_then(|_| instrumentation.open_source());
        let source = match opened {
            Ok(source) => source,
            Err(e) => {
                instrumentation.close();
                return Err(self.fail(e));
            }
        };

        let (output, events) = mpsc::channel(self.config.channel_capacity.max(1));
        let (stop_decoder, stop_rx) = watch::channel(false);
        let (shutdown, requested) = ShutdownHandle::new();
        let filter = MessageFilter::new(self.config.pid_filter);

        self.state.send_replace(TracerState::Streaming);
        info!("Streaming TLS events ({})", self.config.pid_filter);

        let decoder = tokio::spawn(run_decoder(source, filter, output, stop_rx));
        let teardown = Teardown {
            instrumentation,
            decoder,
            stop_decoder,
            requested,
            state: Arc::clone(&self.state),
        };
        let coordinator = tokio::spawn(teardown.run(signal));

        Ok(TraceSession { events, shutdown, state: self.state.subscribe(), coordinator })
    }
}

/// A running tracer: the consumer side of the pipeline
pub struct TraceSession {
    events: mpsc::Receiver<TracedEvent>,
    shutdown: ShutdownHandle,
    state: watch::Receiver<TracerState>,
    coordinator: JoinHandle<PipelineStats>,
}

impl TraceSession {
    /// Next event, or `None` once the pipeline has closed
    pub async fn recv(&mut self) -> Option<TracedEvent> {
        self.events.recv().await
    }

    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn state(&self) -> TracerState {
        *self.state.borrow()
    }

    /// Wait until the pipeline reaches `state`
    pub async fn wait_for_state(&mut self, state: TracerState) {
        let _ = self.state.wait_for(|current| *current == state).await;
    }

    /// Trigger shutdown and wait for every resource to be released
    pub async fn shutdown(self) -> PipelineStats {
        self.shutdown.trigger();
        self.join().await
    }

    /// Wait for the pipeline to close on its own (signal or exhausted
    /// source) and for every resource to be released
    ///
    /// Events still buffered when this is called are discarded.
    pub async fn join(self) -> PipelineStats {
        let TraceSession { events, shutdown, state: _, coordinator } = self;
        drop(events);
        let stats = match coordinator.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Shutdown coordinator failed: {e}");
                PipelineStats::default()
            }
        };
        drop(shutdown);
        stats
    }
}

/// Decode loop: source → decode → filter → output, until told to stop
async fn run_decoder<S: EventSource>(
    mut source: S,
    filter: MessageFilter,
    output: mpsc::Sender<TracedEvent>,
    mut stop: watch::Receiver<bool>,
) -> DecoderExit<S> {
    let mut stats = PipelineStats::default();

    loop {
        let polled = tokio::select! {
            biased;
            _ = stopped(&mut stop) => break,
            polled = source.poll() => polled,
        };

        let raw = match polled {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("Event source exhausted");
                break;
            }
            Err(e) => {
                error!("Event source failed: {e}");
                break;
            }
        };
        stats.received += 1;

        let event = match decode(&raw) {
            Ok(event) => {
                stats.decoded += 1;
                event
            }
            Err(e) => {
                stats.decode_failures += 1;
                warn!("Failed to decode record: {e}");
                continue;
            }
        };

        match filter.check(&event) {
            Verdict::Pass => {}
            Verdict::NoContent => {
                stats.dropped += 1;
                trace!("Dropped empty {} from pid {}", event.function(), event.pid());
                continue;
            }
            Verdict::OtherProcess => {
                stats.dropped += 1;
                trace!("Dropped {} from pid {}", event.function(), event.pid());
                continue;
            }
        }

        // A consumer that stopped reading must not hold up shutdown, so the
        // handoff gives way to the stop request.
        tokio::select! {
            biased;
            _ = stopped(&mut stop) => {
                debug!("Stop requested during handoff, dropping in-flight event");
                break;
            }
            sent = output.send(event) => {
                if sent.is_err() {
                    debug!("Consumer went away");
                    break;
                }
                stats.forwarded += 1;
            }
        }
    }

    DecoderExit { source, output, stats }
}

/// Resolves once a stop is requested or the coordinator is gone
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}
