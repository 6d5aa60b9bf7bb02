//! # Shutdown Coordination
//!
//! The coordinator task is the only place the pipeline is torn down. It waits
//! for a termination request, then in order:
//!
//! 1. stops the decode task from polling and joins it
//! 2. releases the instrumentation program (detaching every probe)
//! 3. closes the raw event source
//! 4. drops the last sender of the output stream, closing it
//!
//! Every resource is owned by exactly one value and closed by consuming it,
//! so a repeated request cannot close anything twice.

use std::future::Future;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::event::TracedEvent;
use super::pipeline::{PipelineStats, TracerState};
use super::probes::Instrumentation;
use super::source::EventSource;

/// Requests shutdown of a running pipeline
///
/// Cheap to clone. Triggering more than once has no further effect.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub(crate) fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { requested: Arc::new(tx) }, rx)
    }

    pub fn trigger(&self) {
        if self.requested.send_replace(true) {
            debug!("Shutdown already requested");
        }
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.requested.borrow()
    }
}

/// Resolves on SIGINT or SIGTERM
pub async fn termination_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
}

/// What the decode task hands back when it stops
pub(crate) struct DecoderExit<S> {
    pub source: S,
    pub output: mpsc::Sender<TracedEvent>,
    pub stats: PipelineStats,
}

/// Everything the coordinator owns until teardown
pub(crate) struct Teardown<I: Instrumentation> {
    pub instrumentation: I,
    pub decoder: JoinHandle<DecoderExit<I::Source>>,
    pub stop_decoder: watch::Sender<bool>,
    pub requested: watch::Receiver<bool>,
    pub state: Arc<watch::Sender<TracerState>>,
}

impl<I: Instrumentation> Teardown<I> {
    /// Wait for a termination request (or the decode task ending on its
    /// own), then tear the pipeline down
    pub(crate) async fn run<F>(self, signal: F) -> PipelineStats
    where
        F: Future<Output = ()> + Send,
    {
        let Teardown { instrumentation, mut decoder, stop_decoder, mut requested, state } = self;

        let finished = tokio::select! {
            () = signal => {
                info!("Termination signal received, shutting down");
                None
            }
            _ = async { requested.wait_for(|requested| *requested).await.map(|_| ()) } => {
                info!("Shutdown requested");
                None
            }
            exit = &mut decoder => {
                info!("Event source ended, shutting down");
                Some(exit)
            }
        };
        state.send_replace(TracerState::Draining);

        // (1) stop polling
        let _ = stop_decoder.send(true);
        let exit = match finished {
            Some(exit) => exit,
            None => decoder.await,
        };
        let exit = match exit {
            Ok(exit) => Some(exit),
            Err(e) => {
                error!("Decode task failed: {e}");
                None
            }
        };

        // (2) release the instrumentation program
        instrumentation.close();

        let stats = match exit {
            Some(DecoderExit { mut source, output, stats }) => {
                // (3) close the raw event source
                source.close();
                drop(source);
                // (4) close the output stream
                drop(output);
                stats
            }
            None => PipelineStats::default(),
        };

        state.send_replace(TracerState::Closed);
        info!("Tracer closed: {stats}");
        stats
    }
}
