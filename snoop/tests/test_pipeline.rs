//! End-to-end pipeline tests against a fake instrumentation program
//!
//! Records are replayed through a `ChannelSource`, so no privileges or
//! kernel support are needed.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use snoop::capture::{
    ChannelSource, EventSource, Instrumentation, Probe, RawRecord, RawRecordBuilder, TlsFunction,
    Tracer, TracerConfig, TracerState,
};
use snoop::domain::{Pid, PidFilter, TraceError};
use snoop::render::render_json;
use snoop_common::{FN_SSL_READ, FN_SSL_WRITE};
use tokio::sync::{mpsc, oneshot};

const LIBSSL: &str = "/lib/x86_64-linux-gnu/libssl.so.3";

/// Shared, ordered log of what the fakes were asked to do
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

struct JournaledSource {
    inner: ChannelSource,
    journal: Journal,
}

#[async_trait]
impl EventSource for JournaledSource {
    async fn poll(&mut self) -> io::Result<Option<RawRecord>> {
        self.inner.poll().await
    }

    fn close(&mut self) {
        self.inner.close();
        self.journal.push("source closed");
    }
}

struct FakeInstrumentation {
    journal: Journal,
    source: Option<ChannelSource>,
    fail_on: Option<&'static str>,
}

impl Instrumentation for FakeInstrumentation {
    type Source = JournaledSource;

    fn attach(&mut self, probe: &Probe, binary: &Path) -> Result<(), TraceError> {
        let name = probe.program_name();
        if self.fail_on == Some(name.as_str()) {
            return Err(TraceError::ProbeAttachFailed {
                probe: name,
                binary: binary.display().to_string(),
                error: "symbol not found".to_string(),
            });
        }
        self.journal.push(format!("attach {name}"));
        Ok(())
    }

    fn open_source(&mut self) -> Result<Self::Source, TraceError> {
        let inner = self
            .source
            .take()
            .ok_or_else(|| TraceError::EventTableNotFound("TLS_EVENTS".to_string()))?;
        Ok(JournaledSource { inner, journal: self.journal.clone() })
    }

    fn close(self) {
        self.journal.push("instrumentation closed");
    }
}

struct Harness {
    tracer: Tracer,
    records: mpsc::Sender<RawRecord>,
    instrumentation: FakeInstrumentation,
    journal: Journal,
}

fn harness(config: TracerConfig) -> Harness {
    let journal = Journal::default();
    let (records, source) = ChannelSource::new(16);
    let instrumentation =
        FakeInstrumentation { journal: journal.clone(), source: Some(source), fail_on: None };
    Harness { tracer: Tracer::new(config), records, instrumentation, journal }
}

fn config() -> TracerConfig {
    TracerConfig::new("snoop.o", LIBSSL)
}

fn record(pid: u32, function: i32, content: &[u8]) -> RawRecord {
    RawRecordBuilder::new()
        .pid(pid)
        .tid(pid)
        .function(function)
        .result(i32::try_from(content.len()).unwrap())
        .process_name(b"curl")
        .content(content)
        .build()
}

#[tokio::test]
async fn test_events_arrive_in_order() {
    let Harness { mut tracer, records, instrumentation, .. } = harness(config());
    let mut session = tracer.start_with(instrumentation, std::future::pending()).unwrap();
    assert_eq!(session.state(), TracerState::Streaming);

    for (i, body) in [b"R1", b"R2", b"R3"].iter().enumerate() {
        let pid = 100 + u32::try_from(i).unwrap();
        records.send(record(pid, FN_SSL_READ, *body)).await.unwrap();
    }

    for expected in [&b"R1"[..], b"R2", b"R3"] {
        let event = session.recv().await.unwrap();
        assert_eq!(event.content(), expected);
    }

    let stats = session.shutdown().await;
    assert_eq!(stats.forwarded, 3);
    assert_eq!(tracer.state(), TracerState::Closed);
}

#[tokio::test]
async fn test_curl_request_is_captured() {
    let Harness { mut tracer, records, instrumentation, .. } = harness(config());
    let mut session = tracer.start_with(instrumentation, std::future::pending()).unwrap();

    let request = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    records
        .send(
            RawRecordBuilder::new()
                .elapsed_us(2_500)
                .pid(4242)
                .tid(4243)
                .result(37)
                .function(FN_SSL_WRITE)
                .process_name(b"curl")
                .content(request)
                .build(),
        )
        .await
        .unwrap();

    let event = session.recv().await.unwrap();
    assert_eq!(event.function(), TlsFunction::Write);
    assert_eq!(event.pid(), Pid(4242));
    assert_eq!(event.tid().0, 4243);
    assert_eq!(event.process_name(), "curl");
    assert_eq!(event.content_len(), request.len());

    let json: serde_json::Value = serde_json::from_str(&render_json(&event).unwrap()).unwrap();
    assert_eq!(json["function"], "SSL_WRITE");
    assert_eq!(json["message_size"], request.len());
    assert!(json["tls_content"].as_str().unwrap().starts_with("GET / "));

    session.shutdown().await;
}

#[tokio::test]
async fn test_empty_content_is_dropped() {
    let Harness { mut tracer, records, instrumentation, .. } = harness(config());
    let mut session = tracer.start_with(instrumentation, std::future::pending()).unwrap();

    records.send(record(1, FN_SSL_READ, b"")).await.unwrap();
    records.send(record(1, FN_SSL_READ, b"hello")).await.unwrap();
    drop(records);

    assert_eq!(session.recv().await.unwrap().content(), b"hello");
    assert!(session.recv().await.is_none());

    let stats = session.join().await;
    assert_eq!(stats.received, 2);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.forwarded, 1);
}

#[tokio::test]
async fn test_pid_filter() {
    let config = config().with_pid_filter(PidFilter::Only(Pid(100)));
    let Harness { mut tracer, records, instrumentation, .. } = harness(config);
    let mut session = tracer.start_with(instrumentation, std::future::pending()).unwrap();

    records.send(record(200, FN_SSL_READ, b"other")).await.unwrap();
    records.send(record(100, FN_SSL_READ, b"mine")).await.unwrap();
    records.send(record(300, FN_SSL_WRITE, b"other")).await.unwrap();
    drop(records);

    let event = session.recv().await.unwrap();
    assert_eq!(event.pid(), Pid(100));
    assert_eq!(event.content(), b"mine");
    assert!(session.recv().await.is_none());
}

#[tokio::test]
async fn test_malformed_record_is_skipped() {
    let Harness { mut tracer, records, instrumentation, .. } = harness(config());
    let mut session = tracer.start_with(instrumentation, std::future::pending()).unwrap();

    records.send(vec![0u8; 10]).await.unwrap();
    records.send(record(7, FN_SSL_READ, b"after")).await.unwrap();
    drop(records);

    assert_eq!(session.recv().await.unwrap().content(), b"after");
    assert!(session.recv().await.is_none());

    let stats = session.join().await;
    assert_eq!(stats.decode_failures, 1);
    assert_eq!(stats.decoded, 1);
}

#[tokio::test]
async fn test_failed_attach_starts_nothing() {
    let Harness { mut tracer, records, mut instrumentation, journal } = harness(config());
    instrumentation.fail_on = Some("uprobe_entry_SSL_write");

    let err = tracer.start_with(instrumentation, std::future::pending()).err().unwrap();

    assert!(
        matches!(err, TraceError::ProbeAttachFailed { ref probe, .. } if probe == "uprobe_entry_SSL_write")
    );
    assert_eq!(tracer.state(), TracerState::Failed);
    assert_eq!(
        journal.entries(),
        ["attach uprobe_entry_SSL_read", "attach uprobe_return_SSL_read", "instrumentation closed"]
    );
    // The source was never opened, so nothing is reading the records
    assert!(records.send(record(1, FN_SSL_READ, b"x")).await.is_err());
}

#[tokio::test]
async fn test_missing_event_table() {
    let Harness { mut tracer, mut instrumentation, journal, .. } = harness(config());
    instrumentation.source = None;

    let err = tracer.start_with(instrumentation, std::future::pending()).err().unwrap();

    assert!(matches!(err, TraceError::EventTableNotFound(_)));
    assert_eq!(tracer.state(), TracerState::Failed);
    assert_eq!(journal.count("attach uprobe_return_SSL_write"), 1);
    assert_eq!(journal.count("instrumentation closed"), 1);
}

#[tokio::test]
async fn test_start_twice() {
    let Harness { mut tracer, instrumentation, .. } = harness(config());
    let session = tracer.start_with(instrumentation, std::future::pending()).unwrap();

    let Harness { instrumentation: second, .. } = harness(config());
    let err = tracer.start_with(second, std::future::pending()).err().unwrap();
    assert!(matches!(err, TraceError::AlreadyStarted));

    session.shutdown().await;
}

#[tokio::test]
async fn test_double_trigger_closes_once() {
    let Harness { mut tracer, records, instrumentation, journal } = harness(config());
    let mut session = tracer.start_with(instrumentation, std::future::pending()).unwrap();

    let handle = session.shutdown_handle();
    handle.trigger();
    handle.trigger();
    session.shutdown_handle().trigger();
    assert!(handle.is_triggered());

    assert!(session.recv().await.is_none());
    assert!(session.recv().await.is_none());
    session.wait_for_state(TracerState::Closed).await;
    assert_eq!(session.state(), TracerState::Closed);

    session.join().await;
    handle.trigger();

    assert_eq!(journal.count("instrumentation closed"), 1);
    assert_eq!(journal.count("source closed"), 1);
    assert!(records.is_closed());
}

#[tokio::test]
async fn test_teardown_order() {
    let Harness { mut tracer, records, instrumentation, journal } = harness(config());
    let mut session = tracer.start_with(instrumentation, std::future::pending()).unwrap();

    records.send(record(1, FN_SSL_READ, b"one")).await.unwrap();
    assert!(session.recv().await.is_some());

    session.shutdown_handle().trigger();
    assert!(session.recv().await.is_none());

    let entries = journal.entries();
    assert_eq!(entries.len(), 6);
    assert!(entries[..4].iter().all(|e| e.starts_with("attach ")));
    assert_eq!(entries[4..], ["instrumentation closed", "source closed"]);

    session.join().await;
}

#[tokio::test]
async fn test_termination_signal_closes_stream() {
    let Harness { mut tracer, records, instrumentation, .. } = harness(config());
    let (fire, fired) = oneshot::channel::<()>();
    let signal = async move {
        let _ = fired.await;
    };
    let mut session = tracer.start_with(instrumentation, signal).unwrap();

    records.send(record(1, FN_SSL_READ, b"before")).await.unwrap();
    assert_eq!(session.recv().await.unwrap().content(), b"before");

    fire.send(()).unwrap();
    assert!(session.recv().await.is_none());

    let stats = session.join().await;
    assert_eq!(stats.forwarded, 1);
    assert_eq!(tracer.state(), TracerState::Closed);
}

#[tokio::test]
async fn test_source_exhaustion_closes_stream() {
    let Harness { mut tracer, records, instrumentation, journal } = harness(config());
    let mut session = tracer.start_with(instrumentation, std::future::pending()).unwrap();

    records.send(record(1, FN_SSL_READ, b"last")).await.unwrap();
    drop(records);

    assert_eq!(session.recv().await.unwrap().content(), b"last");
    assert!(session.recv().await.is_none());

    session.join().await;
    assert_eq!(tracer.state(), TracerState::Closed);
    assert_eq!(journal.count("instrumentation closed"), 1);
}

#[tokio::test]
async fn test_shutdown_with_stalled_consumer() {
    let config = config().with_channel_capacity(1);
    let Harness { mut tracer, records, instrumentation, .. } = harness(config);
    let mut session = tracer.start_with(instrumentation, std::future::pending()).unwrap();

    for i in 0..8u8 {
        records.send(record(1, FN_SSL_READ, &[b'a' + i])).await.unwrap();
    }
    // Let the decode task fill the output buffer and block on the handoff
    tokio::time::sleep(Duration::from_millis(50)).await;

    session.shutdown_handle().trigger();
    session.wait_for_state(TracerState::Closed).await;

    // Whatever was buffered before the stop is still delivered, in order
    let mut seen = Vec::new();
    while let Some(event) = session.recv().await {
        seen.push(event.content()[0]);
    }
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(seen[0], b'a');

    let stats = tokio::time::timeout(Duration::from_secs(5), session.join()).await.unwrap();
    assert!(stats.forwarded < 8);
}
