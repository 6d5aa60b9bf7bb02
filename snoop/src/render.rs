//! Event rendering for the `snoop` binary
//!
//! Two formats: a pretty-printed JSON object per event, and a
//! DESCRIPTION/VALUE table followed by the captured plaintext.

// Microsecond counts never get near 2^52
#![allow(clippy::cast_precision_loss)]

use std::borrow::Cow;
use std::fmt::Write as _;

use chrono::Local;
use crossterm::style::{style, Stylize};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::capture::TracedEvent;
use crate::domain::RenderError;

const INFO_BANNER: &str = "[ TLS Message Information ]";
const CONTENT_BANNER: &str = "[ TLS Content ]";
const END_BANNER: &str = "[ End of TLS Message ]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    function: &'static str,
    process_name: Cow<'a, str>,
    /// Seconds
    elapsed_time: f64,
    pid: u32,
    tid: u32,
    message_size: usize,
    result: i32,
    tls_content: Cow<'a, str>,
}

impl<'a> From<&'a TracedEvent> for JsonEvent<'a> {
    fn from(event: &'a TracedEvent) -> Self {
        Self {
            function: event.function().name(),
            process_name: event.process_name(),
            elapsed_time: event.elapsed_us() as f64 / 1e6,
            pid: event.pid().0,
            tid: event.tid().0,
            message_size: event.content_len(),
            result: event.result(),
            tls_content: event.content_lossy(),
        }
    }
}

/// Render `event` as a JSON object indented by four spaces
///
/// # Errors
/// Returns an error if serialization fails
pub fn render_json(event: &TracedEvent) -> Result<String, RenderError> {
    let mut buf = Vec::new();
    let mut ser =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    JsonEvent::from(event).serialize(&mut ser)?;
    Ok(String::from_utf8(buf)?)
}

/// Render `event` as an information table plus its content
///
/// `timestamp` is the wall-clock time the event was rendered, not when the
/// call happened. With `color` the banners are bold magenta and the content
/// white.
#[must_use]
pub fn render_table(event: &TracedEvent, timestamp: &str, color: bool) -> String {
    let rows = [
        ("Timestamp", timestamp.to_string()),
        ("Function", event.function().name().to_string()),
        ("Process Name", event.process_name().into_owned()),
        ("PID", event.pid().to_string()),
        ("TID", event.tid().to_string()),
        ("Message Size", format!("{} bytes", event.content_len())),
    ];
    let content = event.content_lossy();

    let mut out = String::new();
    let _ = writeln!(out, "{}", title(INFO_BANNER, color));
    out.push_str(&table(&rows));
    let _ = writeln!(out, "{}", title(CONTENT_BANNER, color));
    if color {
        let _ = writeln!(out, "{}", style(&*content).white());
    } else {
        let _ = writeln!(out, "{content}");
    }
    let _ = writeln!(out, "{}", title(END_BANNER, color));
    out
}

/// Local wall-clock time as `HH:MM:SS.ffffff`
#[must_use]
pub fn timestamp_now() -> String {
    Local::now().format("%H:%M:%S%.6f").to_string()
}

fn title(text: &str, color: bool) -> String {
    if color {
        style(text).magenta().bold().to_string()
    } else {
        text.to_string()
    }
}

fn table(rows: &[(&str, String)]) -> String {
    const HEADER: (&str, &str) = ("DESCRIPTION", "VALUE");

    let width = |cell: &str| cell.chars().count();
    let left = rows.iter().map(|(k, _)| width(k)).fold(width(HEADER.0), usize::max);
    let right = rows.iter().map(|(_, v)| width(v)).fold(width(HEADER.1), usize::max);

    let rule = format!("+{}+{}+\n", "-".repeat(left + 2), "-".repeat(right + 2));
    let row = |k: &str, v: &str| format!("| {k:<left$} | {v:<right$} |\n");

    let mut out = String::new();
    out.push_str(&rule);
    out.push_str(&row(HEADER.0, HEADER.1));
    out.push_str(&rule);
    for (k, v) in rows {
        out.push_str(&row(k, v));
    }
    out.push_str(&rule);
    out
}

/// Formats events for stdout
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    format: OutputFormat,
    color: bool,
}

impl Renderer {
    #[must_use]
    pub fn new(format: OutputFormat, color: bool) -> Self {
        Self { format, color }
    }

    #[must_use]
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// # Errors
    /// Returns an error if JSON serialization fails
    pub fn render(&self, event: &TracedEvent) -> Result<String, RenderError> {
        match self.format {
            OutputFormat::Json => render_json(event),
            OutputFormat::Table => Ok(render_table(event, &timestamp_now(), self.color)),
        }
    }
}
