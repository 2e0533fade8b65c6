#![forbid(unsafe_code)]

//! The injected log sink and its frame-backed tee.
//!
//! Diagnostics flow through `tracing`. A [`FrameLogLayer`] formats events
//! into a shared line buffer; the client drains the buffer into a scrolling
//! log frame once per tick, so everything stays visible on-screen until the
//! framer is torn down. Only the main thread ever touches frames — the
//! layer itself writes nothing but strings.

use std::collections::VecDeque;
use std::fmt::{self, Write as FmtWrite};
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Lines buffered beyond this are dropped oldest-first; the mirror is a
/// diagnostic aid, not an archive.
const MAX_BUFFERED_LINES: usize = 512;

/// Shared line buffer between the tracing layer (any thread) and the client
/// (main thread).
#[derive(Clone, Default)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl LogBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one formatted line.
    pub fn push(&self, line: String) {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        if lines.len() >= MAX_BUFFERED_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Take every pending line, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<String> {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.drain(..).collect()
    }
}

/// Extracts the message and structured fields from a tracing event.
#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.fields.push((field.name().to_string(), rendered));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .push((field.name().to_string(), value.to_string()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .push((field.name().to_string(), value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .push((field.name().to_string(), value.to_string()));
    }
}

/// Fixed-width severity prefix.
fn level_str(level: Level) -> &'static str {
    match level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARN ",
        Level::INFO => "INFO ",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

/// A `tracing_subscriber::Layer` that mirrors formatted events into a
/// [`LogBuffer`].
pub struct FrameLogLayer {
    buffer: LogBuffer,
}

impl FrameLogLayer {
    #[must_use]
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S: Subscriber> Layer<S> for FrameLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let mut line = String::new();
        let _ = write!(line, "{} ", level_str(*event.metadata().level()));
        line.push_str(&visitor.message.unwrap_or_default());
        for (key, value) in &visitor.fields {
            let _ = write!(line, " {key}={value}");
        }
        self.buffer.push(line);
    }
}
