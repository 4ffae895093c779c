//! Event sinks and the summary mailbox shared with reader threads.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::warn;

use crate::core::event::LogEvent;
use crate::core::summary::Summary;

pub trait EventSink: Send {
    fn emit(&mut self, event: &LogEvent) -> Result<()>;
}

/// Appends one JSON object per line to an `events.jsonl` file, flushing per
/// event so a tailing reader sees progress while the agent runs.
pub struct JsonlSink {
    file: File,
}

impl JsonlSink {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        Ok(Self { file })
    }
}

impl EventSink for JsonlSink {
    fn emit(&mut self, event: &LogEvent) -> Result<()> {
        let line = serde_json::to_string(event).context("serialize event")?;
        writeln!(self.file, "{line}").context("write event")?;
        self.file.flush().context("flush event log")?;
        Ok(())
    }
}

/// In-memory sink for tests. Clones share the same backing vector.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap_or_else(|err| err.into_inner()).clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: &LogEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(event.clone());
        Ok(())
    }
}

/// Cloneable handle serializing sink access across the stdout and stderr
/// reader threads. Emit failures are logged, never propagated, so a full
/// disk cannot take down a run mid-flight.
#[derive(Clone)]
pub struct SharedSink {
    inner: Arc<Mutex<Box<dyn EventSink>>>,
}

impl SharedSink {
    pub fn new(sink: impl EventSink + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    pub fn emit(&self, event: LogEvent) {
        let mut sink = self.inner.lock().unwrap_or_else(|err| err.into_inner());
        if let Err(err) = sink.emit(&event) {
            warn!("event sink write failed: {err:#}");
        }
    }
}

/// Single-slot mailbox for the summary candidate a run produces.
///
/// A later candidate replaces an earlier one; `take` empties the slot. Only
/// the stdout reader writes and only the runner reads once the process has
/// exited, so "latest candidate wins" holds by construction.
#[derive(Debug, Default, Clone)]
pub struct SummarySlot {
    inner: Arc<Mutex<Option<Summary>>>,
}

impl SummarySlot {
    /// Deposit a candidate, returning the one it displaced.
    pub fn put(&self, summary: Summary) -> Option<Summary> {
        self.inner
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .replace(summary)
    }

    pub fn take(&self) -> Option<Summary> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner()).take()
    }
}
