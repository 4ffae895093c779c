//! Agent subprocess execution.
//!
//! One run spawns the backend binary, drains stdout and stderr on dedicated
//! threads, and polls for exit so cancellation and the deadline are honored
//! without blocking. Stdout decoding is pure (`core::protocol`); this module
//! owns the process, the threads, and the last-message file.

use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{instrument, warn};
use wait_timeout::ChildExt;

use crate::cancel::CancelToken;
use crate::core::event::LogEvent;
use crate::core::extract;
use crate::core::protocol::{self, Decoder, LineOutput, WireFormat};
use crate::core::summary::Summary;
use crate::io::events::{SharedSink, SummarySlot};

/// How long one wait slice lasts between cancellation and deadline checks.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Everything needed to launch one agent process.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub format: WireFormat,
    pub last_message: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("start {binary}: {source}")]
    Start {
        binary: String,
        #[source]
        source: io::Error,
    },
    #[error("agent timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("agent run cancelled")]
    Cancelled,
    #[error("agent exited with {}", exit_label(*code))]
    Exit {
        code: Option<i32>,
        parse_errors: Vec<String>,
    },
    #[error("agent produced no summary")]
    NoSummary { parse_errors: Vec<String> },
}

impl RunError {
    /// Parse issues accrued while decoding the run, attached to failures so
    /// the operator can see why nothing was recovered.
    pub fn parse_errors(&self) -> &[String] {
        match self {
            RunError::Exit { parse_errors, .. } | RunError::NoSummary { parse_errors } => {
                parse_errors
            }
            _ => &[],
        }
    }
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (killed by signal)".to_string(),
    }
}

/// Run one agent process to completion and recover its Summary.
#[instrument(skip_all, fields(binary = invocation.argv.first().map(String::as_str).unwrap_or("")))]
pub fn execute(
    invocation: &Invocation,
    sink: &SharedSink,
    cancel: &CancelToken,
) -> Result<Summary, RunError> {
    if cancel.is_cancelled() {
        return Err(RunError::Cancelled);
    }
    let Some((binary, args)) = invocation.argv.split_first() else {
        return Err(RunError::Start {
            binary: String::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty argv"),
        });
    };

    sink.emit(LogEvent::command(invocation.argv.clone(), None));
    let mut command = Command::new(binary);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &invocation.workdir {
        command.current_dir(dir);
    }
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(source) => {
            sink.emit(LogEvent::error(format!("failed to start {binary}: {source}")));
            return Err(RunError::Start {
                binary: binary.clone(),
                source,
            });
        }
    };

    let stdout = child.stdout.take().expect("stdout is piped");
    let stderr = child.stderr.take().expect("stderr is piped");
    let slot = SummarySlot::default();

    let stdout_sink = sink.clone();
    let stdout_slot = slot.clone();
    let format = invocation.format;
    let stdout_thread = thread::spawn(move || {
        let mut decoder = Decoder::new(format);
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            deposit(&stdout_slot, &stdout_sink, decoder.feed(&line));
        }
        deposit(&stdout_slot, &stdout_sink, decoder.finish());
        let last_text = match decoder.last_text() {
            "" => None,
            text => Some(text.to_string()),
        };
        (last_text, decoder.take_parse_errors())
    });

    let stderr_sink = sink.clone();
    let stderr_thread = thread::spawn(move || {
        for line in BufReader::new(stderr).lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            stderr_sink.emit(LogEvent::error(line));
        }
    });

    let deadline = invocation.timeout.map(|timeout| Instant::now() + timeout);
    let mut timed_out = false;
    let mut cancelled = false;
    let mut status = loop {
        match child.wait_timeout(POLL_INTERVAL) {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {}
            Err(err) => {
                sink.emit(LogEvent::error(format!("wait for agent failed: {err}")));
                break None;
            }
        }
        if cancel.is_cancelled() {
            cancelled = true;
            break None;
        }
        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            timed_out = true;
            break None;
        }
    };
    if status.is_none() {
        // Killing closes the pipes, so the reader threads see EOF and stop.
        let _ = child.kill();
        status = child.wait().ok();
    }

    let (last_text, mut parse_errors) = stdout_thread
        .join()
        .unwrap_or_else(|_| (None, Vec::new()));
    let _ = stderr_thread.join();

    let exit_code = status.as_ref().and_then(|status| status.code());
    sink.emit(LogEvent::command(invocation.argv.clone(), exit_code));

    if cancelled {
        sink.emit(LogEvent::error("run cancelled"));
        return Err(RunError::Cancelled);
    }
    if timed_out {
        let timeout_secs = invocation.timeout.map(|t| t.as_secs()).unwrap_or_default();
        if let Some(path) = &invocation.last_message {
            rewrite_last_message(path, None, last_text.as_deref());
        }
        let err = RunError::Timeout { timeout_secs };
        sink.emit(LogEvent::error(err.to_string()));
        return Err(err);
    }
    if !status.as_ref().is_some_and(|status| status.success()) {
        if let Some(path) = &invocation.last_message {
            rewrite_last_message(path, None, last_text.as_deref());
        }
        let err = RunError::Exit {
            code: exit_code,
            parse_errors,
        };
        sink.emit(LogEvent::error(err.to_string()));
        return Err(err);
    }

    let mut summary = slot.take();
    if summary.is_none()
        && let Some(path) = &invocation.last_message
        && let Some(recovered) = read_last_message(path, &mut parse_errors)
    {
        sink.emit(LogEvent::summary(recovered.clone()));
        summary = Some(recovered);
    }
    if let Some(path) = &invocation.last_message {
        rewrite_last_message(path, summary.as_ref(), last_text.as_deref());
    }
    match summary {
        Some(summary) => Ok(summary),
        None => {
            let err = RunError::NoSummary { parse_errors };
            sink.emit(LogEvent::error(err.to_string()));
            Err(err)
        }
    }
}

fn deposit(slot: &SummarySlot, sink: &SharedSink, output: LineOutput) {
    for event in output.events {
        sink.emit(event);
    }
    if let Some(candidate) = output.candidate {
        sink.emit(LogEvent::summary(candidate.clone()));
        slot.put(candidate);
    }
}

/// Fallback recovery from the backend's last-message file: direct summary
/// JSON, then assistant text, then JSON embedded in plain text.
fn read_last_message(path: &Path, parse_errors: &mut Vec<String>) -> Option<Summary> {
    let raw = fs::read_to_string(path).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => {
            if let Some(summary) = Summary::from_value(&value) {
                return Some(summary);
            }
            let mut text = protocol::assistant_text(&value);
            if text.is_empty()
                && let Some(raw) = value.get("raw").and_then(Value::as_str)
            {
                text = raw.to_string();
            }
            if text.is_empty() {
                return None;
            }
            extract::candidate_from_text(&text)
        }
        Err(err) => {
            if let Some(summary) = extract::candidate_from_text(trimmed) {
                return Some(summary);
            }
            parse_errors.push(format!("last message: {err}"));
            None
        }
    }
}

/// After a run the last-message file holds either the recovered Summary or
/// the final assistant text wrapped as `{"raw": ...}`.
fn rewrite_last_message(path: &Path, summary: Option<&Summary>, last_text: Option<&str>) {
    let rendered = match summary {
        Some(summary) => serde_json::to_string_pretty(summary),
        None => serde_json::to_string_pretty(&serde_json::json!({
            "raw": last_text.unwrap_or_default(),
        })),
    };
    let Ok(mut rendered) = rendered else { return };
    rendered.push('\n');
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(err) = fs::create_dir_all(parent)
    {
        warn!("create {}: {err}", parent.display());
        return;
    }
    if let Err(err) = fs::write(path, rendered) {
        warn!("rewrite {}: {err}", path.display());
    }
}
