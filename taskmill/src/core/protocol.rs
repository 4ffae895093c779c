//! Stdout decoding for the two agent wire formats.
//!
//! Both backends speak NDJSON. Each line is first tagged with an event kind,
//! then a fixed payload shape is extracted for that kind; nothing downstream
//! probes raw JSON keys. Non-JSON lines are plain assistant text in both
//! formats.

use serde_json::Value;

use crate::core::event::LogEvent;
use crate::core::extract::candidate_from_text;
use crate::core::summary::Summary;

/// Which stdout dialect a backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// `type` field (or a `tool`/`command` key) tags each line; untagged
    /// lines are assistant messages.
    Exec,
    /// `assistant` events carry full messages; `content_block_start` /
    /// `content_block_delta` events carry text fragments.
    Stream,
}

/// Exec-format event after tagging.
#[derive(Debug, PartialEq)]
enum ExecEvent {
    Tool { name: String, detail: Option<String> },
    Command { argv: Vec<String>, exit_code: Option<i32> },
    Error { text: String },
    Assistant { text: String },
}

fn tag_exec(value: &Value) -> ExecEvent {
    let tag = match value.get("type").and_then(Value::as_str) {
        Some(tag) => tag,
        None if value.get("tool").is_some() => "tool",
        None if value.get("command").is_some() => "command",
        None => "assistant_message",
    };
    match tag {
        "tool" => ExecEvent::Tool {
            name: value
                .get("tool")
                .or_else(|| value.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            detail: value
                .get("content")
                .or_else(|| value.get("text"))
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        "command" => ExecEvent::Command {
            argv: command_argv(value.get("command")),
            exit_code: value
                .get("exit_code")
                .and_then(Value::as_i64)
                .map(|code| code as i32),
        },
        "error" => {
            let mut text = assistant_text(value);
            if text.is_empty() {
                text = value
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
            }
            ExecEvent::Error { text }
        }
        _ => ExecEvent::Assistant {
            text: assistant_text(value),
        },
    }
}

/// Stream-format event after tagging. Anything else on the wire is ignored.
#[derive(Debug, PartialEq)]
enum StreamEvent {
    Assistant { text: String },
    Fragment { text: String },
    Ignored,
}

fn tag_stream(value: &Value) -> StreamEvent {
    match value.get("type").and_then(Value::as_str) {
        Some("assistant") => StreamEvent::Assistant {
            text: assistant_text(value),
        },
        Some("content_block_start") => StreamEvent::Fragment {
            text: value
                .pointer("/content_block/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        Some("content_block_delta") => StreamEvent::Fragment {
            text: value
                .pointer("/delta/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        _ => StreamEvent::Ignored,
    }
}

/// Assistant text: `message.content[]` entries of `{type: "text", text}`
/// concatenated, else a top-level `content` or `text` string.
pub(crate) fn assistant_text(value: &Value) -> String {
    if let Some(items) = value.pointer("/message/content").and_then(Value::as_array) {
        let mut text = String::new();
        for item in items {
            if item.get("type").and_then(Value::as_str) == Some("text") {
                if let Some(part) = item.get("text").and_then(Value::as_str) {
                    text.push_str(part);
                }
            }
        }
        if !text.is_empty() {
            return text;
        }
    }
    for key in ["content", "text"] {
        if let Some(text) = value.get(key).and_then(Value::as_str) {
            return text.to_string();
        }
    }
    String::new()
}

fn command_argv(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(line)) => vec![line.clone()],
        _ => Vec::new(),
    }
}

/// Events and at most one summary candidate produced by a decode step.
#[derive(Debug, Default)]
pub struct LineOutput {
    pub events: Vec<LogEvent>,
    pub candidate: Option<Summary>,
}

/// Per-run stdout decoder. Feed lines in arrival order, then [`Decoder::finish`]
/// at stream end.
///
/// Summary candidates surface per line; the caller deposits them into the
/// run's summary slot, so a later candidate overwrites an earlier one.
#[derive(Debug)]
pub struct Decoder {
    format: WireFormat,
    /// Text accumulated from delta fragments and raw (non-JSON) lines.
    buffer: String,
    /// True once the buffer holds raw lines that were already emitted as
    /// assistant events; `finish` then extracts without re-emitting.
    buffer_emitted: bool,
    saw_full_message: bool,
    last_text: String,
    parse_errors: Vec<String>,
}

impl Decoder {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            buffer: String::new(),
            buffer_emitted: false,
            saw_full_message: false,
            last_text: String::new(),
            parse_errors: Vec::new(),
        }
    }

    pub fn feed(&mut self, line: &str) -> LineOutput {
        let mut out = LineOutput::default();
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            return out;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(value) => {
                // A line carrying summary fields is a candidate regardless of
                // its event classification.
                out.candidate = Summary::from_value(&value);
                match self.format {
                    WireFormat::Exec => self.feed_exec(&value, &mut out),
                    WireFormat::Stream => self.feed_stream(&value, &mut out),
                }
            }
            Err(err) => {
                if line.trim_start().starts_with('{') {
                    self.parse_errors
                        .push(format!("stdout line is not valid JSON: {err}"));
                    out.events
                        .push(LogEvent::debug(format!("unparseable JSON line: {err}")));
                }
                out.events.push(LogEvent::assistant(line));
                self.append_raw(line);
            }
        }
        out
    }

    /// Flush at stream end. Emits the accumulated fragment text as one
    /// assistant event when no full message superseded it, and attempts a
    /// final extraction from the buffer.
    pub fn finish(&mut self) -> LineOutput {
        let mut out = LineOutput::default();
        if self.buffer.is_empty() || self.saw_full_message {
            self.buffer.clear();
            return out;
        }
        let text = std::mem::take(&mut self.buffer);
        self.last_text = text.clone();
        out.candidate = candidate_from_text(&text);
        if !self.buffer_emitted {
            out.events.push(LogEvent::assistant(text));
        }
        out
    }

    /// Last complete assistant text seen (full message, or the accumulated
    /// buffer after [`Decoder::finish`]).
    pub fn last_text(&self) -> &str {
        &self.last_text
    }

    pub fn take_parse_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.parse_errors)
    }

    fn feed_exec(&mut self, value: &Value, out: &mut LineOutput) {
        match tag_exec(value) {
            ExecEvent::Tool { name, detail } => out.events.push(LogEvent::tool(name, detail)),
            ExecEvent::Command { argv, exit_code } => {
                out.events.push(LogEvent::command(argv, exit_code));
            }
            ExecEvent::Error { text } => out.events.push(LogEvent::error(text)),
            ExecEvent::Assistant { text } => self.full_message(text, value, out),
        }
    }

    fn feed_stream(&mut self, value: &Value, out: &mut LineOutput) {
        match tag_stream(value) {
            StreamEvent::Assistant { text } => self.full_message(text, value, out),
            StreamEvent::Fragment { text } => self.buffer.push_str(&text),
            StreamEvent::Ignored => {}
        }
    }

    /// Handle a full assistant message: it supersedes any accumulated
    /// fragments and is an extraction boundary.
    fn full_message(&mut self, text: String, value: &Value, out: &mut LineOutput) {
        if text.is_empty() {
            // JSON with no recognizable payload; keep the trace complete
            // unless the line already counted as a summary candidate.
            if out.candidate.is_none() {
                out.events.push(LogEvent::debug(value.to_string()));
            }
            return;
        }
        self.saw_full_message = true;
        self.buffer.clear();
        self.buffer_emitted = false;
        self.last_text = text.clone();
        if out.candidate.is_none() {
            out.candidate = candidate_from_text(&text);
        }
        out.events.push(LogEvent::assistant(text));
    }

    fn append_raw(&mut self, line: &str) {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(line);
        self.buffer_emitted = true;
    }
}
