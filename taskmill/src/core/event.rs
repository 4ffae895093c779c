//! Append-only events describing one agent run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::summary::Summary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AssistantMessage,
    Tool,
    Command,
    Error,
    Summary,
    Debug,
}

/// One entry in a run's event stream. The stream is the sole observable trace
/// of a run; per-stream ordering is preserved by the sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
}

impl LogEvent {
    fn base(kind: EventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            content: None,
            tool: None,
            command: None,
            exit_code: None,
            summary: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::base(EventKind::AssistantMessage)
        }
    }

    pub fn tool(name: impl Into<String>, content: Option<String>) -> Self {
        Self {
            tool: Some(name.into()),
            content,
            ..Self::base(EventKind::Tool)
        }
    }

    pub fn command(argv: Vec<String>, exit_code: Option<i32>) -> Self {
        Self {
            command: Some(argv),
            exit_code,
            ..Self::base(EventKind::Command)
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::base(EventKind::Error)
        }
    }

    pub fn summary(summary: Summary) -> Self {
        Self {
            summary: Some(summary),
            ..Self::base(EventKind::Summary)
        }
    }

    pub fn debug(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::base(EventKind::Debug)
        }
    }
}
