//! # Control protocol exchanged between a supervisor and its workers.
//!
//! Every message travels inside an [`Envelope`] whose single `control` field
//! carries either a [`Command`] (master → worker) or a [`Status`] (worker → master):
//!
//! ```text
//! master ──► worker   { "control": { "action": "start" | "stop" } }
//! worker ──► master   { "control": { "status": "ready" | "started" | "stopped", "title": "..." } }
//! ```
//!
//! ## Rules
//! - Payloads without a `control` wrapper are **ignored** by both sides ([`decode`] returns `Ok(None)`).
//! - A command with an unknown `action` yields [`ProtocolError::UnknownAction`]; callers log and drop it.
//! - On stdio transports each envelope is one line of JSON ([`encode`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Action requested by the master.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Stop,
}

/// Lifecycle status reported by a worker.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// Process exists and its protocol engine is listening.
    Ready,
    /// Start hook completed.
    Started,
    /// Stop hook completed.
    Stopped,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Ready => "ready",
            StatusKind::Started => "started",
            StatusKind::Stopped => "stopped",
        }
    }
}

/// Master → worker command.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command {
    pub action: Action,
}

impl Command {
    pub const START: Command = Command {
        action: Action::Start,
    };
    pub const STOP: Command = Command {
        action: Action::Stop,
    };
}

/// Worker → master status report.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub status: StatusKind,
    #[serde(default)]
    pub title: String,
}

impl Status {
    pub fn new(status: StatusKind, title: impl Into<String>) -> Self {
        Self {
            status,
            title: title.into(),
        }
    }
}

/// Payload of an [`Envelope`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum Control {
    Command(Command),
    Status(Status),
}

impl From<Command> for Control {
    fn from(c: Command) -> Self {
        Control::Command(c)
    }
}

impl From<Status> for Control {
    fn from(s: Status) -> Self {
        Control::Status(s)
    }
}

/// Wire wrapper around a [`Control`] payload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub control: Control,
}

impl Envelope {
    pub fn new(control: impl Into<Control>) -> Self {
        Self {
            control: control.into(),
        }
    }
}

/// Serializes a control payload as a single JSON line (no trailing newline).
pub fn encode(control: impl Into<Control>) -> Result<String, ProtocolError> {
    serde_json::to_string(&Envelope::new(control)).map_err(ProtocolError::Malformed)
}

/// Decodes one received payload.
///
/// Returns `Ok(None)` when the payload is not an envelope at all (not JSON, not an
/// object, or no `control` field); such payloads are not errors.
pub fn decode(raw: &str) -> Result<Option<Control>, ProtocolError> {
    let value: Value = match serde_json::from_str(raw.trim()) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    let Some(control) = value.get("control") else {
        return Ok(None);
    };

    if let Some(action) = control.get("action").and_then(Value::as_str) {
        if !matches!(action, "start" | "stop") {
            return Err(ProtocolError::UnknownAction(action.to_string()));
        }
    }
    serde_json::from_value(control.clone())
        .map(Some)
        .map_err(ProtocolError::Malformed)
}
