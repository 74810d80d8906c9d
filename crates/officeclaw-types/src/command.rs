//! Command payloads, outcomes and journal records.
//!
//! A command travels as `{name, data}`. The store answers every command
//! with a [`CommandOutcome`]; accepted commands are appended to the durable
//! journal as a [`JournalRecord`] so the world can be rebuilt on boot.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

use crate::enums::ErrorCode;
use crate::ids::SessionId;

/// A client command as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CommandPayload {
    /// Command name from the fixed vocabulary (`assign_task`, ...).
    pub name: String,
    /// Command-specific fields.
    pub data: Value,
}

impl CommandPayload {
    /// Build a payload from a name and a JSON object of fields.
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Interpret a raw JSON value as a command payload.
    ///
    /// Returns `None` unless the value is an object with a string `name`
    /// and an object `data`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?;
        let data = value.get("data")?;
        if !data.is_object() {
            return None;
        }
        Some(Self::new(name, data.clone()))
    }

    /// Borrow the `data` object, if it is one.
    pub fn data_object(&self) -> Option<&Map<String, Value>> {
        self.data.as_object()
    }
}

/// Result of applying one command to the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CommandOutcome {
    /// Whether the command was applied.
    pub ok: bool,
    /// Rejection code when `ok` is false.
    pub code: Option<ErrorCode>,
    /// Human-readable rejection message when `ok` is false.
    pub message: Option<String>,
}

impl CommandOutcome {
    /// An accepted command.
    pub const fn accepted() -> Self {
        Self {
            ok: true,
            code: None,
            message: None,
        }
    }

    /// A rejected command.
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            code: Some(code),
            message: Some(message.into()),
        }
    }

    /// Whether the command was applied.
    pub const fn is_ok(&self) -> bool {
        self.ok
    }
}

/// Where an accepted command came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CommandContext {
    /// Id of the client message that carried the command.
    pub in_reply_to: String,
    /// Session that sent it, absent for operator-injected commands.
    pub session_id: Option<SessionId>,
}

/// One line of the durable command journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Strictly increasing position in the journal, starting at 1.
    pub journal_seq: u64,
    /// Write time in epoch milliseconds.
    #[serde(default)]
    pub ts: i64,
    /// The command exactly as it was accepted.
    pub command: Value,
    /// Origin of the command.
    #[serde(default)]
    pub context: Option<CommandContext>,
}
