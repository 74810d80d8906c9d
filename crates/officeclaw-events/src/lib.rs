//! Durable logs for the `OfficeClaw` world.
//!
//! Two append-only, newline-delimited JSON files back the server: the
//! event timeline that clients replay from a cursor after reconnecting,
//! and the command journal that rebuilds the world after a restart. Both
//! recover what they can from a damaged file and report what they
//! skipped.
//!
//! # Modules
//!
//! - [`timeline`] -- Seq-numbered event window with cursor replay
//! - [`journal`] -- Accepted-command journal
//! - [`ndjson`] -- Decode-or-skip line reader and line appender
//! - [`error`] -- Error types for both logs

pub mod error;
pub mod journal;
pub mod ndjson;
pub mod timeline;

pub use error::{JournalError, TimelineError};
pub use journal::{CommandJournal, JournalLoad};
pub use ndjson::LineReport;
pub use timeline::{
    DEFAULT_MAX_EVENTS, EventTimeline, MIN_MAX_EVENTS, ReplayPage, TimelineOptions, TimelineStats,
};
