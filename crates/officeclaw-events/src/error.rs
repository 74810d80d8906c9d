//! Error types for the durable logs.

use std::path::PathBuf;

/// Errors raised by the [`EventTimeline`](crate::EventTimeline).
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    /// The event log could not be read or appended to.
    #[error("event log I/O failed at {}: {source}", path.display())]
    Io {
        /// Event log path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An event could not be encoded as JSON.
    #[error("failed encoding event {seq}: {source}")]
    Encode {
        /// Seq the event would have received.
        seq: u64,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}

/// Errors raised by the [`CommandJournal`](crate::CommandJournal).
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// The journal could not be read or appended to.
    #[error("command journal I/O failed at {}: {source}", path.display())]
    Io {
        /// Journal path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A journal record could not be encoded as JSON.
    #[error("failed encoding journal record {journal_seq}: {source}")]
    Encode {
        /// Seq the record would have received.
        journal_seq: u64,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
}
