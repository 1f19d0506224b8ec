//! Structured event records for observability.
//!
//! Every agent call and every session start/end is emitted as one
//! [`SessionEvent`] to a write-only [`EventSink`]. The default durable sink
//! is an append-only JSONL file.
//!
//! ```text
//! ┌──────────────┐  emit   ┌──────────────┐
//! │ Orchestrator │────────▶│  EventSink   │──▶ logs/triad_sessions.jsonl
//! │   + agents   │         │ (write-only) │
//! └──────────────┘         └──────────────┘
//! ```

pub mod sink;
pub mod types;

pub use sink::{EventSink, JsonlEventSink, MemoryEventSink, NullEventSink};
pub use types::{EventKind, SessionEvent};
