//! Write-only event sinks.
//!
//! The orchestrator never reads back from a sink; decisions use only the
//! in-memory session history.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};

use super::types::SessionEvent;

/// Destination for [`SessionEvent`] records.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &SessionEvent) -> Result<()>;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: &SessionEvent) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonlEventSink {
    path: PathBuf,
    // Serializes appends from concurrent sessions sharing one file.
    write_lock: Mutex<()>,
}

impl JsonlEventSink {
    /// Create the sink, creating parent directories if needed.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating event log directory {}", parent.display()))?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonlEventSink {
    fn emit(&self, event: &SessionEvent) -> Result<()> {
        let line = serde_json::to_string(event).context("serializing session event")?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening event log {}", self.path.display()))?;
        writeln!(file, "{line}").with_context(|| format!("appending to {}", self.path.display()))
    }
}

/// Keeps events in memory. Used by tests and embedders that forward events elsewhere.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<SessionEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &SessionEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow!("memory sink lock poisoned"))?
            .push(event.clone());
        Ok(())
    }
}
