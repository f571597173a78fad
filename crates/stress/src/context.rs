//! Per-command counters.
//!
//! A `CommandContext` is written only by its command's loop and read by the
//! introspection server. Every field is an independent atomic; readers may see
//! values from slightly different moments.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Published counters for one registered command.
#[derive(Debug)]
pub struct CommandContext {
    index: usize,
    label: String,
    function_name: String,
    nstarted: AtomicU64,
    // Milliseconds since the epoch; 0 = never.
    last_started: AtomicI64,
    setup_started: AtomicI64,
    setup_done: AtomicI64,
}

impl CommandContext {
    pub fn new(index: usize, label: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self {
            index,
            label: label.into(),
            function_name: function_name.into(),
            nstarted: AtomicU64::new(0),
            last_started: AtomicI64::new(0),
            setup_started: AtomicI64::new(0),
            setup_done: AtomicI64::new(0),
        }
    }

    /// Position in the registry; also the introspection identifier.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub(crate) fn begin_setup(&self) {
        self.setup_started.store(now_ms(), Ordering::Release);
    }

    pub(crate) fn finish_setup(&self) {
        self.setup_done.store(now_ms(), Ordering::Release);
    }

    /// Count a new iteration and stamp its start. Returns its 1-based number.
    pub(crate) fn begin_iteration(&self) -> u64 {
        let n = self.nstarted.fetch_add(1, Ordering::AcqRel) + 1;
        self.last_started.store(now_ms(), Ordering::Release);
        n
    }

    /// Iterations begun, including one in flight.
    pub fn iterations_started(&self) -> u64 {
        self.nstarted.load(Ordering::Acquire)
    }

    pub fn last_started(&self) -> Option<DateTime<Utc>> {
        from_ms(self.last_started.load(Ordering::Acquire))
    }

    pub fn setup_started(&self) -> Option<DateTime<Utc>> {
        from_ms(self.setup_started.load(Ordering::Acquire))
    }

    pub fn setup_done(&self) -> Option<DateTime<Utc>> {
        from_ms(self.setup_done.load(Ordering::Acquire))
    }

    pub fn is_set_up(&self) -> bool {
        self.setup_done.load(Ordering::Acquire) != 0
    }

    /// Read-only view for monitoring.
    pub fn snapshot(&self) -> CommandSnapshot {
        CommandSnapshot {
            label: self.label.clone(),
            function_name: self.function_name.clone(),
            iterations_started: self.iterations_started(),
            last_started_timestamp: self
                .last_started()
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

/// Monitoring view of one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSnapshot {
    pub label: String,
    pub function_name: String,
    pub iterations_started: u64,
    /// RFC 3339, or `null` before the first iteration.
    pub last_started_timestamp: Option<String>,
}

/// The contexts of every registered command, indexed by registry position.
#[derive(Debug, Clone, Default)]
pub struct ContextTable {
    contexts: Arc<Vec<Arc<CommandContext>>>,
}

impl ContextTable {
    pub fn new(contexts: Vec<Arc<CommandContext>>) -> Self {
        Self {
            contexts: Arc::new(contexts),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Arc<CommandContext>> {
        self.contexts.get(index)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CommandContext>> {
        self.contexts.iter()
    }

    pub fn snapshots(&self) -> Vec<CommandSnapshot> {
        self.iter().map(|ctx| ctx.snapshot()).collect()
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_ms(ms: i64) -> Option<DateTime<Utc>> {
    if ms == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(ms).single()
}
