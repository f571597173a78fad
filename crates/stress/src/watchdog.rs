//! Hang detection.
//!
//! A dedicated OS thread watches a table of deadlines, one slot per command.
//! The runner arms a slot before each iteration and disarms it when the
//! iteration returns. If a deadline passes while armed, the configured
//! [`HangAction`] runs. The thread does not depend on the async runtime, so a
//! command that blocks the runtime thread is still caught.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error};

use crate::error::{Result, StressError};

/// Exit status used by [`HangAction::Exit`].
pub const HANG_EXIT_CODE: i32 = 70;

/// Details of an overrun iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HangReport {
    pub slot: usize,
    pub command: String,
    pub iteration: u64,
    pub budget: Duration,
    /// Time since the slot was armed.
    pub elapsed: Duration,
}

impl fmt::Display for HangReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command '{}' hung in iteration {} ({:?} elapsed, budget {:?})",
            self.command, self.iteration, self.elapsed, self.budget
        )
    }
}

/// What happens when a deadline passes.
#[derive(Clone)]
pub enum HangAction {
    /// `std::process::abort`, leaving a core dump.
    Abort,
    /// `std::process::exit` with the given status.
    Exit(i32),
    /// Call back and keep running.
    Custom(Arc<dyn Fn(&HangReport) + Send + Sync>),
}

impl HangAction {
    /// Parse a config name: `abort` or `exit`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "abort" => Some(HangAction::Abort),
            "exit" => Some(HangAction::Exit(HANG_EXIT_CODE)),
            _ => None,
        }
    }

    fn fire(&self, report: &HangReport) {
        error!(
            command = %report.command,
            iteration = report.iteration,
            elapsed_ms = report.elapsed.as_millis() as u64,
            budget_ms = report.budget.as_millis() as u64,
            "watchdog expired"
        );
        match self {
            HangAction::Abort => std::process::abort(),
            HangAction::Exit(code) => std::process::exit(*code),
            HangAction::Custom(callback) => callback(report),
        }
    }
}

impl fmt::Debug for HangAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HangAction::Abort => f.write_str("Abort"),
            HangAction::Exit(code) => f.debug_tuple("Exit").field(code).finish(),
            HangAction::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

struct Deadline {
    command: String,
    iteration: u64,
    armed_at: Instant,
    due: Instant,
}

#[derive(Default)]
struct Table {
    slots: HashMap<usize, Deadline>,
    shutdown: bool,
}

struct Shared {
    table: Mutex<Table>,
    wakeup: Condvar,
    budget: Duration,
    action: HangAction,
}

/// Per-command deadline timers on a background thread.
pub struct Watchdog {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Start the watchdog thread. Every iteration gets `budget`.
    pub fn start(budget: Duration, action: HangAction) -> Result<Self> {
        let shared = Arc::new(Shared {
            table: Mutex::new(Table::default()),
            wakeup: Condvar::new(),
            budget,
            action,
        });
        let worker = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("kvsoak-watchdog".to_string())
            .spawn(move || watch(&worker))
            .map_err(StressError::WatchdogThread)?;
        debug!(budget_ms = budget.as_millis() as u64, "watchdog started");
        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    pub fn budget(&self) -> Duration {
        self.shared.budget
    }

    /// Arm `slot` for one iteration. Fails if the slot is already armed.
    pub fn arm(&self, slot: usize, command: &str, iteration: u64) -> Result<WatchdogGuard> {
        let mut table = self.shared.table.lock();
        if table.slots.contains_key(&slot) {
            return Err(StressError::AlreadyArmed {
                slot,
                command: command.to_string(),
            });
        }
        let now = Instant::now();
        table.slots.insert(
            slot,
            Deadline {
                command: command.to_string(),
                iteration,
                armed_at: now,
                due: now + self.shared.budget,
            },
        );
        drop(table);
        self.shared.wakeup.notify_one();
        Ok(WatchdogGuard {
            shared: Arc::clone(&self.shared),
            slot,
            armed: true,
        })
    }

    pub fn is_armed(&self, slot: usize) -> bool {
        self.shared.table.lock().slots.contains_key(&slot)
    }

    /// Number of armed slots.
    pub fn armed_count(&self) -> usize {
        self.shared.table.lock().slots.len()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shared.table.lock().shutdown = true;
        self.shared.wakeup.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watchdog")
            .field("budget", &self.shared.budget)
            .field("action", &self.shared.action)
            .finish()
    }
}

/// An armed deadline. Disarmed explicitly or on drop.
#[must_use = "dropping the guard disarms the deadline immediately"]
pub struct WatchdogGuard {
    shared: Arc<Shared>,
    slot: usize,
    armed: bool,
}

impl WatchdogGuard {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn disarm(mut self) {
        self.clear();
    }

    fn clear(&mut self) {
        if self.armed {
            self.shared.table.lock().slots.remove(&self.slot);
            self.armed = false;
        }
    }
}

impl Drop for WatchdogGuard {
    fn drop(&mut self) {
        self.clear();
    }
}

fn watch(shared: &Shared) {
    let mut table = shared.table.lock();
    loop {
        if table.shutdown {
            return;
        }
        let now = Instant::now();
        let expired = table
            .slots
            .iter()
            .find(|(_, d)| d.due <= now)
            .map(|(slot, _)| *slot);

        if let Some(slot) = expired {
            if let Some(deadline) = table.slots.remove(&slot) {
                let report = HangReport {
                    slot,
                    command: deadline.command,
                    iteration: deadline.iteration,
                    budget: shared.budget,
                    elapsed: now.duration_since(deadline.armed_at),
                };
                MutexGuard::unlocked(&mut table, || shared.action.fire(&report));
            }
            continue;
        }

        match table.slots.values().map(|d| d.due).min() {
            Some(due) => {
                shared.wakeup.wait_until(&mut table, due);
            }
            None => shared.wakeup.wait(&mut table),
        }
    }
}
