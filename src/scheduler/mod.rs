//! Deferred continuations with two named delay classes.
//!
//! The controller never blocks: work that must wait for the host to finish
//! its current signal turn is parked here and drained by the embedder's pump.
//! `Immediate` defers past the current turn only; `Short` additionally yields
//! the thread so ready-state consumers run first. Time is a logical clock
//! advanced by [`TaskScheduler::advance`], which keeps the ordering
//! guarantees between the two classes explicit and testable.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::preload::StageKind;

/// Default duration of the short yield class.
pub const SHORT_YIELD: Duration = Duration::from_millis(100);

/// Delay class for a scheduled continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldClass {
    /// Zero-length delay; runs on the next pump.
    Immediate,
    /// Fixed short delay; runs once the clock has moved past it.
    Short,
}

/// Continuations the controller parks between host turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTask {
    BeginPreload(StageKind),
    FinishPreload(StageKind),
}

#[derive(Debug)]
struct Entry {
    due: Duration,
    seq: u64,
    task: SystemTask,
}

#[derive(Debug, Default)]
struct SchedulerState {
    now: Duration,
    next_seq: u64,
    entries: Vec<Entry>,
}

/// Cloneable handle to the shared task queue. Clones (held by preload
/// completions) re-enter the same queue the controller drains.
#[derive(Clone)]
pub struct TaskScheduler {
    state: Arc<Mutex<SchedulerState>>,
    short_yield: Duration,
}

impl TaskScheduler {
    pub fn new(short_yield: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState::default())),
            short_yield,
        }
    }

    pub fn short_yield(&self) -> Duration {
        self.short_yield
    }

    pub fn schedule(&self, class: YieldClass, task: SystemTask) {
        let delay = match class {
            YieldClass::Immediate => Duration::ZERO,
            YieldClass::Short => self.short_yield,
        };
        let mut state = self.state.lock().expect("scheduler mutex poisoned");
        let due = state.now + delay;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.push(Entry { due, seq, task });
    }

    /// Move the clock forward and return every task that came due, in
    /// `(due, seq)` order. Tasks scheduled while the caller executes the
    /// returned batch land in the queue for a later pump; a drain never
    /// observes its own side effects.
    pub fn advance(&self, dt: Duration) -> Vec<SystemTask> {
        let mut state = self.state.lock().expect("scheduler mutex poisoned");
        state.now += dt;
        let now = state.now;
        let mut due: Vec<Entry> = Vec::new();
        let mut idx = 0;
        while idx < state.entries.len() {
            if state.entries[idx].due <= now {
                due.push(state.entries.swap_remove(idx));
            } else {
                idx += 1;
            }
        }
        due.sort_by_key(|entry| (entry.due, entry.seq));
        due.into_iter().map(|entry| entry.task).collect()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.entries.len())
            .unwrap_or(0)
    }
}
