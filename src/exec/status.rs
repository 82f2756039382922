//! Per-context execution status
//!
//! The board is created once per batch with every context queued. It is only
//! ever reached through [`super::console::Console`], which owns the lock.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskState {
    Queued,
    Running,
    Completed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub name: String,
    pub state: TaskState,
    /// Set when the task leaves the queue
    pub started: Option<Instant>,
}

/// Target name → status, one entry per distinct target.
#[derive(Debug, Default)]
pub struct StatusBoard {
    entries: BTreeMap<String, TaskStatus>,
}

/// Point-in-time view of a board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    /// Running contexts with their elapsed time, sorted by name
    pub in_flight: Vec<(String, Duration)>,
}

impl StatusBoard {
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = targets
            .into_iter()
            .map(|t| {
                let name = t.into();
                let status = TaskStatus {
                    name: name.clone(),
                    state: TaskState::Queued,
                    started: None,
                };
                (name, status)
            })
            .collect();

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TaskStatus> {
        self.entries.get(name)
    }

    /// Move a queued task to running. Returns false if the transition would
    /// not move the task forward.
    pub fn mark_running(&mut self, name: &str, at: Instant) -> bool {
        self.advance(name, TaskState::Running, Some(at))
    }

    /// Move a task to completed from either queued (cancelled before start)
    /// or running.
    pub fn mark_completed(&mut self, name: &str) -> bool {
        self.advance(name, TaskState::Completed, None)
    }

    fn advance(&mut self, name: &str, next: TaskState, started: Option<Instant>) -> bool {
        let Some(status) = self.entries.get_mut(name) else {
            tracing::warn!("status update for unknown context {name}");
            return false;
        };

        if next <= status.state {
            tracing::warn!(
                "ignoring {} -> {} transition for {name}",
                status.state.as_str(),
                next.as_str()
            );
            return false;
        }

        status.state = next;
        if started.is_some() {
            status.started = started;
        }
        true
    }

    pub fn snapshot(&self, now: Instant) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot {
            total: self.entries.len(),
            ..Default::default()
        };

        // BTreeMap iteration keeps in_flight sorted by name
        for status in self.entries.values() {
            match status.state {
                TaskState::Queued => snapshot.queued += 1,
                TaskState::Completed => snapshot.completed += 1,
                TaskState::Running => {
                    snapshot.running += 1;
                    let elapsed = status
                        .started
                        .map(|s| now.saturating_duration_since(s))
                        .unwrap_or_default();
                    snapshot.in_flight.push((status.name.clone(), elapsed));
                }
            }
        }

        snapshot
    }
}
