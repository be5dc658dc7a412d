//! Finished executions, and snapshots of those still running.
//!
//! [`ExecutionHistory`] is append-only and bounded two ways: records older
//! than `max_age` are dropped, then the oldest records beyond `max_entries`.
//! Records are stored in completion order.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Execution, ExecutionStatus};

// ---------------------------------------------------------------------------
// ExecutionHistory
// ---------------------------------------------------------------------------

/// Per-workflow summary over the records still retained.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Mean duration of terminal executions, in milliseconds.
    pub average_duration_ms: Option<u64>,
}

#[derive(Debug)]
pub struct ExecutionHistory {
    max_entries: usize,
    max_age: chrono::Duration,
    entries: RwLock<VecDeque<Execution>>,
}

impl ExecutionHistory {
    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        Self {
            max_entries: max_entries.max(1),
            max_age: chrono::Duration::from_std(max_age)
                .unwrap_or_else(|_| chrono::Duration::days(365 * 100)),
            entries: RwLock::new(VecDeque::new()),
        }
    }

    /// Store a terminal execution, then prune.
    pub fn append(&self, execution: Execution) {
        let mut entries = self.entries.write();
        entries.push_back(execution);
        self.prune(&mut entries, Utc::now());
    }

    /// Drop records older than `max_age` as of `now`, then trim to
    /// `max_entries`. Returns how many were dropped.
    pub fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        self.prune(&mut entries, now)
    }

    fn prune(&self, entries: &mut VecDeque<Execution>, now: DateTime<Utc>) -> usize {
        let before = entries.len();
        let cutoff = now.checked_sub_signed(self.max_age);
        if let Some(cutoff) = cutoff {
            entries.retain(|e| e.finished_or_started() >= cutoff);
        }
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
        before - entries.len()
    }

    pub fn get(&self, execution_id: Uuid) -> Option<Execution> {
        self.entries
            .read()
            .iter()
            .find(|e| e.id == execution_id)
            .cloned()
    }

    /// Executions of `workflow_id`, newest first.
    pub fn for_workflow(&self, workflow_id: &str, limit: usize) -> Vec<Execution> {
        self.entries
            .read()
            .iter()
            .rev()
            .filter(|e| e.workflow_id == workflow_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Most recent executions across all workflows, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Execution> {
        self.entries.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn stats(&self, workflow_id: &str) -> HistoryStats {
        let entries = self.entries.read();
        let mut stats = HistoryStats::default();
        let mut total_ms = 0u64;
        let mut timed = 0u64;

        for e in entries.iter().filter(|e| e.workflow_id == workflow_id) {
            stats.total += 1;
            match e.status {
                ExecutionStatus::Completed => stats.completed += 1,
                ExecutionStatus::Failed => stats.failed += 1,
                ExecutionStatus::Running => {}
            }
            if let Some(ms) = e.duration_ms {
                total_ms += ms;
                timed += 1;
            }
        }

        stats.average_duration_ms = (timed > 0).then(|| total_ms / timed);
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// ---------------------------------------------------------------------------
// ActiveExecutions
// ---------------------------------------------------------------------------

/// Latest snapshot of every execution still in flight.
///
/// The executor republishes after each state change, which is how a step's
/// `retrying` status becomes visible while it waits out its back-off.
#[derive(Debug, Default)]
pub struct ActiveExecutions {
    running: RwLock<HashMap<Uuid, Execution>>,
}

impl ActiveExecutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, execution: &Execution) {
        self.running.write().insert(execution.id, execution.clone());
    }

    pub fn remove(&self, execution_id: Uuid) {
        self.running.write().remove(&execution_id);
    }

    pub fn get(&self, execution_id: Uuid) -> Option<Execution> {
        self.running.read().get(&execution_id).cloned()
    }

    /// Snapshots, oldest start first.
    pub fn list(&self) -> Vec<Execution> {
        let mut all: Vec<Execution> = self.running.read().values().cloned().collect();
        all.sort_by_key(|e| e.started_at);
        all
    }

    pub fn len(&self) -> usize {
        self.running.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.read().is_empty()
    }
}
