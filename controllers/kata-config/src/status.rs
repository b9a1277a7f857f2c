//! Status deltas and their aggregation
//!
//! Reconcile steps never write status themselves. Each step reports what
//! changed as a [`StatusDelta`]; the [`StatusAggregator`] folds the deltas
//! over the snapshot read at the start of the reconcile and yields at most
//! one status to write.

use chrono::{DateTime, Utc};
use crds::{CompletedStatus, FailedNode, FailedStatus, InProgressStatus, KataConfigStatus, RolloutStatus};

/// Per-node classification of a rollout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeProgress {
    pub in_progress: Vec<String>,
    pub completed: Vec<String>,
    pub failed: Vec<FailedNode>,
}

impl NodeProgress {
    fn apply_to(&self, rollout: &mut RolloutStatus) {
        rollout.in_progress = InProgressStatus {
            in_progress_nodes_count: count(self.in_progress.len()),
            nodes_list: self.in_progress.clone(),
        };
        rollout.completed = CompletedStatus {
            completed_nodes_count: count(self.completed.len()),
            completed_nodes_list: self.completed.clone(),
        };
        rollout.failed = FailedStatus {
            failed_nodes_count: count(self.failed.len()),
            failed_nodes_list: self.failed.clone(),
        };
    }
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// One change to the KataConfig status
#[derive(Debug, Clone, PartialEq)]
pub enum StatusDelta {
    TotalNodes(usize),
    BaseGeneration(i64),
    InstallProgress(NodeProgress),
    UninstallProgress(NodeProgress),
    InstallError(Option<String>),
    UninstallError(Option<String>),
    RuntimeClasses(Vec<String>),
    Installed(bool),
}

/// Folds deltas over the status snapshot of one reconcile
#[derive(Debug, Clone)]
pub struct StatusAggregator {
    snapshot: KataConfigStatus,
    deltas: Vec<StatusDelta>,
}

impl StatusAggregator {
    pub fn new(snapshot: Option<&KataConfigStatus>) -> Self {
        Self {
            snapshot: snapshot.cloned().unwrap_or_default(),
            deltas: Vec::new(),
        }
    }

    pub fn push(&mut self, delta: StatusDelta) {
        self.deltas.push(delta);
    }

    /// Status as read at the start of the reconcile
    pub fn snapshot(&self) -> &KataConfigStatus {
        &self.snapshot
    }

    /// Status with every delta so far applied
    pub fn view(&self, now: DateTime<Utc>) -> KataConfigStatus {
        let mut status = self.snapshot.clone();
        for delta in &self.deltas {
            apply(&mut status, delta, now);
        }
        status
    }

    /// Status to write, or `None` when nothing changed
    pub fn finish(&self, now: DateTime<Utc>) -> Option<KataConfigStatus> {
        let status = self.view(now);
        (status != self.snapshot).then_some(status)
    }

    /// Take a written status as the new snapshot
    pub fn commit(&mut self, written: KataConfigStatus) {
        self.snapshot = written;
        self.deltas.clear();
    }
}

fn apply(status: &mut KataConfigStatus, delta: &StatusDelta, now: DateTime<Utc>) {
    match delta {
        StatusDelta::TotalNodes(n) => status.total_nodes_count = count(*n),
        StatusDelta::BaseGeneration(generation) => status.base_mcp_generation = Some(*generation),
        StatusDelta::InstallProgress(progress) => {
            apply_progress(&mut status.installation_status, progress, now);
        }
        StatusDelta::UninstallProgress(progress) => {
            apply_progress(&mut status.uninstallation_status, progress, now);
        }
        StatusDelta::InstallError(message) => {
            status.installation_status.error_message.clone_from(message);
        }
        StatusDelta::UninstallError(message) => {
            status.uninstallation_status.error_message.clone_from(message);
        }
        StatusDelta::RuntimeClasses(names) => {
            status.runtime_classes.clone_from(names);
            status.runtime_class = names.join(",");
        }
        StatusDelta::Installed(installed) => status.installed = *installed,
    }
}

fn apply_progress(rollout: &mut RolloutStatus, progress: &NodeProgress, now: DateTime<Utc>) {
    let mut updated = rollout.clone();
    progress.apply_to(&mut updated);
    // Only a change in node classification moves the timestamp
    if !updated.same_progress(rollout) {
        updated.last_update_time = Some(now);
        *rollout = updated;
    }
}
