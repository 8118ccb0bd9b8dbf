//! Per-run aggregate of dispatch outcomes.

use std::fmt;

use serde::Serialize;

use crate::github::PrId;
use crate::rules::ActionKind;

/// A notification that could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub pr: PrId,
    pub kind: ActionKind,
    pub error: String,
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for PR {}: {}", self.kind, self.pr, self.error)
    }
}

/// What happened to one snapshot.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub pr: PrId,
    pub kind: ActionKind,
    /// `None` when nothing was dispatched.
    pub dispatch: Option<Result<(), String>>,
}

/// Counts and failures for one run. Written by a single aggregator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// Snapshots that went through the rules.
    pub evaluated: usize,
    /// Snapshots that needed no notification.
    pub unchanged: usize,
    pub approval_reminders: usize,
    pub merge_reminders: usize,
    pub escalations: usize,
    pub draft_overdue: usize,
    pub failures: Vec<DispatchFailure>,
}

impl RunResult {
    pub(crate) fn record(&mut self, outcome: Outcome) {
        self.evaluated += 1;
        match outcome.dispatch {
            None => self.unchanged += 1,
            Some(Ok(())) => *self.counter(outcome.kind) += 1,
            Some(Err(error)) => self.failures.push(DispatchFailure {
                pr: outcome.pr,
                kind: outcome.kind,
                error,
            }),
        }
    }

    fn counter(&mut self, kind: ActionKind) -> &mut usize {
        match kind {
            ActionKind::ApprovalReminder => &mut self.approval_reminders,
            ActionKind::MergeReminder => &mut self.merge_reminders,
            ActionKind::Escalation => &mut self.escalations,
            ActionKind::DraftOverdue => &mut self.draft_overdue,
            ActionKind::None => &mut self.unchanged,
        }
    }

    /// Successful sends for `kind`.
    pub fn count(&self, kind: ActionKind) -> usize {
        match kind {
            ActionKind::ApprovalReminder => self.approval_reminders,
            ActionKind::MergeReminder => self.merge_reminders,
            ActionKind::Escalation => self.escalations,
            ActionKind::DraftOverdue => self.draft_overdue,
            ActionKind::None => self.unchanged,
        }
    }

    /// Notifications delivered across all kinds.
    pub fn sent(&self) -> usize {
        self.approval_reminders + self.merge_reminders + self.escalations + self.draft_overdue
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
