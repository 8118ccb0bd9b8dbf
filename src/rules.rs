//! Age rules that decide which notification, if any, a pull request needs.
//!
//! Rules are checked top to bottom and the first match wins:
//! - draft past `draft_time` → DraftOverdue (drafts are otherwise exempt)
//! - past `merge_time` → Escalation, whatever the review count
//! - fewer than two reviews and past `approval_time` → ApprovalReminder
//! - two or more reviews and past `merge_reminder_time` → MergeReminder
//!
//! Everything else is left alone.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::github::PullRequest;

/// Reviews needed before a pull request is treated as ready to merge.
///
/// Counts any non-comment review, not only approvals.
pub const MIN_REVIEWS_FOR_MERGE: u32 = 2;

/// Read-only thresholds shared by every worker of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thresholds {
    pub approval_time: Duration,
    pub merge_reminder_time: Duration,
    pub merge_time: Duration,
    pub draft_time: Duration,
    /// Extra recipient for escalations.
    pub escalation_email: Option<String>,
}

/// Payload-free discriminant of an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    None,
    ApprovalReminder,
    MergeReminder,
    Escalation,
    DraftOverdue,
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ApprovalReminder => "approval reminder",
            Self::MergeReminder => "merge reminder",
            Self::Escalation => "escalation",
            Self::DraftOverdue => "draft overdue",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The age that fired a rule and the threshold it crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub age: Duration,
    pub threshold: Duration,
}

/// The single notification decision for one pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    ApprovalReminder(Trigger),
    MergeReminder(Trigger),
    Escalation(Trigger),
    DraftOverdue(Trigger),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::None => ActionKind::None,
            Self::ApprovalReminder(_) => ActionKind::ApprovalReminder,
            Self::MergeReminder(_) => ActionKind::MergeReminder,
            Self::Escalation(_) => ActionKind::Escalation,
            Self::DraftOverdue(_) => ActionKind::DraftOverdue,
        }
    }

    pub fn trigger(&self) -> Option<Trigger> {
        match self {
            Self::None => None,
            Self::ApprovalReminder(t)
            | Self::MergeReminder(t)
            | Self::Escalation(t)
            | Self::DraftOverdue(t) => Some(*t),
        }
    }
}

/// An [`Action`] together with the snapshot it was derived from.
#[derive(Debug, Clone, Copy)]
pub struct ClassifiedAction<'a> {
    pub pr: &'a PullRequest,
    pub action: Action,
}

/// Age of `pr` at `now`. Creation timestamps in the future count as zero.
pub fn age_at(pr: &PullRequest, now: DateTime<Utc>) -> Duration {
    (now - pr.created_at).to_std().unwrap_or(Duration::ZERO)
}

/// Classify `pr` using the current wall-clock time.
pub fn classify<'a>(pr: &'a PullRequest, thresholds: &Thresholds) -> ClassifiedAction<'a> {
    ClassifiedAction {
        pr,
        action: evaluate(pr, thresholds, Utc::now()),
    }
}

/// Evaluate the rules for `pr` as of `now`.
pub fn evaluate(pr: &PullRequest, thresholds: &Thresholds, now: DateTime<Utc>) -> Action {
    let age = age_at(pr, now);
    let trigger = |threshold| Trigger { age, threshold };

    if pr.draft {
        if age >= thresholds.draft_time {
            debug!(
                repo = %pr.repo,
                pr = pr.number,
                ?age,
                threshold = ?thresholds.draft_time,
                "Draft PR is overdue"
            );
            return Action::DraftOverdue(trigger(thresholds.draft_time));
        }
        return Action::None;
    }

    if age >= thresholds.merge_time {
        debug!(
            repo = %pr.repo,
            pr = pr.number,
            ?age,
            threshold = ?thresholds.merge_time,
            "PR needs escalation"
        );
        return Action::Escalation(trigger(thresholds.merge_time));
    }

    if pr.review_count < MIN_REVIEWS_FOR_MERGE {
        if age >= thresholds.approval_time {
            debug!(
                repo = %pr.repo,
                pr = pr.number,
                ?age,
                reviews = pr.review_count,
                "PR needs approval reminder"
            );
            return Action::ApprovalReminder(trigger(thresholds.approval_time));
        }
    } else if age >= thresholds.merge_reminder_time {
        debug!(
            repo = %pr.repo,
            pr = pr.number,
            ?age,
            reviews = pr.review_count,
            "PR needs merge reminder"
        );
        return Action::MergeReminder(trigger(thresholds.merge_reminder_time));
    }

    Action::None
}
