//! Read-only status report over the open pull requests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::github::PullRequest;
use crate::rules::{MIN_REVIEWS_FOR_MERGE, Thresholds, age_at};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PrStatusLabel {
    #[serde(rename = "Draft")]
    Draft,
    #[serde(rename = "Draft Overdue")]
    DraftOverdue,
    #[serde(rename = "Approved")]
    Approved,
    #[serde(rename = "Needs Escalation")]
    NeedsEscalation,
    #[serde(rename = "Needs Approval")]
    NeedsApproval,
    #[serde(rename = "OK")]
    Ok,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrStatus {
    pub number: u64,
    pub title: String,
    pub repo: String,
    pub author: String,
    /// Age in whole seconds.
    pub age_secs: u64,
    pub approved: bool,
    pub review_count: u32,
    pub status: PrStatusLabel,
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PrSummary {
    pub total_prs: usize,
    pub needs_approval: usize,
    pub needs_escalation: usize,
    pub approved: usize,
    pub draft: usize,
    pub prs: Vec<PrStatus>,
}

/// Status label for one pull request.
///
/// Unlike the notification rules, a reviewed pull request reports as
/// Approved even past the merge threshold: this is a state view, not a
/// reminder schedule.
pub fn status_of(pr: &PullRequest, age: Duration, thresholds: &Thresholds) -> PrStatusLabel {
    if pr.draft {
        if age >= thresholds.draft_time {
            PrStatusLabel::DraftOverdue
        } else {
            PrStatusLabel::Draft
        }
    } else if pr.review_count >= MIN_REVIEWS_FOR_MERGE {
        PrStatusLabel::Approved
    } else if age >= thresholds.merge_time {
        PrStatusLabel::NeedsEscalation
    } else if age >= thresholds.approval_time {
        PrStatusLabel::NeedsApproval
    } else {
        PrStatusLabel::Ok
    }
}

/// Build the report as of `now`.
pub fn summarize(prs: &[PullRequest], thresholds: &Thresholds, now: DateTime<Utc>) -> PrSummary {
    let mut summary = PrSummary {
        total_prs: prs.len(),
        ..Default::default()
    };

    for pr in prs {
        let age = age_at(pr, now);
        let status = status_of(pr, age, thresholds);
        match status {
            PrStatusLabel::Draft | PrStatusLabel::DraftOverdue => summary.draft += 1,
            PrStatusLabel::Approved => summary.approved += 1,
            PrStatusLabel::NeedsEscalation => summary.needs_escalation += 1,
            PrStatusLabel::NeedsApproval => summary.needs_approval += 1,
            PrStatusLabel::Ok => {}
        }

        summary.prs.push(PrStatus {
            number: pr.number,
            title: pr.title.clone(),
            repo: pr.repo.clone(),
            author: pr.user.login.clone(),
            age_secs: age.as_secs(),
            approved: pr.approved,
            review_count: pr.review_count,
            status,
            url: pr.url.clone(),
        });
    }

    summary
}
