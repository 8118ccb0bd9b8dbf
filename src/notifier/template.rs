//! Email subjects and HTML bodies for each notification kind.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::github::PullRequest;
use crate::rules::ActionKind;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const STYLE: &str = r#"
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
        .container { max-width: 600px; margin: 0 auto; padding: 20px; }
        .header { color: white; padding: 15px; border-radius: 5px; margin-bottom: 20px; }
        .pr-info { background-color: #f8f9fa; padding: 15px; border-radius: 5px; margin: 15px 0; }
        .pr-title { font-size: 18px; font-weight: bold; margin-bottom: 10px; }
        .pr-details strong { color: #555; }
        .age-info { padding: 10px; border-radius: 3px; margin: 10px 0; }
        .action-required { background-color: #fff3cd; border: 1px solid #ffeaa7; padding: 15px; border-radius: 5px; margin: 15px 0; }
        .footer { margin-top: 30px; padding-top: 20px; border-top: 1px solid #eee; font-size: 12px; color: #666; }
        .button { display: inline-block; background-color: #007bff; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px; margin: 10px 0; }
"#;

/// A rendered notification ready for the transport.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Per-kind presentation.
struct Look {
    title: &'static str,
    header_color: &'static str,
    age_color: &'static str,
}

fn look(kind: ActionKind) -> Look {
    match kind {
        ActionKind::ApprovalReminder => Look {
            title: "PR Needs Approval",
            header_color: "#ffc107",
            age_color: "#fff3cd",
        },
        ActionKind::MergeReminder => Look {
            title: "PR Ready to Merge",
            header_color: "#28a745",
            age_color: "#d4edda",
        },
        ActionKind::Escalation => Look {
            title: "PR Escalation Required",
            header_color: "#dc3545",
            age_color: "#f8d7da",
        },
        ActionKind::DraftOverdue => Look {
            title: "Draft PR Overdue",
            header_color: "#6c757d",
            age_color: "#e9ecef",
        },
        ActionKind::None => Look {
            title: "PR Age Alert",
            header_color: "#007bff",
            age_color: "#f8f9fa",
        },
    }
}

/// Renders notification emails. Built once at startup and shared.
#[derive(Debug, Clone)]
pub struct EmailRenderer {
    subject_base: String,
}

impl EmailRenderer {
    pub fn new(subject_base: impl Into<String>) -> Self {
        let subject_base = subject_base.into();
        Self {
            subject_base: if subject_base.trim().is_empty() {
                crate::config::DEFAULT_SUBJECT.to_string()
            } else {
                subject_base
            },
        }
    }

    pub fn render(
        &self,
        kind: ActionKind,
        pr: &PullRequest,
        age: Duration,
        threshold: Duration,
    ) -> RenderedEmail {
        RenderedEmail {
            subject: self.subject(kind, pr),
            html: self.body(kind, pr, age, threshold, Utc::now()),
        }
    }

    pub fn subject(&self, kind: ActionKind, pr: &PullRequest) -> String {
        let base = &self.subject_base;
        let (n, repo) = (pr.number, &pr.repo);
        match kind {
            ActionKind::ApprovalReminder => format!("{base} - PR #{n} needs approval ({repo})"),
            ActionKind::MergeReminder => {
                format!("MERGE REMINDER: {base} - PR #{n} ready to merge ({repo})")
            }
            ActionKind::Escalation => {
                format!("ESCALATION: {base} - PR #{n} exceeds merge time ({repo})")
            }
            ActionKind::DraftOverdue => {
                format!("DRAFT OVERDUE: {base} - Draft PR #{n} needs attention ({repo})")
            }
            ActionKind::None => base.clone(),
        }
    }

    pub fn body(
        &self,
        kind: ActionKind,
        pr: &PullRequest,
        age: Duration,
        threshold: Duration,
        generated_at: DateTime<Utc>,
    ) -> String {
        let look = look(kind);
        let age_text = format_duration(age);
        let threshold_text = format_duration(threshold);
        let action = action_text(kind, &age_text, &threshold_text)
            .map(|text| {
                format!(
                    r#"<div class="action-required"><h3>Action Required:</h3><p>{}</p></div>"#,
                    escape_html(&text)
                )
            })
            .unwrap_or_default();
        let review_status = if pr.approved { "Approved" } else { "Pending" };

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <style>{STYLE}</style>
</head>
<body>
    <div class="container">
        <div class="header" style="background-color: {header_color};"><h2>{title}</h2></div>
        <div class="pr-info">
            <div class="pr-title">{pr_title}</div>
            <div class="pr-details">
                <strong>Repository:</strong> {repo}<br>
                <strong>Author:</strong> {author}<br>
                <strong>Branch:</strong> {head} &rarr; {base}<br>
                <strong>Size:</strong> {size} (+{additions} / -{deletions})<br>
                <strong>Created:</strong> {created}<br>
                <strong>Last Updated:</strong> {updated}<br>
                <strong>Reviews:</strong> {reviews} ({review_status})
            </div>
        </div>
        <div class="age-info" style="background-color: {age_color};">
            <strong>Age:</strong> {age_text}<br>
            <strong>Threshold:</strong> {threshold_text}
        </div>
        {action}
        <div style="text-align: center;">
            <a href="{url}" class="button">View Pull Request</a>
        </div>
        <div class="footer">
            <p>This is an automated message from the PR Age Watcher.</p>
            <p>Generated at: {generated}</p>
        </div>
    </div>
</body>
</html>
"#,
            title = look.title,
            header_color = look.header_color,
            age_color = look.age_color,
            pr_title = escape_html(&pr.title),
            repo = escape_html(&pr.repo),
            author = escape_html(&pr.user.login),
            head = escape_html(&pr.head.ref_name),
            base = escape_html(&pr.base.ref_name),
            size = pr.size().label(),
            additions = pr.additions,
            deletions = pr.deletions,
            created = pr.created_at.format(TIMESTAMP_FORMAT),
            updated = pr.updated_at.format(TIMESTAMP_FORMAT),
            reviews = pr.review_count,
            url = escape_html(&pr.url),
            generated = generated_at.format(TIMESTAMP_FORMAT),
        )
    }
}

fn action_text(kind: ActionKind, age: &str, threshold: &str) -> Option<String> {
    match kind {
        ActionKind::ApprovalReminder => Some(format!(
            "This pull request has been open for {age} without approval. Please review and approve if ready."
        )),
        ActionKind::MergeReminder => Some(format!(
            "This pull request has been approved and ready for {age}. Please merge it to complete the review process."
        )),
        ActionKind::Escalation => Some(format!(
            "This pull request has exceeded the merge time threshold of {threshold}. Immediate action is required to review and merge or close this PR."
        )),
        ActionKind::DraftOverdue => Some(format!(
            "This draft pull request has been open for {age} and exceeds the draft time threshold of {threshold}. Please either mark as ready for review or close if no longer needed."
        )),
        ActionKind::None => None,
    }
}

/// Human-readable age: minutes under an hour, fractional hours under a
/// day, whole days and hours beyond.
pub fn format_duration(d: Duration) -> String {
    const HOUR: u64 = 3600;
    const DAY: u64 = 24 * HOUR;

    if d < Duration::from_secs(HOUR) {
        format!("{:.0} minutes", d.as_secs_f64() / 60.0)
    } else if d < Duration::from_secs(DAY) {
        format!("{:.1} hours", d.as_secs_f64() / 3600.0)
    } else {
        let total_hours = d.as_secs() / HOUR;
        let (days, hours) = (total_hours / 24, total_hours % 24);
        if hours == 0 {
            format!("{days} days")
        } else {
            format!("{days} days, {hours} hours")
        }
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
