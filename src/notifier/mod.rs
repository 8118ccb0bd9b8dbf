//! Notification dispatch.
//!
//! - `email` — SMTP notifier with a shared rate-limit gate and retries
//! - `template` — subject lines and HTML bodies, built once at startup

pub mod email;
pub mod template;

use std::time::Duration;

use async_trait::async_trait;

pub use email::{EmailNotifier, RetryPolicy};
pub use template::EmailRenderer;

use crate::error::NotifyError;
use crate::github::PullRequest;

/// Performs the side effect for a classified action.
///
/// Every operation is a single call from the caller's point of view; any
/// retry or pacing happens inside the implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_approval_reminder(
        &self,
        pr: &PullRequest,
        age: Duration,
        threshold: Duration,
    ) -> Result<(), NotifyError>;

    async fn send_merge_reminder(
        &self,
        pr: &PullRequest,
        age: Duration,
        threshold: Duration,
    ) -> Result<(), NotifyError>;

    /// `extra_recipient` is added to the usual recipient list.
    async fn send_escalation(
        &self,
        pr: &PullRequest,
        age: Duration,
        threshold: Duration,
        extra_recipient: Option<&str>,
    ) -> Result<(), NotifyError>;

    async fn send_draft_overdue(
        &self,
        pr: &PullRequest,
        age: Duration,
        threshold: Duration,
    ) -> Result<(), NotifyError>;

    /// Refuse further sends. Idempotent.
    async fn close(&self) {}
}
