//! Run orchestration: fetch, classify, dispatch, aggregate, report.
//!
//! - `batch` — bounded worker pool that classifies and dispatches
//! - `cancel` — cooperative cancellation handle
//! - `result` — per-run counts and dispatch failures
//! - `summary` — read-only status report

pub mod batch;
pub mod cancel;
pub mod result;
pub mod summary;

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

pub use batch::{BatchProcessor, DEFAULT_WORKERS};
pub use cancel::CancelHandle;
pub use result::{DispatchFailure, RunResult};
pub use summary::{PrStatus, PrStatusLabel, PrSummary};

use crate::config::Config;
use crate::error::Result;
use crate::github::{GitHubClient, PullRequestSource};
use crate::notifier::{EmailNotifier, EmailRenderer, Notifier};
use crate::rules::Thresholds;

/// What to watch and how.
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub owner: String,
    pub repos: Vec<String>,
    pub thresholds: Thresholds,
    /// Worker count; zero means [`DEFAULT_WORKERS`].
    pub workers: usize,
}

impl WatcherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            owner: config.github.owner.clone(),
            repos: config.github.repos.clone(),
            thresholds: config.rules.thresholds(),
            workers: config.debug.worker_count(),
        }
    }
}

/// Watches the configured repositories and sends age notifications.
pub struct PrWatcher {
    source: Arc<dyn PullRequestSource>,
    notifier: Arc<dyn Notifier>,
    settings: WatcherSettings,
    processor: BatchProcessor,
    cancel: CancelHandle,
}

impl PrWatcher {
    pub fn new(
        source: Arc<dyn PullRequestSource>,
        notifier: Arc<dyn Notifier>,
        settings: WatcherSettings,
    ) -> Self {
        let processor = BatchProcessor::new(Arc::clone(&notifier), settings.workers);
        Self {
            source,
            notifier,
            settings,
            processor,
            cancel: CancelHandle::new(),
        }
    }

    /// Wire the GitHub client and the email notifier from configuration.
    pub fn from_config(mut config: Config) -> Result<Self> {
        let source =
            GitHubClient::new(config.github.token.take(), config.github.base_url.as_deref())?;
        let settings = WatcherSettings::from_config(&config);
        let skip_emails = config.debug.skip_emails;

        let renderer = Arc::new(EmailRenderer::new(config.email.subject.clone()));
        let notifier = EmailNotifier::new(config.email, renderer, skip_emails)?;

        Ok(Self::new(Arc::new(source), Arc::new(notifier), settings))
    }

    /// Handle that interrupts the pass in progress (and any later pass).
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// One full pass over every open pull request.
    ///
    /// Only a fetch failure is an error; failed notifications are reported
    /// in [`RunResult::failures`].
    pub async fn run_once(&self) -> Result<RunResult> {
        info!(
            owner = %self.settings.owner,
            repos = ?self.settings.repos,
            "Checking PRs"
        );

        let prs = self
            .source
            .fetch_open_pull_requests(&self.settings.owner, &self.settings.repos)
            .await?;
        info!(count = prs.len(), "Processing open PRs (including drafts)");

        let result = self
            .processor
            .run(prs, &self.settings.thresholds, &self.cancel)
            .await;
        report(&result);
        Ok(result)
    }

    /// Fetch one pull request and run it through the same rules and
    /// dispatch path as a full pass.
    pub async fn check_pull_request(&self, repo: &str, number: u64) -> Result<RunResult> {
        info!(repo, pr = number, "Checking specific PR");

        let pr = self
            .source
            .fetch_pull_request(&self.settings.owner, repo, number)
            .await?;

        let mut result = RunResult::default();
        result.record(
            batch::process(&pr, &self.settings.thresholds, self.notifier.as_ref()).await,
        );
        report(&result);
        Ok(result)
    }

    /// Status report over every open pull request. Sends nothing.
    pub async fn summary(&self) -> Result<PrSummary> {
        let prs = self
            .source
            .fetch_open_pull_requests(&self.settings.owner, &self.settings.repos)
            .await?;
        Ok(summary::summarize(&prs, &self.settings.thresholds, Utc::now()))
    }

    /// Cancel any pass in progress and close the notifier.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.notifier.close().await;
    }
}

fn report(result: &RunResult) {
    info!(
        approval_reminders = result.approval_reminders,
        merge_reminders = result.merge_reminders,
        escalations = result.escalations,
        draft_overdue = result.draft_overdue,
        unchanged = result.unchanged,
        "Completed processing"
    );

    if result.has_failures() {
        error!(count = result.failures.len(), "Encountered errors during processing");
        for failure in &result.failures {
            error!("Error: {failure}");
        }
    }
}
