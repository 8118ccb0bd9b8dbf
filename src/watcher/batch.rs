//! Concurrent batch processor: classify and dispatch across a worker pool.
//!
//! Layout of one run:
//! - a feeder task pushes snapshots, in input order, into a bounded work queue
//! - N workers take snapshots off the queue, classify, dispatch, and send an
//!   `Outcome` into a bounded result channel
//! - the `run` future itself drains the result channel into the `RunResult`,
//!   so the accumulator has exactly one writer
//!
//! Cancellation is checked by the feeder before each enqueue and by every
//! worker before taking new work. Dispatches already in flight finish.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info};

use super::cancel::CancelHandle;
use super::result::{Outcome, RunResult};
use crate::github::PullRequest;
use crate::notifier::Notifier;
use crate::rules::{Action, ClassifiedAction, Thresholds, classify};

/// Worker count used when none (or zero) is configured.
pub const DEFAULT_WORKERS: usize = 5;

type WorkQueue = Arc<Mutex<mpsc::Receiver<PullRequest>>>;

/// Runs the rules and dispatches notifications over a bounded worker pool.
pub struct BatchProcessor {
    notifier: Arc<dyn Notifier>,
    workers: usize,
}

impl BatchProcessor {
    /// `workers == 0` falls back to [`DEFAULT_WORKERS`].
    pub fn new(notifier: Arc<dyn Notifier>, workers: usize) -> Self {
        Self {
            notifier,
            workers: if workers == 0 { DEFAULT_WORKERS } else { workers },
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every snapshot and return the aggregate.
    ///
    /// Never fails: dispatch errors are collected in
    /// [`RunResult::failures`]. On cancellation the result covers whatever
    /// finished before workers stopped.
    pub async fn run(
        &self,
        prs: Vec<PullRequest>,
        thresholds: &Thresholds,
        cancel: &CancelHandle,
    ) -> RunResult {
        let total = prs.len();
        if total == 0 {
            return RunResult::default();
        }

        let workers = self.workers.min(total);
        let (work_tx, work_rx) = mpsc::channel::<PullRequest>(workers);
        let (result_tx, mut result_rx) = mpsc::channel::<Outcome>(workers);
        let queue: WorkQueue = Arc::new(Mutex::new(work_rx));
        let thresholds = Arc::new(thresholds.clone());

        debug!(total, workers, "Starting batch");

        let feeder = tokio::spawn(feed(prs, work_tx, cancel.clone()));

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                tokio::spawn(work(
                    id,
                    Arc::clone(&queue),
                    result_tx.clone(),
                    Arc::clone(&self.notifier),
                    Arc::clone(&thresholds),
                    cancel.clone(),
                ))
            })
            .collect();
        // Workers hold the only senders; the loop below ends when they do.
        drop(result_tx);

        let mut result = RunResult::default();
        while let Some(outcome) = result_rx.recv().await {
            result.record(outcome);
        }

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Batch worker task failed");
            }
        }
        if let Err(e) = feeder.await {
            error!(error = %e, "Batch feeder task failed");
        }

        if cancel.is_cancelled() {
            info!(
                evaluated = result.evaluated,
                total, "Batch cancelled before all PRs were processed"
            );
        }
        result
    }
}

async fn feed(prs: Vec<PullRequest>, work_tx: mpsc::Sender<PullRequest>, cancel: CancelHandle) {
    let total = prs.len();
    for (index, pr) in prs.into_iter().enumerate() {
        if cancel.is_cancelled() {
            debug!(queued = index, total, "Feeder stopping: cancelled");
            return;
        }

        debug!(current = index + 1, total, repo = %pr.repo, pr = pr.number, "Processing PR");

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(queued = index, total, "Feeder stopping: cancelled");
                return;
            }
            sent = work_tx.send(pr) => sent,
        };
        if sent.is_err() {
            // Every worker is gone.
            return;
        }
    }
}

async fn work(
    id: usize,
    queue: WorkQueue,
    results: mpsc::Sender<Outcome>,
    notifier: Arc<dyn Notifier>,
    thresholds: Arc<Thresholds>,
    cancel: CancelHandle,
) {
    loop {
        if cancel.is_cancelled() {
            debug!(worker = id, "Worker stopping: cancelled");
            return;
        }

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            pr = async { queue.lock().await.recv().await } => pr,
        };
        let Some(pr) = next else {
            return;
        };

        let outcome = process(&pr, &thresholds, notifier.as_ref()).await;
        if results.send(outcome).await.is_err() {
            return;
        }
    }
}

/// Classify one snapshot and dispatch its action, if any.
pub(crate) async fn process(
    pr: &PullRequest,
    thresholds: &Thresholds,
    notifier: &dyn Notifier,
) -> Outcome {
    let classified = classify(pr, thresholds);
    let kind = classified.action.kind();

    let dispatch = dispatch(notifier, &classified, thresholds.escalation_email.as_deref())
        .await
        .map(|sent| match sent {
            Ok(()) => {
                info!(repo = %pr.repo, pr = pr.number, kind = %kind, "Sent notification");
                Ok(())
            }
            Err(e) => {
                error!(repo = %pr.repo, pr = pr.number, kind = %kind, error = %e, "Failed to send notification");
                Err(e.to_string())
            }
        });

    Outcome {
        pr: pr.id(),
        kind,
        dispatch,
    }
}

/// One notifier call per non-None action.
async fn dispatch(
    notifier: &dyn Notifier,
    classified: &ClassifiedAction<'_>,
    escalation_email: Option<&str>,
) -> Option<Result<(), crate::error::NotifyError>> {
    let pr = classified.pr;
    let sent = match classified.action {
        Action::None => return None,
        Action::ApprovalReminder(t) => {
            notifier.send_approval_reminder(pr, t.age, t.threshold).await
        }
        Action::MergeReminder(t) => notifier.send_merge_reminder(pr, t.age, t.threshold).await,
        Action::Escalation(t) => {
            notifier
                .send_escalation(pr, t.age, t.threshold, escalation_email)
                .await
        }
        Action::DraftOverdue(t) => notifier.send_draft_overdue(pr, t.age, t.threshold).await,
    };
    Some(sent)
}
