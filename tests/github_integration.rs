//! Integration tests against a mock GitHub REST API.
//!
//! Each test spins up an Axum server on a random port that serves canned
//! pull request and review payloads, then drives the real client and
//! watcher against it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use pr_age_watcher::error::{Error, GitHubError, NotifyError};
use pr_age_watcher::github::{GitHubClient, PullRequest, PullRequestSource};
use pr_age_watcher::notifier::Notifier;
use pr_age_watcher::rules::Thresholds;
use pr_age_watcher::watcher::{PrWatcher, WatcherSettings};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const TOKEN: &str = "test-token";

const HOUR: Duration = Duration::from_secs(3600);

#[derive(Clone)]
struct MockState {
    base_url: String,
}

/// Open pull requests on `acme/api`, as `(number, age_hours, draft)`.
const OPEN_PRS: [(u64, i64, bool); 4] = [(1, 3, false), (2, 5, false), (3, 7, false), (4, 120, true)];

fn pr_json(number: u64, age_hours: i64, draft: bool) -> Value {
    let created = (Utc::now() - chrono::Duration::hours(age_hours)).to_rfc3339();
    json!({
        "number": number,
        "title": format!("Change {number}"),
        "state": "open",
        "draft": draft,
        "created_at": created,
        "updated_at": created,
        "user": { "login": "alice" },
        "head": { "ref": format!("feature-{number}"), "sha": "abc123" },
        "base": { "ref": "main", "sha": "def456" },
        "html_url": format!("https://github.com/acme/api/pull/{number}"),
        "additions": 40,
        "deletions": 2,
        "changed_files": 3
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

/// Two pages: PRs 1 and 2, then PRs 3 and 4.
async fn list_pulls(
    State(state): State<MockState>,
    Path(repo): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if repo != "api" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    assert_eq!(query.get("state").map(String::as_str), Some("open"));

    let page = query.get("page").map(String::as_str).unwrap_or("1");
    let (items, next) = match page {
        "1" => (&OPEN_PRS[..2], true),
        _ => (&OPEN_PRS[2..], false),
    };
    let body: Vec<Value> = items
        .iter()
        .map(|&(n, age, draft)| pr_json(n, age, draft))
        .collect();

    let mut resp = Json(body).into_response();
    if next {
        let link = format!(
            "<{}/repos/acme/api/pulls?state=open&per_page=100&page=2>; rel=\"next\"",
            state.base_url
        );
        resp.headers_mut()
            .insert(header::LINK, link.parse().expect("valid header"));
    }
    resp
}

async fn get_pull(Path((_repo, number)): Path<(String, u64)>) -> Response {
    match OPEN_PRS.iter().find(|(n, _, _)| *n == number) {
        Some(&(n, age, draft)) => Json(pr_json(n, age, draft)).into_response(),
        None => (StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#).into_response(),
    }
}

/// PR 2 has two approvals, PR 3 only a comment, PR 4's reviews fail.
async fn list_reviews(Path((_repo, number)): Path<(String, u64)>) -> Response {
    let states: &[&str] = match number {
        2 => &["APPROVED", "APPROVED"],
        3 => &["COMMENTED"],
        4 => return StatusCode::BAD_GATEWAY.into_response(),
        _ => &[],
    };
    let body: Vec<Value> = states.iter().map(|s| json!({ "state": s })).collect();
    Json(body).into_response()
}

/// Start the mock API on a random port, return its base URL.
async fn start_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let app = Router::new()
        .route("/repos/acme/{repo}/pulls", get(list_pulls))
        .route("/repos/acme/{repo}/pulls/{number}", get(get_pull))
        .route("/repos/acme/{repo}/pulls/{number}/reviews", get(list_reviews))
        .with_state(MockState {
            base_url: base_url.clone(),
        });

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    base_url
}

fn client(base_url: &str) -> GitHubClient {
    GitHubClient::new(Some(SecretString::from(TOKEN)), Some(base_url)).unwrap()
}

/// Records `(number, kind)` for every notification.
#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(u64, &'static str)>>,
}

impl Recorder {
    fn record(&self, pr: &PullRequest, kind: &'static str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((pr.number, kind));
        Ok(())
    }

    fn sent(&self) -> Vec<(u64, &'static str)> {
        let mut sent = self.sent.lock().unwrap().clone();
        sent.sort();
        sent
    }
}

#[async_trait]
impl Notifier for Recorder {
    async fn send_approval_reminder(
        &self,
        pr: &PullRequest,
        _age: Duration,
        _threshold: Duration,
    ) -> Result<(), NotifyError> {
        self.record(pr, "approval")
    }

    async fn send_merge_reminder(
        &self,
        pr: &PullRequest,
        _age: Duration,
        _threshold: Duration,
    ) -> Result<(), NotifyError> {
        self.record(pr, "merge")
    }

    async fn send_escalation(
        &self,
        pr: &PullRequest,
        _age: Duration,
        _threshold: Duration,
        _extra_recipient: Option<&str>,
    ) -> Result<(), NotifyError> {
        self.record(pr, "escalation")
    }

    async fn send_draft_overdue(
        &self,
        pr: &PullRequest,
        _age: Duration,
        _threshold: Duration,
    ) -> Result<(), NotifyError> {
        self.record(pr, "draft")
    }
}

fn settings(repos: &[&str]) -> WatcherSettings {
    WatcherSettings {
        owner: "acme".into(),
        repos: repos.iter().map(|r| r.to_string()).collect(),
        thresholds: Thresholds {
            approval_time: 2 * HOUR,
            merge_reminder_time: 4 * HOUR,
            merge_time: 6 * HOUR,
            draft_time: 96 * HOUR,
            escalation_email: None,
        },
        workers: 3,
    }
}

#[tokio::test]
async fn lists_every_page_with_review_state() {
    timeout(TEST_TIMEOUT, async {
        let base_url = start_server().await;
        let client = client(&base_url);

        let prs = client
            .fetch_open_pull_requests("acme", &["api".to_string()])
            .await
            .unwrap();

        let numbers: Vec<u64> = prs.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);

        let pr2 = &prs[1];
        assert!(pr2.approved);
        assert_eq!(pr2.review_count, 2);
        assert_eq!(pr2.repo, "api");
        assert_eq!(pr2.user.login, "alice");
        assert_eq!(pr2.head.ref_name, "feature-2");

        // Comments don't count as reviews.
        assert_eq!(prs[2].review_count, 0);
        assert!(!prs[2].approved);

        // A failed review lookup degrades to "no reviews".
        assert!(prs[3].draft);
        assert_eq!(prs[3].review_count, 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn fetches_single_pull_request() {
    timeout(TEST_TIMEOUT, async {
        let base_url = start_server().await;
        let client = client(&base_url);

        let pr = client.fetch_pull_request("acme", "api", 2).await.unwrap();
        assert_eq!(pr.number, 2);
        assert_eq!(pr.review_count, 2);
        assert_eq!(pr.total_changes(), 42);

        let err = client.fetch_pull_request("acme", "api", 99).await.unwrap_err();
        assert!(matches!(err, GitHubError::Api { status: 404, .. }));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn server_error_names_the_repository() {
    timeout(TEST_TIMEOUT, async {
        let base_url = start_server().await;
        let client = client(&base_url);

        let err = client
            .fetch_open_pull_requests("acme", &["api".to_string(), "broken".to_string()])
            .await
            .unwrap_err();

        match err {
            GitHubError::Repository { repo, source } => {
                assert_eq!(repo, "broken");
                assert!(matches!(*source, GitHubError::Api { status: 500, .. }));
            }
            other => panic!("expected repository error, got {other:?}"),
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn bad_token_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let base_url = start_server().await;
        let client =
            GitHubClient::new(Some(SecretString::from("wrong")), Some(&base_url)).unwrap();

        let err = client
            .fetch_open_pull_requests("acme", &["api".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("repo api"));
        assert!(matches!(
            err,
            GitHubError::Repository { ref source, .. }
                if matches!(**source, GitHubError::Api { status: 401, .. })
        ));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn watcher_pass_against_mock_api() {
    timeout(TEST_TIMEOUT, async {
        let base_url = start_server().await;
        let notifier = Arc::new(Recorder::default());
        let watcher = PrWatcher::new(
            Arc::new(client(&base_url)),
            notifier.clone(),
            settings(&["api"]),
        );

        let result = watcher.run_once().await.unwrap();

        assert_eq!(result.evaluated, 4);
        assert_eq!(result.approval_reminders, 1);
        assert_eq!(result.merge_reminders, 1);
        assert_eq!(result.escalations, 1);
        assert_eq!(result.draft_overdue, 1);
        assert_eq!(result.unchanged, 0);
        assert!(result.failures.is_empty());

        assert_eq!(
            notifier.sent(),
            vec![(1, "approval"), (2, "merge"), (3, "escalation"), (4, "draft")]
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn watcher_fetch_failure_sends_nothing() {
    timeout(TEST_TIMEOUT, async {
        let base_url = start_server().await;
        let notifier = Arc::new(Recorder::default());
        let watcher = PrWatcher::new(
            Arc::new(client(&base_url)),
            notifier.clone(),
            settings(&["broken"]),
        );

        let err = watcher.run_once().await.unwrap_err();
        assert!(matches!(err, Error::GitHub(GitHubError::Repository { .. })));
        assert!(notifier.sent().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn summary_over_mock_api() {
    timeout(TEST_TIMEOUT, async {
        let base_url = start_server().await;
        let notifier = Arc::new(Recorder::default());
        let watcher = PrWatcher::new(
            Arc::new(client(&base_url)),
            notifier.clone(),
            settings(&["api"]),
        );

        let summary = watcher.summary().await.unwrap();
        assert_eq!(summary.total_prs, 4);
        assert_eq!(summary.needs_approval, 1);
        assert_eq!(summary.approved, 1);
        assert_eq!(summary.needs_escalation, 1);
        assert_eq!(summary.draft, 1);
        assert!(notifier.sent().is_empty());
    })
    .await
    .expect("test timed out");
}
