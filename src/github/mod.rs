//! GitHub data retrieval: open pull requests with resolved review state.

pub mod client;
pub mod types;

use async_trait::async_trait;

pub use client::GitHubClient;
pub use types::{Branch, PrId, PullRequest, SizeCategory, User};

use crate::error::GitHubError;

/// Source of pull request snapshots for a run.
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    /// All open pull requests across `repos`, fully paginated, with review
    /// count and approval already resolved.
    async fn fetch_open_pull_requests(
        &self,
        owner: &str,
        repos: &[String],
    ) -> Result<Vec<PullRequest>, GitHubError>;

    /// A single pull request by number.
    async fn fetch_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest, GitHubError>;
}
