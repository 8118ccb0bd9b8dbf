//! GitHub REST client for listing open pull requests and their reviews.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderMap, LINK};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::types::{Branch, PullRequest, User, tally_reviews};
use super::PullRequestSource;
use crate::error::{ConfigError, GitHubError};

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Page size for list endpoints (GitHub's maximum).
const PER_PAGE: u32 = 100;

const API_VERSION: &str = "2022-11-28";

const USER_AGENT: &str = concat!("pr-age-watcher/", env!("CARGO_PKG_VERSION"));

/// Pull request as returned by the list and get endpoints.
#[derive(Debug, Deserialize)]
struct ApiPullRequest {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    draft: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    user: Option<User>,
    head: Branch,
    base: Branch,
    #[serde(default)]
    html_url: String,
    // Only present on the single-PR endpoint.
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    changed_files: u64,
}

#[derive(Debug, Deserialize)]
struct ApiReview {
    state: String,
}

/// Authenticated GitHub REST client.
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl GitHubClient {
    /// Create a client. A token is required.
    pub fn new(token: Option<SecretString>, base_url: Option<&str>) -> Result<Self, ConfigError> {
        let token = token
            .filter(|t| !t.expose_secret().trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "github.token".into(),
                hint: "Set it in the config file or export GITHUB_TOKEN.".into(),
            })?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "github".into(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            token,
        })
    }

    /// Fetch one page, returning the decoded body and the next page URL.
    async fn get_page<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<(T, Option<String>), GitHubError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| GitHubError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if is_rate_limited(status, resp.headers()) {
            return Err(GitHubError::RateLimited {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GitHubError::Api {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let next = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_page_url);

        let body = resp.json::<T>().await.map_err(|e| GitHubError::InvalidResponse {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok((body, next))
    }

    /// Follow `Link: rel="next"` until the last page.
    async fn get_all<T: DeserializeOwned>(&self, first: String) -> Result<Vec<T>, GitHubError> {
        let mut items = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next {
            let (page, following): (Vec<T>, _) = self.get_page(&url).await?;
            items.extend(page);
            next = following;
        }
        Ok(items)
    }

    async fn list_open_for_repo(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let url = format!(
            "{}/repos/{owner}/{repo}/pulls?state=open&per_page={PER_PAGE}",
            self.base_url
        );
        let raw: Vec<ApiPullRequest> = self.get_all(url).await?;
        debug!(repo, count = raw.len(), "Listed open pull requests");

        let mut prs = Vec::with_capacity(raw.len());
        for pr in raw {
            let (approved, review_count) = match self.review_state(owner, repo, pr.number).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(repo, pr = pr.number, error = %e, "Failed to check reviews, assuming none");
                    (false, 0)
                }
            };
            prs.push(into_snapshot(repo, pr, approved, review_count));
        }
        Ok(prs)
    }

    /// Resolve `(approved, review_count)` for one pull request.
    async fn review_state(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<(bool, u32), GitHubError> {
        let url = format!(
            "{}/repos/{owner}/{repo}/pulls/{number}/reviews?per_page={PER_PAGE}",
            self.base_url
        );
        let reviews: Vec<ApiReview> = self.get_all(url).await?;
        Ok(tally_reviews(reviews.iter().map(|r| r.state.as_str())))
    }
}

#[async_trait]
impl PullRequestSource for GitHubClient {
    async fn fetch_open_pull_requests(
        &self,
        owner: &str,
        repos: &[String],
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let mut all = Vec::new();
        for repo in repos {
            let prs = self
                .list_open_for_repo(owner, repo)
                .await
                .map_err(|e| GitHubError::Repository {
                    repo: repo.clone(),
                    source: Box::new(e),
                })?;
            all.extend(prs);
        }
        Ok(all)
    }

    async fn fetch_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest, GitHubError> {
        let url = format!("{}/repos/{owner}/{repo}/pulls/{number}", self.base_url);
        let (pr, _): (ApiPullRequest, _) = self.get_page(&url).await?;
        let (approved, review_count) = self.review_state(owner, repo, number).await?;
        Ok(into_snapshot(repo, pr, approved, review_count))
    }
}

fn into_snapshot(repo: &str, pr: ApiPullRequest, approved: bool, review_count: u32) -> PullRequest {
    PullRequest {
        repo: repo.to_string(),
        number: pr.number,
        title: pr.title,
        state: pr.state,
        draft: pr.draft,
        created_at: pr.created_at,
        updated_at: pr.updated_at,
        user: pr.user.unwrap_or_default(),
        head: pr.head,
        base: pr.base,
        url: pr.html_url,
        approved,
        review_count,
        additions: pr.additions,
        deletions: pr.deletions,
        changed_files: pr.changed_files,
    }
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0")
}

/// Extract the `rel="next"` target from a `Link` header.
pub fn next_page_url(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim().replace(' ', "") == "rel=\"next\"");
        if !is_next {
            return None;
        }
        let target = target.trim();
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}
