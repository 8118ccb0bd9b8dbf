//! Error types for the PR age watcher.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("GitHub error: {0}")]
    GitHub(#[from] GitHubError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the GitHub data-retrieval layer.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("Failed to get PRs for repo {repo}: {source}")]
    Repository {
        repo: String,
        #[source]
        source: Box<GitHubError>,
    },

    #[error("HTTP request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("GitHub API returned {status} for {url}: {body}")]
    Api {
        url: String,
        status: u16,
        body: String,
    },

    #[error("GitHub rate limit exceeded for {url}")]
    RateLimited { url: String },

    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

/// Errors from a notification dispatch.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Email notifier is closed")]
    Closed,

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("No recipients configured")]
    NoRecipients,

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Failed to send email after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },

    #[error("Send task failed: {0}")]
    Task(String),
}

/// Result type alias for the watcher.
pub type Result<T> = std::result::Result<T, Error>;
