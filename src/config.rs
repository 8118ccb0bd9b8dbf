//! Configuration types and loading.
//!
//! Configuration comes from a YAML file. When the file does not exist the
//! same settings are read from environment variables instead. Zero or
//! missing values are replaced by defaults after loading.

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::rules::Thresholds;

pub const DEFAULT_APPROVAL_TIME: Duration = Duration::from_secs(2 * 3600);
pub const DEFAULT_MERGE_REMINDER_TIME: Duration = Duration::from_secs(4 * 3600);
pub const DEFAULT_MERGE_TIME: Duration = Duration::from_secs(6 * 3600);
pub const DEFAULT_DRAFT_TIME: Duration = Duration::from_secs(96 * 3600);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(3600);
pub const DEFAULT_SUBJECT: &str = "PR Age Alert";
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(500);
pub const DEFAULT_RATE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Top-level watcher configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub email: EmailConfig,
    pub rules: RulesConfig,
    pub debug: DebugConfig,
}

/// Where to look for pull requests.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Personal access token used for the REST API.
    pub token: Option<SecretString>,
    /// Organisation or user owning every repository in `repos`.
    pub owner: String,
    pub repos: Vec<String>,
    /// API root for GitHub Enterprise (defaults to `https://api.github.com`).
    pub base_url: Option<String>,
}

/// SMTP settings for outbound notifications.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: Option<SecretString>,
    pub from: String,
    pub to: Vec<String>,
    /// Base subject line; each notification kind decorates it.
    pub subject: String,
    /// Minimum spacing between two consecutive sends.
    #[serde(deserialize_with = "deserialize_duration")]
    pub rate_limit: Duration,
    /// Upper bound on a single SMTP exchange.
    #[serde(deserialize_with = "deserialize_duration")]
    pub rate_timeout: Duration,
}

/// Age thresholds driving the notification rules.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub approval_time: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub merge_reminder_time: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub merge_time: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub draft_time: Duration,
    /// Interval between passes in watch mode when `--interval` is not given.
    #[serde(deserialize_with = "deserialize_duration")]
    pub check_interval: Duration,
    /// Extra recipient added to escalation emails.
    pub escalation_email: Option<String>,
}

impl RulesConfig {
    /// Snapshot the rule thresholds for a run.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            approval_time: self.approval_time,
            merge_reminder_time: self.merge_reminder_time,
            merge_time: self.merge_time,
            draft_time: self.draft_time,
            escalation_email: self
                .escalation_email
                .clone()
                .filter(|email| !email.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub verbose: bool,
    /// Log notifications instead of sending them.
    pub skip_emails: bool,
    /// Worker count for a run. Zero or negative means the default.
    pub concurrency: i64,
}

impl DebugConfig {
    pub fn worker_count(&self) -> usize {
        usize::try_from(self.concurrency)
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_CONCURRENCY)
    }
}

impl Config {
    /// Load configuration from `path`, falling back to the process
    /// environment when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let mut config = Self::from_yaml(&raw)?;
            config.apply_defaults();
            return Ok(config);
        }

        tracing::debug!(path = %path.display(), "Config file not found, reading environment");
        let mut config = Self::from_env_with(|key| std::env::var(key).ok())?;
        config.apply_defaults();
        Ok(config)
    }

    /// Parse YAML without applying defaults.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Build configuration from a variable lookup (the process environment
    /// in production).
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let duration = |key: &str| -> Result<Duration, ConfigError> {
            var(key)
                .map(|v| parse_duration(&v))
                .transpose()
                .map(Option::unwrap_or_default)
        };
        let flag = |key: &str| var(key).is_some_and(|v| v == "true");

        let smtp_port = match var("SMTP_PORT") {
            Some(port) => port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "SMTP_PORT".into(),
                message: format!("'{port}' is not a valid port"),
            })?,
            None => 0,
        };

        let concurrency = match var("CONCURRENCY") {
            Some(n) => n.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "CONCURRENCY".into(),
                message: format!("'{n}' is not an integer"),
            })?,
            None => 0,
        };

        Ok(Self {
            github: GitHubConfig {
                token: var("GITHUB_TOKEN").map(SecretString::from),
                owner: var("GITHUB_OWNER").unwrap_or_default(),
                repos: var("GITHUB_REPOS").map(|v| split_list(&v)).unwrap_or_default(),
                base_url: var("GITHUB_BASE_URL"),
            },
            email: EmailConfig {
                smtp_host: var("SMTP_HOST").unwrap_or_default(),
                smtp_port,
                smtp_username: var("SMTP_USERNAME").unwrap_or_default(),
                smtp_password: var("SMTP_PASSWORD").map(SecretString::from),
                from: var("EMAIL_FROM").unwrap_or_default(),
                to: var("EMAIL_TO").map(|v| split_list(&v)).unwrap_or_default(),
                subject: var("EMAIL_SUBJECT").unwrap_or_default(),
                rate_limit: duration("EMAIL_RATE_LIMIT")?,
                rate_timeout: duration("EMAIL_RATE_TIMEOUT")?,
            },
            rules: RulesConfig {
                approval_time: duration("APPROVAL_TIME")?,
                merge_reminder_time: duration("MERGE_REMINDER_TIME")?,
                merge_time: duration("MERGE_TIME")?,
                draft_time: duration("DRAFT_TIME")?,
                check_interval: duration("CHECK_INTERVAL")?,
                escalation_email: var("ESCALATION_EMAIL"),
            },
            debug: DebugConfig {
                enabled: flag("DEBUG"),
                verbose: flag("VERBOSE"),
                skip_emails: flag("SKIP_EMAILS"),
                concurrency,
            },
        })
    }

    /// Replace zero/empty values with their defaults.
    pub fn apply_defaults(&mut self) {
        fn or_default(value: &mut Duration, default: Duration) {
            if value.is_zero() {
                *value = default;
            }
        }

        or_default(&mut self.rules.approval_time, DEFAULT_APPROVAL_TIME);
        or_default(&mut self.rules.merge_reminder_time, DEFAULT_MERGE_REMINDER_TIME);
        or_default(&mut self.rules.merge_time, DEFAULT_MERGE_TIME);
        or_default(&mut self.rules.draft_time, DEFAULT_DRAFT_TIME);
        or_default(&mut self.rules.check_interval, DEFAULT_CHECK_INTERVAL);
        or_default(&mut self.email.rate_limit, DEFAULT_RATE_LIMIT);
        or_default(&mut self.email.rate_timeout, DEFAULT_RATE_TIMEOUT);

        if self.email.subject.is_empty() {
            self.email.subject = DEFAULT_SUBJECT.to_string();
        }
        if self.debug.concurrency == 0 {
            self.debug.concurrency = DEFAULT_CONCURRENCY as i64;
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse a Go-style duration string such as `2h`, `30m`, `500ms` or
/// `1h30m`. A bare `0` is accepted.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidDuration {
        input: input.to_string(),
        reason,
    };

    let s = input.trim();
    if s.is_empty() {
        return Err(invalid("empty duration".into()));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut seconds = 0f64;
    let mut rest = s;

    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if number_end == 0 {
            return Err(invalid(format!("expected a number at '{rest}'")));
        }
        let value: f64 = rest[..number_end]
            .parse()
            .map_err(|_| invalid(format!("bad number '{}'", &rest[..number_end])))?;

        let after = &rest[number_end..];
        let unit_end = after.find(is_number).unwrap_or(after.len());
        let scale = match &after[..unit_end] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(invalid("missing unit".into())),
            other => return Err(invalid(format!("unknown unit '{other}'"))),
        };

        seconds += value * scale;
        if !seconds.is_finite() {
            return Err(invalid("duration out of range".into()));
        }
        rest = &after[unit_end..];
    }

    Duration::try_from_secs_f64(seconds).map_err(|e| invalid(e.to_string()))
}

/// Accepts either a duration string or a plain number of seconds.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
