//! Email notifier: SMTP via lettre, paced by a shared rate-limit gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::Notifier;
use super::template::EmailRenderer;
use crate::config::EmailConfig;
use crate::error::{ConfigError, NotifyError};
use crate::github::PullRequest;
use crate::rules::ActionKind;

/// Retry behaviour for a single send.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1 << attempt.min(16))
    }
}

/// Enforces a minimum spacing between consecutive sends.
///
/// The lock is held across the wait so concurrent senders queue up behind
/// each other.
#[derive(Debug)]
pub struct RateGate {
    spacing: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last_sent: Mutex::new(None),
        }
    }

    /// Wait until the next send is allowed and claim the slot.
    pub async fn wait(&self) {
        let mut last = self.last_sent.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.spacing {
                let wait = self.spacing - elapsed;
                debug!(?wait, "Rate limiting: waiting before next email");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Sends notification emails over SMTP.
pub struct EmailNotifier {
    from: String,
    to: Vec<String>,
    /// `None` when emails are skipped.
    transport: Option<SmtpTransport>,
    renderer: Arc<EmailRenderer>,
    gate: RateGate,
    retry: RetryPolicy,
    closed: AtomicBool,
}

impl EmailNotifier {
    /// Create a notifier. SMTP host and port are required unless
    /// `skip_emails` is set.
    pub fn new(
        config: EmailConfig,
        renderer: Arc<EmailRenderer>,
        skip_emails: bool,
    ) -> Result<Self, ConfigError> {
        let transport = if skip_emails {
            None
        } else {
            if config.smtp_host.is_empty() || config.smtp_port == 0 {
                return Err(ConfigError::MissingRequired {
                    key: "email.smtp_host/email.smtp_port".into(),
                    hint: "SMTP configuration is required unless emails are skipped.".into(),
                });
            }
            Some(build_transport(&config)?)
        };

        Ok(Self {
            from: config.from,
            to: config.to,
            transport,
            renderer,
            gate: RateGate::new(config.rate_limit),
            retry: RetryPolicy::default(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn recipients(&self, extra: Option<&str>) -> Vec<String> {
        let mut recipients = self.to.clone();
        if let Some(extra) = extra.map(str::trim).filter(|e| !e.is_empty())
            && !recipients.iter().any(|r| r.eq_ignore_ascii_case(extra))
        {
            recipients.push(extra.to_string());
        }
        recipients
    }

    async fn send_notification(
        &self,
        kind: ActionKind,
        pr: &PullRequest,
        age: Duration,
        threshold: Duration,
        extra_recipient: Option<&str>,
    ) -> Result<(), NotifyError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NotifyError::Closed);
        }

        let recipients = self.recipients(extra_recipient);

        let Some(transport) = self.transport.as_ref() else {
            info!(
                kind = %kind,
                pr = pr.number,
                repo = %pr.repo,
                recipients = ?recipients,
                "[SKIPPED] Would send email"
            );
            return Ok(());
        };

        if recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        let rendered = self.renderer.render(kind, pr, age, threshold);
        let message = build_message(&self.from, &recipients, rendered.subject, rendered.html)?;

        self.gate.wait().await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let transport = transport.clone();
            let email = message.clone();
            let outcome = tokio::task::spawn_blocking(move || transport.send(&email))
                .await
                .map_err(|e| NotifyError::Task(e.to_string()))?;

            match outcome {
                Ok(_) => {
                    info!(kind = %kind, pr = pr.number, repo = %pr.repo, "Email sent");
                    return Ok(());
                }
                Err(e) if attempt >= self.retry.max_attempts => {
                    return Err(NotifyError::RetriesExhausted {
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.retry.delay_after(attempt - 1);
                    warn!(
                        attempt,
                        max = self.retry.max_attempts,
                        ?delay,
                        error = %e,
                        "Email send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send_approval_reminder(
        &self,
        pr: &PullRequest,
        age: Duration,
        threshold: Duration,
    ) -> Result<(), NotifyError> {
        self.send_notification(ActionKind::ApprovalReminder, pr, age, threshold, None)
            .await
    }

    async fn send_merge_reminder(
        &self,
        pr: &PullRequest,
        age: Duration,
        threshold: Duration,
    ) -> Result<(), NotifyError> {
        self.send_notification(ActionKind::MergeReminder, pr, age, threshold, None)
            .await
    }

    async fn send_escalation(
        &self,
        pr: &PullRequest,
        age: Duration,
        threshold: Duration,
        extra_recipient: Option<&str>,
    ) -> Result<(), NotifyError> {
        self.send_notification(ActionKind::Escalation, pr, age, threshold, extra_recipient)
            .await
    }

    async fn send_draft_overdue(
        &self,
        pr: &PullRequest,
        age: Duration,
        threshold: Duration,
    ) -> Result<(), NotifyError> {
        self.send_notification(ActionKind::DraftOverdue, pr, age, threshold, None)
            .await
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Email notifier closed");
        }
    }
}

fn build_transport(config: &EmailConfig) -> Result<SmtpTransport, ConfigError> {
    let relay_error = |e: lettre::transport::smtp::Error| ConfigError::InvalidValue {
        key: "email.smtp_host".into(),
        message: format!("SMTP relay error: {e}"),
    };

    // 465 is implicit TLS, 587 upgrades with STARTTLS, anything else is
    // plain (local relays, test servers).
    let builder = match config.smtp_port {
        465 => SmtpTransport::relay(&config.smtp_host).map_err(relay_error)?,
        587 => SmtpTransport::starttls_relay(&config.smtp_host).map_err(relay_error)?,
        _ => SmtpTransport::builder_dangerous(&config.smtp_host),
    }
    .port(config.smtp_port)
    .timeout(Some(config.rate_timeout));

    let builder = if config.smtp_username.is_empty() {
        builder
    } else {
        let password = config
            .smtp_password
            .as_ref()
            .map(|p| p.expose_secret().to_string())
            .unwrap_or_default();
        builder.credentials(Credentials::new(config.smtp_username.clone(), password))
    };

    Ok(builder.build())
}

fn build_message(
    from: &str,
    recipients: &[String],
    subject: String,
    html: String,
) -> Result<Message, NotifyError> {
    let parse = |address: &str| {
        address
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            })
    };

    let mut builder = Message::builder()
        .from(parse(from)?)
        .subject(subject)
        .header(ContentType::TEXT_HTML);
    for recipient in recipients {
        builder = builder.to(parse(recipient)?);
    }

    builder.body(html).map_err(|e| NotifyError::Build(e.to_string()))
}
