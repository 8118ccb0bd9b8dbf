use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use pr_age_watcher::config::{Config, DebugConfig, parse_duration};
use pr_age_watcher::watcher::PrWatcher;

/// Watch open pull requests and email reminders when they get old.
#[derive(Debug, Parser)]
#[command(name = "pr-age-watcher", version)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Keep running and check on every interval.
    #[arg(long)]
    watch: bool,

    /// Check interval in watch mode (e.g. 30m, 1h). Defaults to rules.check_interval.
    #[arg(long, value_parser = parse_interval)]
    interval: Option<Duration>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Enable verbose logging.
    #[arg(long)]
    verbose: bool,

    /// Log notifications instead of sending emails.
    #[arg(long)]
    skip_emails: bool,

    /// Check a single pull request, e.g. `api#42`.
    #[arg(long, value_name = "REPO#NUMBER", value_parser = parse_pr_ref, conflicts_with_all = ["watch", "summary"])]
    pr: Option<PrRef>,

    /// Print a JSON status report of all open pull requests and exit.
    #[arg(long, conflicts_with = "watch")]
    summary: bool,
}

#[derive(Debug, Clone)]
struct PrRef {
    repo: String,
    number: u64,
}

fn parse_interval(raw: &str) -> Result<Duration, String> {
    match parse_duration(raw) {
        Ok(d) if d.is_zero() => Err("interval must be greater than zero".into()),
        Ok(d) => Ok(d),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_pr_ref(raw: &str) -> Result<PrRef, String> {
    let (repo, number) = raw
        .rsplit_once('#')
        .ok_or_else(|| format!("expected REPO#NUMBER, got '{raw}'"))?;
    let number = number
        .parse()
        .map_err(|_| format!("'{number}' is not a pull request number"))?;
    if repo.is_empty() {
        return Err("repository name is empty".into());
    }
    Ok(PrRef {
        repo: repo.to_string(),
        number,
    })
}

fn init_tracing(debug: &DebugConfig) {
    let level = if debug.verbose {
        "trace"
    } else if debug.enabled {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!("pr_age_watcher={level},info"))
            }),
        )
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    config.debug.enabled |= cli.debug;
    config.debug.verbose |= cli.verbose;
    config.debug.skip_emails |= cli.skip_emails;

    init_tracing(&config.debug);

    // lettre's TLS needs a process-wide crypto provider. An error only
    // means one is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting GitHub PR Age Watcher");
    info!(config = %cli.config.display(), "Configuration loaded");
    if config.debug.skip_emails {
        info!("Email sending is DISABLED (testing mode)");
    }

    let interval = cli.interval.unwrap_or(config.rules.check_interval);
    let watcher = PrWatcher::from_config(config).context("Failed to set up the watcher")?;

    let cancel = watcher.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping gracefully...");
            cancel.cancel();
        }
    });

    let outcome = if let Some(pr) = cli.pr {
        watcher
            .check_pull_request(&pr.repo, pr.number)
            .await
            .map(|_| ())
            .with_context(|| format!("Failed to check PR {}#{}", pr.repo, pr.number))
    } else if cli.summary {
        match watcher.summary().await {
            Ok(summary) => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to build PR summary")),
        }
    } else if cli.watch {
        watch(&watcher, interval).await;
        Ok(())
    } else {
        info!("Running PR watcher once...");
        watcher
            .run_once()
            .await
            .map(|_| info!("PR check completed successfully"))
            .context("Error checking PRs")
    };

    watcher.close().await;
    outcome
}

/// Check immediately, then on every tick, until cancelled.
async fn watch(watcher: &PrWatcher, interval: Duration) {
    info!(?interval, "Starting PR watcher in watch mode");
    info!("Press Ctrl+C to stop gracefully");

    let cancel = watcher.cancel_handle();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = watcher.run_once().await {
                    error!(error = %e, "Error checking PRs");
                }
            }
        }
    }
}
