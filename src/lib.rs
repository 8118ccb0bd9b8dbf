//! PR Age Watcher: classifies open pull requests by age and sends
//! reminder, escalation and draft-overdue emails.

pub mod config;
pub mod error;
pub mod github;
pub mod notifier;
pub mod rules;
pub mod watcher;
