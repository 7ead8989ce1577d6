//! Best-effort webhook notifications.
//!
//! Delivery failures are logged and otherwise ignored: a notification never
//! changes the outcome of a recovery or stops the loop.
use crate::process::{ProcessHandle, Usage};
use crate::recovery::Escalation;
use crate::target::Target;
use chrono::{DateTime, Local};
use std::time::Duration;

/// What happened to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// No endpoint configured.
    Skipped,
    Sent,
    Failed,
}

pub trait Notify {
    async fn notify(&self, message: &str) -> Delivery;
}

/// Posts `{"text": message}` to a webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookNotifier {
    /// `url = None` builds a notifier that skips every message.
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

impl Notify for WebhookNotifier {
    async fn notify(&self, message: &str) -> Delivery {
        let Some(url) = &self.url else {
            return Delivery::Skipped;
        };

        let result = self
            .client
            .post(url)
            .json(&serde_json::json!({ "text": message }))
            .send()
            .await
            .and_then(|resp| resp.error_for_status());

        match result {
            Ok(_) => {
                tracing::debug!(%url, "notification delivered");
                Delivery::Sent
            }
            Err(e) => {
                tracing::warn!(error = %e, %url, "failed to deliver notification");
                Delivery::Failed
            }
        }
    }
}

fn timestamp(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Message for a threshold trip and the recovery that followed.
pub fn recovery_message(
    target: &Target,
    handle: &ProcessHandle,
    usage: &Usage,
    escalation: &Escalation,
    at: &DateTime<Local>,
) -> String {
    let what = match escalation.succeeded() {
        Some(attempt) => format!("restarted via {}", attempt.strategy),
        None => "recovery failed".to_string(),
    };
    format!(
        "[Watchdog] {target} ({}) {what} at {}. Reason: mem={:.1}MB cpu={:.1}%",
        handle.pid,
        timestamp(at),
        usage.memory_mb,
        usage.cpu_percent
    )
}

/// Message for a start attempt made because no process matched.
pub fn start_message(target: &Target, started: bool, detail: &str, at: &DateTime<Local>) -> String {
    if started {
        format!("[Watchdog] {target}: started at {}.", timestamp(at))
    } else {
        format!(
            "[Watchdog] {target}: not running, start failed at {}: {detail}",
            timestamp(at)
        )
    }
}
