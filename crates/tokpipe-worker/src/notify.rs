//! Outbound status notifications.
//!
//! Best effort: a channel that fails is logged and skipped, and nothing here
//! ever changes a job. No configured channel means notifications are off.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use tokpipe_models::{Job, JobStatus};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Webhook returned {status}")]
    Rejected { status: u16 },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// Payload shape expected by the webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    /// `{"text": ...}`
    Slack,
    /// `{"content": ...}`
    Discord,
}

/// Chat webhook channel.
pub struct WebhookNotifier {
    http: Client,
    url: String,
    kind: WebhookKind,
}

impl WebhookNotifier {
    pub fn new(http: Client, url: impl Into<String>, kind: WebhookKind) -> Self {
        Self {
            http,
            url: url.into(),
            kind,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        match self.kind {
            WebhookKind::Slack => "slack",
            WebhookKind::Discord => "discord",
        }
    }

    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        let body = match self.kind {
            WebhookKind::Slack => json!({ "text": message }),
            WebhookKind::Discord => json!({ "content": message }),
        };
        let response = self.http.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    pub slack_webhook_url: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub timeout: Option<Duration>,
}

impl NotifierConfig {
    pub fn from_env() -> Self {
        Self {
            slack_webhook_url: std::env::var("NOTIFY_SLACK_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            discord_webhook_url: std::env::var("NOTIFY_DISCORD_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            timeout: std::env::var("NOTIFY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
        }
    }
}

/// Fans a message out to every configured channel.
#[derive(Clone, Default)]
pub struct NotificationHub {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotificationHub {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_config(config: &NotifierConfig) -> Self {
        let http = match Client::builder()
            .timeout(config.timeout.unwrap_or(Duration::from_secs(10)))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!("Notifications disabled, HTTP client failed to build: {}", e);
                return Self::disabled();
            }
        };

        let mut hub = Self::disabled();
        if let Some(url) = &config.slack_webhook_url {
            hub = hub.with(Arc::new(WebhookNotifier::new(http.clone(), url, WebhookKind::Slack)));
        }
        if let Some(url) = &config.discord_webhook_url {
            hub = hub.with(Arc::new(WebhookNotifier::new(http, url, WebhookKind::Discord)));
        }
        hub
    }

    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.notifiers.is_empty()
    }

    /// Deliver to every channel. Returns how many accepted the message.
    pub async fn notify(&self, message: &str) -> usize {
        let mut delivered = 0;
        for notifier in &self.notifiers {
            match notifier.notify(message).await {
                Ok(()) => {
                    delivered += 1;
                    debug!(channel = notifier.name(), "Notification sent");
                }
                Err(e) => warn!(channel = notifier.name(), "Notification failed: {}", e),
            }
        }
        delivered
    }

    /// Announce a terminal job status. Non-terminal jobs are ignored.
    pub async fn notify_job(&self, job: &Job) -> usize {
        match job_message(job) {
            Some(message) if self.is_enabled() => self.notify(&message).await,
            _ => 0,
        }
    }
}

pub fn job_message(job: &Job) -> Option<String> {
    match job.status {
        JobStatus::Done => Some(format!(
            "Posted \"{}\" to TikTok (job {}, post {})",
            job.product_name,
            job.id,
            job.tiktok_post_id.as_deref().unwrap_or("unknown")
        )),
        JobStatus::Failed => Some(format!(
            "Job {} for \"{}\" failed: {}",
            job.id,
            job.product_name,
            job.error.as_deref().unwrap_or("unknown error")
        )),
        JobStatus::Pending | JobStatus::Processing => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokpipe_models::ProductId;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn failed_job() -> Job {
        let mut job = Job::new(ProductId::from("p"), "Desk Lamp", Utc::now());
        job.fail("max retries exceeded: HTTP 503", Utc::now());
        job
    }

    #[tokio::test]
    async fn test_fans_out_and_tolerates_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/slack"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/discord"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let hub = NotificationHub::from_config(&NotifierConfig {
            slack_webhook_url: Some(format!("{}/slack", server.uri())),
            discord_webhook_url: Some(format!("{}/discord", server.uri())),
            timeout: None,
        });
        assert_eq!(hub.notify_job(&failed_job()).await, 1);
    }

    #[tokio::test]
    async fn test_payload_shapes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/d"))
            .and(body_json(json!({"content": "hello"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(
            Client::new(),
            format!("{}/d", server.uri()),
            WebhookKind::Discord,
        );
        notifier.notify("hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_unconfigured_is_disabled() {
        let hub = NotificationHub::from_config(&NotifierConfig::default());
        assert!(!hub.is_enabled());
        assert_eq!(hub.notify_job(&failed_job()).await, 0);
    }

    #[test]
    fn test_only_terminal_jobs_have_messages() {
        let job = Job::new(ProductId::from("p"), "Desk Lamp", Utc::now());
        assert!(job_message(&job).is_none());
        assert!(job_message(&failed_job())
            .unwrap()
            .contains("max retries exceeded"));
    }
}
