use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::errors::ServiceError;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// Which form produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    ContactForm,
    CateringRequest,
}

/// An outbound staff notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub template: EmailTemplate,
    pub to: String,
    pub subject: String,
    pub reply_to: Option<String>,
    /// Label/value pairs rendered one per line
    pub fields: Vec<(String, String)>,
}

impl EmailMessage {
    pub fn text_body(&self) -> String {
        self.fields
            .iter()
            .map(|(label, value)| format!("{label}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Mailer errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Email provider error: {0}")]
    Provider(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError>;
}

/// Resend REST API
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
    endpoint: String,
}

#[derive(Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

impl ResendMailer {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            from: from.into(),
            endpoint: RESEND_ENDPOINT.to_string(),
        })
    }

    /// Points the mailer at another endpoint, e.g. a local mock server.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    fn name(&self) -> &'static str {
        "resend"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        let payload = ResendPayload {
            from: &self.from,
            to: [message.to.as_str()],
            subject: &message.subject,
            text: message.text_body(),
            reply_to: message.reply_to.as_deref(),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Provider(format!("{status}: {body}")));
        }
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        info!(
            template = ?message.template,
            to = %message.to,
            subject = %message.subject,
            "email not sent (log mailer)"
        );
        Ok(())
    }
}

/// Keeps sent messages in memory; can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<EmailMessage>>,
    fail: std::sync::atomic::AtomicBool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        match self.sent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(NotificationError::Provider("mailer set to fail".to_string()));
        }
        match self.sent.lock() {
            Ok(mut guard) => guard.push(message.clone()),
            Err(poisoned) => poisoned.into_inner().push(message.clone()),
        }
        Ok(())
    }
}

/// Fire-and-forget delivery of staff notifications.
#[derive(Clone)]
pub struct NotificationService {
    mailer: Arc<dyn Mailer>,
}

impl NotificationService {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    /// Picks the mailer from configuration: Resend when fully configured, otherwise the log mailer.
    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let provider = config
            .email_provider
            .as_deref()
            .map(|p| p.trim().to_ascii_lowercase());
        let mailer: Arc<dyn Mailer> = match (provider.as_deref(), config.email_api_key.as_deref()) {
            (Some("resend"), Some(key)) if config.email_enabled() => {
                Arc::new(ResendMailer::new(key, config.email_from.clone())?)
            }
            (Some(other), _) if other != "resend" => {
                warn!(provider = other, "unsupported email provider, emails will only be logged");
                Arc::new(LogMailer)
            }
            _ => Arc::new(LogMailer),
        };
        Ok(Self::new(mailer))
    }

    pub fn mailer_name(&self) -> &'static str {
        self.mailer.name()
    }

    /// Sends in the background. Failures are logged and never reach the caller.
    #[instrument(skip(self, message), fields(template = ?message.template))]
    pub fn dispatch(&self, message: EmailMessage) -> JoinHandle<()> {
        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            match mailer.send(&message).await {
                Ok(()) => info!(template = ?message.template, mailer = mailer.name(), "notification sent"),
                Err(e) => warn!(template = ?message.template, mailer = mailer.name(), "notification failed: {}", e),
            }
        })
    }
}
