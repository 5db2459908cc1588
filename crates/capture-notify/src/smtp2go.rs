//! SMTP2GO Notifier
//!
//! Sends mail through the SMTP2GO HTTP API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::email::Email;
use crate::error::{NotifyError, Result};
use crate::{Notifier, DEFAULT_SENDER};

const DEFAULT_API_URL: &str = "https://api.smtp2go.com/v3/email/send";

/// SMTP2GO configuration
#[derive(Clone)]
pub struct Smtp2GoConfig {
    pub api_key: String,

    /// From address
    pub sender: String,

    pub api_url: String,
}

impl std::fmt::Debug for Smtp2GoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Smtp2GoConfig")
            .field("api_key", &"[redacted]")
            .field("sender", &self.sender)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl Smtp2GoConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            sender: DEFAULT_SENDER.into(),
            api_url: DEFAULT_API_URL.into(),
        }
    }

    /// Reads `SMTP2GO_API_KEY` (required) and `MAIL_FROM`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("SMTP2GO_API_KEY")
            .map_err(|_| NotifyError::Config("SMTP2GO_API_KEY not set".into()))?;
        if api_key.trim().is_empty() {
            return Err(NotifyError::Config("SMTP2GO_API_KEY is empty".into()));
        }

        let mut config = Self::new(api_key);
        if let Ok(sender) = std::env::var("MAIL_FROM") {
            config.sender = sender;
        }
        Ok(config)
    }
}

#[derive(Serialize)]
struct SendRequest<'a> {
    api_key: &'a str,
    sender: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html_body: &'a str,
}

#[derive(Deserialize, Default)]
struct SendResponse {
    #[serde(default)]
    data: SendData,
}

#[derive(Deserialize, Default)]
struct SendData {
    #[serde(default)]
    succeeded: u32,
    #[serde(default)]
    error: Option<String>,
}

/// SMTP2GO HTTP API client
pub struct Smtp2GoNotifier {
    client: reqwest::Client,
    config: Smtp2GoConfig,
}

impl Smtp2GoNotifier {
    pub fn from_config(config: Smtp2GoConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::from_config(Smtp2GoConfig::from_env()?))
    }

    pub fn sender(&self) -> &str {
        &self.config.sender
    }
}

#[async_trait]
impl Notifier for Smtp2GoNotifier {
    async fn send(&self, email: &Email) -> Result<()> {
        let request = SendRequest {
            api_key: &self.config.api_key,
            sender: &self.config.sender,
            to: [email.to.as_str()],
            subject: &email.subject,
            html_body: &email.html,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body: SendResponse = response.json().await.unwrap_or_default();

        if !status.is_success() || body.data.succeeded == 0 {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                detail: body.data.error.unwrap_or_else(|| "no recipients accepted".into()),
            });
        }

        tracing::debug!(to = %email.to, subject = %email.subject, "Email sent via SMTP2GO");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp2go"
    }
}
