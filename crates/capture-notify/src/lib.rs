//! # capture-notify
//!
//! Transactional email for qr-capture venue owners.
//!
//! ## Notifiers
//!
//! - **SMTP2GO** (default feature): HTTP API delivery
//! - **Log**: writes the message to the tracing log; used when no mail API key
//!   is configured and in tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use capture_notify::{email, Notifier, Smtp2GoNotifier};
//!
//! let notifier = Smtp2GoNotifier::from_env()?;
//! notifier.send(&email::welcome(&venue, "https://qr.example.com")).await?;
//! ```

pub mod email;
pub mod error;

#[cfg(feature = "smtp2go")]
pub mod smtp2go;

use std::sync::Mutex;

use async_trait::async_trait;

pub use email::Email;
pub use error::{NotifyError, Result};

#[cfg(feature = "smtp2go")]
pub use smtp2go::{Smtp2GoConfig, Smtp2GoNotifier};

/// Sender used when `MAIL_FROM` is unset
pub const DEFAULT_SENDER: &str = "leads@vonbase.com";

/// Delivers outbound email
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;

    /// Short name for logs and health output
    fn name(&self) -> &'static str;
}

/// Logs messages instead of sending them
#[derive(Debug, Default)]
pub struct LogNotifier {
    sent: Mutex<Vec<Email>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages "sent" so far
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, email: &Email) -> Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, "Email (not sent, no mail API configured)");
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_records() {
        let notifier = LogNotifier::new();
        let email = Email {
            to: "a@example.com".into(),
            subject: "s".into(),
            html: "h".into(),
        };
        notifier.send(&email).await.unwrap();
        assert_eq!(notifier.sent(), vec![email]);
        assert_eq!(notifier.name(), "log");
    }
}
