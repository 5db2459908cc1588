//! Notification Error Types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NotifyError>;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[cfg(feature = "smtp2go")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The mail API answered but refused the message
    #[error("Mail API rejected message ({status}): {detail}")]
    Rejected { status: u16, detail: String },
}
