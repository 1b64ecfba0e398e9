#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Run status notifications.
//!
//! A sync run ends in one of three messages (updated, extract was empty,
//! failed). [`Notifier`] is the port the run sends them through:
//! [`smtp::SmtpNotifier`] mails them to the profile's recipients and
//! [`LogNotifier`] only writes them to the log, for profiles without email
//! settings.

pub mod messages;
pub mod smtp;

use async_trait::async_trait;

pub use messages::Notification;
pub use smtp::{EmailConfig, SmtpNotifier};

/// Errors from sending a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// A configured address could not be parsed.
    #[error("Invalid email address {address:?}: {source}")]
    Address {
        /// The address as configured.
        address: String,
        /// Underlying error.
        source: lettre::address::AddressError,
    },

    /// The message could not be assembled.
    #[error("Failed to build email: {0}")]
    Message(#[from] lettre::error::Error),

    /// The relay rejected the message or could not be reached.
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// No recipients are configured.
    #[error("No email recipients configured")]
    NoRecipients,
}

/// Delivers run status messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if delivery fails.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        log::info!(
            "Notification (not sent): {}\n{}",
            notification.subject,
            notification.body
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let notification = messages::empty_extract("PRODUCTION", "EDC");
        LogNotifier.send(&notification).await.unwrap();
    }
}
