//! SMTP delivery through an authenticated relay (STARTTLS).

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport as _, Message, Tokio1Executor};
use serde::Deserialize;

use crate::{Notification, Notifier, NotifyError};

fn default_port() -> u16 {
    587
}

fn default_subject_prefix() -> String {
    "PRODUCTION".to_string()
}

/// Mail relay settings for one profile.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct EmailConfig {
    /// Relay host name.
    pub relay: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login name. Also the sender when `from` is not set.
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Leads every subject line (`PRODUCTION`, `TEST`, ...).
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("relay", &self.relay)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("recipients", &self.recipients)
            .field("subject_prefix", &self.subject_prefix)
            .finish()
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .trim()
        .parse()
        .map_err(|source| NotifyError::Address {
            address: address.to_string(),
            source,
        })
}

/// Sends notifications as plain-text email.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl SmtpNotifier {
    /// Validates the addresses and prepares the relay connection. Nothing
    /// is sent until [`Notifier::send`].
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if an address is invalid, no recipients are
    /// configured, or the relay host is unusable.
    pub fn new(config: &EmailConfig) -> Result<Self, NotifyError> {
        let (from, recipients) = mailboxes(config)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.relay)?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from,
            recipients,
        })
    }

    fn message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(notification.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }
        Ok(builder.body(notification.body.clone())?)
    }
}

/// Sender and recipient mailboxes from `config`.
fn mailboxes(config: &EmailConfig) -> Result<(Mailbox, Vec<Mailbox>), NotifyError> {
    let from = parse_mailbox(config.from.as_deref().unwrap_or(&config.username))?;
    let recipients = config
        .recipients
        .iter()
        .map(|r| parse_mailbox(r))
        .collect::<Result<Vec<_>, _>>()?;

    if recipients.is_empty() {
        return Err(NotifyError::NoRecipients);
    }

    Ok((from, recipients))
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = self.message(notification)?;
        log::info!(
            "Emailing {} recipient(s): {}",
            self.recipients.len(),
            notification.subject
        );
        self.transport.send(message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(recipients: &[&str]) -> EmailConfig {
        EmailConfig {
            relay: "smtp.example.org".to_string(),
            port: default_port(),
            username: "gis-alerts@example.org".to_string(),
            password: "hunter2".to_string(),
            from: None,
            recipients: recipients.iter().map(|r| (*r).to_string()).collect(),
            subject_prefix: default_subject_prefix(),
        }
    }

    #[test]
    fn defaults_fill_port_and_prefix() {
        let config: EmailConfig = serde_json::from_str(
            r#"{
                "relay": "smtp.example.org",
                "username": "gis@example.org",
                "password": "pw",
                "recipients": ["a@example.org"]
            }"#,
        )
        .unwrap();
        assert_eq!(config.port, 587);
        assert_eq!(config.subject_prefix, "PRODUCTION");
        assert_eq!(config.from, None);
    }

    #[test]
    fn sender_defaults_to_login() {
        let (from, recipients) = mailboxes(&config(&["a@example.org", "b@example.org"])).unwrap();
        assert_eq!(from.email.to_string(), "gis-alerts@example.org");
        assert_eq!(recipients.len(), 2);
    }

    #[test]
    fn explicit_sender_wins() {
        let mut config = config(&["a@example.org"]);
        config.from = Some("Parcel Sync <parcels@example.org>".to_string());
        let (from, _) = mailboxes(&config).unwrap();
        assert_eq!(from.email.to_string(), "parcels@example.org");
        assert_eq!(from.name.as_deref(), Some("Parcel Sync"));
    }

    #[test]
    fn rejects_bad_recipient() {
        let err = mailboxes(&config(&["not an address"])).unwrap_err();
        assert!(matches!(err, NotifyError::Address { .. }));
    }

    #[test]
    fn requires_a_recipient() {
        assert!(matches!(
            mailboxes(&config(&[])),
            Err(NotifyError::NoRecipients)
        ));
    }

    #[test]
    fn debug_output_hides_password() {
        let rendered = format!("{:?}", config(&["a@example.org"]));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn builds_plain_text_message_for_every_recipient() {
        let notifier = SmtpNotifier::new(&config(&["a@example.org", "b@example.org"])).unwrap();
        let message = notifier
            .message(&Notification {
                subject: "PRODUCTION - test".to_string(),
                body: "hello".to_string(),
            })
            .unwrap();

        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Subject: PRODUCTION - test"));
        assert!(formatted.contains("a@example.org"));
        assert!(formatted.contains("b@example.org"));
        assert!(formatted.contains("Content-Type: text/plain"));
        assert_eq!(message.envelope().to().len(), 2);
    }
}
