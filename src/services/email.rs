//! Outgoing mail

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    Address,
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub to: Vec<Recipient>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: Mail) -> AppResult<()>;
}

/// Sends mail through an SMTP relay
#[derive(Clone)]
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, mail: &Mail) -> AppResult<Message> {
        let from_name = self.config.smtp_from_name.as_deref().unwrap_or("Library");
        let from_address = self
            .config
            .smtp_from
            .parse::<Address>()
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;
        let from = Mailbox::new(Some(from_name.to_string()), from_address);

        let mut builder = Message::builder().from(from).subject(mail.subject.clone());
        for recipient in &mail.to {
            // Display names are free text; lettre quotes them
            let address = recipient
                .address
                .parse::<Address>()
                .map_err(|e| AppError::Mail(format!("Invalid recipient address: {}", e)))?;
            builder = builder.to(Mailbox::new(Some(recipient.name.clone()), address));
        }

        builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(mail.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(mail.html_body.clone()),
                    ),
            )
            .map_err(|e| AppError::Mail(format!("Failed to build email: {}", e)))
    }

    fn transport(&self) -> AppResult<SmtpTransport> {
        let builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Mail(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let builder = match (&self.config.smtp_username, &self.config.smtp_password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: Mail) -> AppResult<()> {
        if mail.to.is_empty() {
            return Err(AppError::Mail("Mail has no recipients".to_string()));
        }

        let message = self.build_message(&mail)?;
        let transport = self.transport()?;

        // SmtpTransport is blocking
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| AppError::Internal(format!("Mail task failed: {}", e)))?
            .map_err(|e| AppError::Mail(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}

/// Writes mails to the log instead of sending them
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: Mail) -> AppResult<()> {
        let to: Vec<&str> = mail.to.iter().map(|r| r.address.as_str()).collect();
        tracing::info!(subject = %mail.subject, to = ?to, "Mail delivery disabled, not sending");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: Vec<Recipient>) -> Mail {
        Mail {
            subject: "Book Loan".into(),
            text_body: "You have borrowed the book Dune".into(),
            html_body: "You have borrowed a book <br> Borrowed book: Dune".into(),
            to,
        }
    }

    #[test]
    fn test_build_message() {
        let mailer = SmtpMailer::new(EmailConfig::default());
        let message = mailer
            .build_message(&mail(vec![Recipient {
                name: "Ada Lovelace".into(),
                address: "ada@example.com".into(),
            }]))
            .unwrap();

        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Book Loan"));
        assert!(raw.contains("ada@example.com"));
    }

    #[test]
    fn test_recipient_name_with_punctuation() {
        let mailer = SmtpMailer::new(EmailConfig::default());
        let message = mailer
            .build_message(&mail(vec![Recipient {
                name: "Martin Luther King, Jr. (\"MLK\")".into(),
                address: "mlk@example.com".into(),
            }]))
            .unwrap();

        let recipients: Vec<String> =
            message.envelope().to().iter().map(ToString::to_string).collect();
        assert_eq!(recipients, ["mlk@example.com"]);
    }

    #[test]
    fn test_invalid_recipient() {
        let mailer = SmtpMailer::new(EmailConfig::default());
        let result = mailer.build_message(&mail(vec![Recipient {
            name: "Nobody".into(),
            address: "not an address".into(),
        }]));
        assert!(matches!(result, Err(AppError::Mail(_))));
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_everything() {
        tokio_test::assert_ok!(LogMailer.send(mail(vec![])).await);
    }
}
