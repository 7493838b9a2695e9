//! # Outgoing Mail
//!
//! Verification and password-reset codes are the only mail the terminal
//! sends. Messages are handed to a [`Mailer`]:
//!
//! - [`SpoolMailer`] writes each message as an RFC 5322 `.eml` file into a
//!   spool directory that the host's mail relay drains.
//! - [`LogMailer`] only logs the message (development, no spool set).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use bistro_core::{User, TOKEN_LIFETIME_MINUTES};

use crate::state::MailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail spool unavailable: {0}")]
    Spool(#[from] std::io::Error),
}

/// A plain-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    /// Renders the message with headers and CRLF line endings.
    pub fn to_rfc5322(&self, from: &str, date: DateTime<Utc>, message_id: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!("From: {}\r\n", from));
        out.push_str(&format!("To: {}\r\n", self.to));
        out.push_str(&format!("Subject: {}\r\n", self.subject));
        out.push_str(&format!("Date: {}\r\n", date.to_rfc2822()));
        out.push_str(&format!("Message-ID: <{}@bistro.local>\r\n", message_id));
        out.push_str("MIME-Version: 1.0\r\n");
        out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        out.push_str("Content-Transfer-Encoding: 8bit\r\n");
        out.push_str("\r\n");
        for line in self.body.lines() {
            // a lone "." ends the message for some relays
            if line.starts_with('.') {
                out.push('.');
            }
            out.push_str(line);
            out.push_str("\r\n");
        }
        out
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

pub struct SpoolMailer {
    dir: PathBuf,
    from: String,
}

impl SpoolMailer {
    pub fn new(dir: impl Into<PathBuf>, from: impl Into<String>) -> Self {
        SpoolMailer {
            dir: dir.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for SpoolMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let now = Utc::now();
        let id = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!("{}-{}.eml", now.format("%Y%m%d%H%M%S"), &id[..8]);
        let path = self.dir.join(&file_name);

        // written under a temporary name so the relay never sees half a file
        let partial = self.dir.join(format!(".{}.tmp", file_name));
        tokio::fs::write(&partial, message.to_rfc5322(&self.from, now, &id)).await?;
        tokio::fs::rename(&partial, &path).await?;

        info!(to = %message.to, subject = %message.subject, file = %path.display(), "Mail spooled");
        Ok(())
    }
}

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        info!(to = %message.to, subject = %message.subject, "Mail not sent (no spool directory configured)");
        debug!(body = %message.body, "Mail body");
        Ok(())
    }
}

pub fn mailer_for(config: &MailConfig) -> Arc<dyn Mailer> {
    match &config.spool_dir {
        Some(dir) => Arc::new(SpoolMailer::new(dir, &config.from_address)),
        None => Arc::new(LogMailer),
    }
}

pub fn verification_message(user: &User, code: &str) -> MailMessage {
    MailMessage {
        to: user.email.clone(),
        subject: "Confirm your Bistro POS email address".to_string(),
        body: format!(
            "Hello {},\n\nyour verification code is {}.\n\nIt expires in {} minutes.\n",
            user.display_name, code, TOKEN_LIFETIME_MINUTES
        ),
    }
}

pub fn password_reset_message(user: &User, code: &str) -> MailMessage {
    MailMessage {
        to: user.email.clone(),
        subject: "Bistro POS password reset".to_string(),
        body: format!(
            "Hello {},\n\nsomeone asked to reset the password of the account '{}'.\n\
             Your reset code is {}. It expires in {} minutes.\n\n\
             If this was not you, ignore this message.\n",
            user.display_name, user.username, code, TOKEN_LIFETIME_MINUTES
        ),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps sent messages in memory.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<MailMessage>>,
    }

    impl RecordingMailer {
        pub fn messages(&self) -> Vec<MailMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> MailMessage {
        MailMessage {
            to: "maria@bistro.test".to_string(),
            subject: "Hello".to_string(),
            body: "line one\n.dot line\n".to_string(),
        }
    }

    #[test]
    fn test_rfc5322_rendering() {
        let date = DateTime::parse_from_rfc3339("2026-03-07T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let text = message().to_rfc5322("Bistro <noreply@bistro.local>", date, "abc");

        assert!(text.starts_with("From: Bistro <noreply@bistro.local>\r\n"));
        assert!(text.contains("To: maria@bistro.test\r\n"));
        assert!(text.contains("7 Mar 2026 12:00:00 +0000\r\n"));
        assert!(text.contains("Message-ID: <abc@bistro.local>\r\n"));
        assert!(text.contains("\r\n\r\nline one\r\n..dot line\r\n"));
    }

    #[tokio::test]
    async fn test_spool_writes_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let mailer = SpoolMailer::new(dir.path().join("outbox"), "noreply@bistro.local");
        mailer.send(&message()).await.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path().join("outbox")).await.unwrap();
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            files.push(entry.path());
        }
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].extension().unwrap(), "eml");

        let text = tokio::fs::read_to_string(&files[0]).await.unwrap();
        assert!(text.contains("Subject: Hello\r\n"));
    }

    #[tokio::test]
    async fn test_spool_error_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("outbox");
        tokio::fs::write(&blocked, b"a file where the spool should be").await.unwrap();

        let mailer: Arc<dyn Mailer> = Arc::new(SpoolMailer::new(&blocked, "noreply@bistro.local"));
        let err = mailer.send(&message()).await.unwrap_err();
        assert!(err.to_string().starts_with("Mail spool unavailable"));
    }
}
