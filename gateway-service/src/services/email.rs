use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use service_core::axum::async_trait;
use service_core::error::AppError;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SmtpConfig;
use crate::models::AccountKind;
use crate::utils::InviteSecret;

/// An activation invite ready to go out.
#[derive(Debug, Clone)]
pub struct InviteMessage {
    pub to: String,
    pub name: String,
    pub kind: AccountKind,
    pub secret: InviteSecret,
    pub expires_at: DateTime<Utc>,
}

impl InviteMessage {
    fn subject(&self) -> &'static str {
        match self.kind {
            AccountKind::Admin => "Your administrator invite",
            AccountKind::User => "Your account invite",
        }
    }

    fn plain_body(&self) -> String {
        format!(
            "Hello {},\n\n\
             Use the following code to activate your account:\n\n{}\n\n\
             The code is valid until {} and can be used once.\n",
            self.name,
            self.secret.expose(),
            self.expires_at.to_rfc2822(),
        )
    }

    fn html_body(&self) -> String {
        format!(
            r#"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Hello {}</h2>
        <p>Use the following code to activate your account:</p>
        <p><code style="font-size: 16px;">{}</code></p>
        <p>The code is valid until {} and can be used once.</p>
    </body>
</html>"#,
            self.name,
            self.secret.expose(),
            self.expires_at.to_rfc2822(),
        )
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_invite(&self, message: &InviteMessage) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let builder = if config.user.is_empty() {
            // Local relays (mailpit, mailhog) speak plain SMTP without auth.
            SmtpTransport::builder_dangerous(config.host.as_str())
        } else {
            SmtpTransport::relay(&config.host)
                .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
                .credentials(Credentials::new(config.user.clone(), config.password.clone()))
        };

        let transport = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, port = config.port, "SMTP mailer initialized");

        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_invite(&self, message: &InviteMessage) -> Result<(), AppError> {
        let email = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?,
            )
            .to(message
                .to
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::InternalError(e.into()))?)
            .subject(message.subject())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.plain_body()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html_body()),
                    ),
            )
            .map_err(|e| AppError::InternalError(e.into()))?;

        // SmtpTransport is blocking
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("smtp send failed: {}", e)))?;

        tracing::info!(to = %message.to, kind = %message.kind, "Invite email sent");
        Ok(())
    }
}

/// Keeps every invite in memory instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<InviteMessage>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records nothing and fails every send.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<InviteMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Most recent invite addressed to `email`.
    pub fn latest_for(&self, email: &str) -> Option<InviteMessage> {
        self.messages().into_iter().rev().find(|m| m.to == email)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_invite(&self, message: &InviteMessage) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::InternalError(anyhow::anyhow!("mail relay unavailable")));
        }
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.clone());
        Ok(())
    }
}
