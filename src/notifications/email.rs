//! Outbound email, currently just the password-reset message.
//!
//! Sends run inside the request that triggered them, so every send is
//! wrapped in a timeout and every failure propagates to the caller.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;

use crate::config::EmailConfig;

/// Service for sending system emails
pub struct Mailer {
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Check if email sending is configured
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// Send the password-reset email carrying the one-hour reset link.
    pub async fn send_password_reset(&self, to_email: &str, reset_link: &str) -> Result<()> {
        let subject = "Restablecer Contraseña";
        let html_body = render_reset_html(reset_link);
        let text_body = render_reset_text(reset_link);

        self.send(to_email, subject, &html_body, &text_body).await
    }

    /// Send an email with HTML and plain text versions
    async fn send(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from_mailbox = format!("{} <{}>", self.config.from_name, from_address);
        let from: Mailbox = from_mailbox.parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        // Bounded send: a slow provider must not hang the request
        tokio::time::timeout(
            Duration::from_secs(self.config.send_timeout_secs),
            mailer.build().send(email),
        )
        .await
        .map_err(|_| {
            anyhow::anyhow!(
                "SMTP send timed out after {}s",
                self.config.send_timeout_secs
            )
        })??;

        tracing::info!(to = %to_email, subject = %subject, "Email sent successfully");

        Ok(())
    }
}

/// Render the HTML version of the password-reset email
fn render_reset_html(reset_link: &str) -> String {
    format!(
        r#"<p>Has solicitado restablecer tu contraseña. Haz clic en el siguiente enlace o pégalo en tu navegador:</p>
<p><a href="{reset_link}">{reset_link}</a></p>
<p>Este enlace expira en 1 hora.</p>"#,
    )
}

/// Render the plain text version of the password-reset email
fn render_reset_text(reset_link: &str) -> String {
    format!(
        r#"Has solicitado restablecer tu contraseña. Abre el siguiente enlace en tu navegador:

{reset_link}

Este enlace expira en 1 hora."#,
    )
}
