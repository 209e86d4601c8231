//! Notification gateway
//!
//! Outgoing mail is described by a [`Notification`] (recipients, subject,
//! template name, context) and handed to a [`Notifier`]. Delivery is always
//! best-effort from the caller's point of view: a failed send is logged and
//! never turns a reservation or a reconciler tick into a failure.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use tera::{Context as TeraContext, Tera};

use crate::config::{MailConfig, MailDriver};
use crate::models::Locker;

pub const TEMPLATE_RESERVATION_ENDED: &str = "reservation_ended";
pub const TEMPLATE_RESERVATION_REMINDER: &str = "reservation_reminder";
pub const TEMPLATE_WELCOME: &str = "welcome";

const TEMPLATES: &[(&str, &str)] = &[
    (
        TEMPLATE_RESERVATION_ENDED,
        include_str!("templates/reservation_ended.html"),
    ),
    (
        TEMPLATE_RESERVATION_REMINDER,
        include_str!("templates/reservation_reminder.html"),
    ),
    (TEMPLATE_WELCOME, include_str!("templates/welcome.html")),
];

/// A message to deliver
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub subject: String,
    pub template: String,
    /// Placeholder values, a JSON object
    pub context: Value,
}

impl Notification {
    /// The reservation on `locker` is over and the locker was released
    pub fn reservation_ended(email: &str, locker: &Locker) -> Self {
        Self::about_locker(
            email,
            "Your locker reservation has ended",
            TEMPLATE_RESERVATION_ENDED,
            locker,
        )
    }

    /// The reservation on `locker` ends in about a day
    pub fn reservation_reminder(email: &str, locker: &Locker) -> Self {
        Self::about_locker(
            email,
            "Your locker reservation ends soon",
            TEMPLATE_RESERVATION_REMINDER,
            locker,
        )
    }

    pub fn welcome(email: &str, dashboard_url: Option<&str>) -> Self {
        Self {
            recipients: vec![email.to_string()],
            subject: "Welcome to Lokify".to_string(),
            template: TEMPLATE_WELCOME.to_string(),
            context: json!({
                "email": email,
                "dashboard_url": dashboard_url,
                "current_year": Utc::now().year(),
            }),
        }
    }

    fn about_locker(email: &str, subject: &str, template: &str, locker: &Locker) -> Self {
        let reservation_end = locker
            .reservation
            .as_ref()
            .map(|r| r.end.format("%Y-%m-%d %H:%M UTC").to_string());

        Self {
            recipients: vec![email.to_string()],
            subject: subject.to_string(),
            template: template.to_string(),
            context: json!({
                "email": email,
                "locker_number": locker.number,
                "locker_size": locker.size.to_string(),
                "reservation_end": reservation_end,
                "current_year": Utc::now().year(),
            }),
        }
    }
}

/// Delivers notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Rendered message bodies
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub html: String,
    pub text: String,
}

/// Renders the embedded mail templates
pub struct TemplateRenderer {
    tera: Tera,
    tags: Regex,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        for (name, content) in TEMPLATES {
            tera.add_raw_template(&format!("{}.html", name), content)
                .with_context(|| format!("Failed to add mail template {}", name))?;
        }

        Ok(Self {
            tera,
            tags: Regex::new(r"<[^>]*>").context("Invalid tag pattern")?,
        })
    }

    /// Render `template` to HTML, plus a plain-text copy with tags stripped
    pub fn render(&self, template: &str, context: &Value) -> Result<RenderedEmail> {
        let ctx = TeraContext::from_serialize(context)
            .with_context(|| format!("Invalid context for mail template {}", template))?;
        let html = self
            .tera
            .render(&format!("{}.html", template), &ctx)
            .with_context(|| format!("Failed to render mail template {}", template))?;
        let text = self.strip_tags(&html);

        Ok(RenderedEmail { html, text })
    }

    fn strip_tags(&self, html: &str) -> String {
        let stripped = self.tags.replace_all(html, "");
        stripped
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Sends mail through an SMTP relay
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    renderer: TemplateRenderer,
}

impl SmtpNotifier {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| anyhow!("Invalid from address '{}': {}", config.from, e))?;

        // Port 465 speaks TLS from the start, anything else upgrades
        let builder = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
        .port(config.port);

        let builder = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
            from,
            renderer: TemplateRenderer::new()?,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        if notification.recipients.is_empty() {
            return Ok(());
        }
        let body = self
            .renderer
            .render(&notification.template, &notification.context)?;

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(notification.subject.clone());
        for recipient in &notification.recipients {
            let to: Mailbox = recipient
                .parse()
                .map_err(|e| anyhow!("Invalid recipient '{}': {}", recipient, e))?;
            builder = builder.to(to);
        }

        let message = builder
            .multipart(MultiPart::alternative_plain_html(body.text, body.html))
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;

        tracing::debug!(
            "Sent '{}' to {}",
            notification.template,
            notification.recipients.join(", ")
        );
        Ok(())
    }
}

/// Renders and logs instead of sending
pub struct LogNotifier {
    renderer: TemplateRenderer,
}

impl LogNotifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            renderer: TemplateRenderer::new()?,
        })
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let body = self
            .renderer
            .render(&notification.template, &notification.context)?;
        tracing::info!(
            "Mail to {}: {}",
            notification.recipients.join(", "),
            notification.subject
        );
        tracing::debug!("{}", body.text);
        Ok(())
    }
}

/// Build the notifier selected by `config.driver`
pub fn create_notifier(config: &MailConfig) -> Result<Arc<dyn Notifier>> {
    match config.driver {
        MailDriver::Smtp => {
            tracing::info!("Mail delivery via SMTP relay {}:{}", config.host, config.port);
            Ok(Arc::new(SmtpNotifier::new(config)?))
        }
        MailDriver::Log => {
            tracing::info!("Mail delivery disabled, messages are logged");
            Ok(Arc::new(LogNotifier::new()?))
        }
    }
}
