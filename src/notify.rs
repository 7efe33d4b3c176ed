//! Lead notification over SMTP.
//!
//! When lead capture completes, the controller hands the captured fields and
//! the session's message history to a [`LeadNotifier`]. The SMTP notifier
//! connects to the relay with STARTTLS, logs in, and sends one plain-text
//! summary to the configured receiver. There is no retry; the controller
//! logs any failure and carries on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as EmailMessage, Tokio1Executor};
use tracing::{info, warn};

use crate::config::SmtpConfig;
use crate::error::NotifyError;
use crate::session::{Message, UserData};

/// A captured lead, assembled at the moment capture completes.
#[derive(Debug, Clone, PartialEq)]
pub struct Lead {
    pub name: Option<String>,
    pub email: Option<String>,
    /// Content of the first message in the conversation.
    pub initial_intent: Option<String>,
    pub first_seen: Option<DateTime<Utc>>,
}

impl Lead {
    pub fn from_session(user_data: &UserData, history: &[Message]) -> Self {
        let first = history.first();
        Self {
            name: user_data.name.clone(),
            email: user_data.email.clone(),
            initial_intent: first.map(|m| m.content.clone()),
            first_seen: first.map(|m| m.timestamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadEmail {
    pub subject: String,
    pub body: String,
}

pub fn render_lead_email(business_name: &str, lead: &Lead) -> LeadEmail {
    let na = "N/A".to_string();
    let body = format!(
        "A new lead has been captured from your AI assistant!\n\
         \n\
         Name: {}\n\
         Email: {}\n\
         \n\
         ---\n\
         Lead Details:\n\
         Initial Intent: \"{}\"\n\
         Time of Capture: {}\n",
        lead.name.as_ref().unwrap_or(&na),
        lead.email.as_ref().unwrap_or(&na),
        lead.initial_intent.as_ref().unwrap_or(&na),
        lead.first_seen
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| na.clone()),
    );

    LeadEmail {
        subject: format!("New {} Lead Captured", business_name),
        body,
    }
}

/// Delivers lead summaries.
#[async_trait]
pub trait LeadNotifier: Send + Sync {
    async fn send(&self, user_data: &UserData, history: &[Message]) -> Result<(), NotifyError>;
}

/// Used when SMTP credentials are incomplete; every send reports
/// [`NotifyError::NotConfigured`].
pub struct DisabledNotifier;

#[async_trait]
impl LeadNotifier for DisabledNotifier {
    async fn send(&self, _user_data: &UserData, _history: &[Message]) -> Result<(), NotifyError> {
        Err(NotifyError::NotConfigured)
    }
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    business_name: String,
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| NotifyError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

impl SmtpNotifier {
    /// Sender is the SMTP username; recipient is `smtp.receiver`.
    pub fn new(config: &SmtpConfig, business_name: &str) -> Result<Self, NotifyError> {
        let (Some(server), Some(username), Some(password), Some(receiver)) = (
            config.server.as_deref(),
            config.username.as_deref(),
            config.password.as_deref(),
            config.receiver.as_deref(),
        ) else {
            return Err(NotifyError::NotConfigured);
        };
        let from = parse_mailbox(username)?;
        let to = parse_mailbox(receiver)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)
            .map_err(|e| NotifyError::Delivery(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .timeout(Some(Duration::from_secs(30)))
            .build();

        Ok(Self {
            transport,
            from,
            to,
            business_name: business_name.to_string(),
        })
    }
}

#[async_trait]
impl LeadNotifier for SmtpNotifier {
    async fn send(&self, user_data: &UserData, history: &[Message]) -> Result<(), NotifyError> {
        let lead = Lead::from_session(user_data, history);
        let email = render_lead_email(&self.business_name, &lead);
        let message = build_message(&self.from, &self.to, &email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        info!(to = %self.to, "lead email sent");
        Ok(())
    }
}

fn build_message(from: &Mailbox, to: &Mailbox, email: &LeadEmail) -> Result<EmailMessage, NotifyError> {
    EmailMessage::builder()
        .from(from.clone())
        .to(to.clone())
        .subject(email.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|e| NotifyError::Message(e.to_string()))
}

/// SMTP notifier when the credentials are complete and valid, otherwise the
/// disabled notifier.
pub fn create_notifier(config: &SmtpConfig, business_name: &str) -> Arc<dyn LeadNotifier> {
    if !config.is_complete() {
        warn!("SMTP credentials are not fully configured; lead emails will not be sent");
        return Arc::new(DisabledNotifier);
    }
    match SmtpNotifier::new(config, business_name) {
        Ok(notifier) => Arc::new(notifier),
        Err(e) => {
            warn!(error = %e, "SMTP notifier unavailable; lead emails will not be sent");
            Arc::new(DisabledNotifier)
        }
    }
}
