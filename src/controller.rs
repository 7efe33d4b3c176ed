//! The conversation controller: one step of the chat state machine.
//!
//! Each inbound message is routed by the first matching rule:
//!
//! 1. awaiting a name: store it, ask for the email
//! 2. awaiting an email: validate, store, notify; or ask again
//! 3. message contains a lead-trigger phrase: start capture
//! 4. otherwise: answer from the knowledge store through the generator
//!
//! The user message is appended to the history before routing and the reply
//! after it, so every successful step grows the history by exactly two
//! entries. If retrieval or generation fails the error is returned and only
//! the user message has been recorded.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{ChatError, LeadError};
use crate::generator::AnswerGenerator;
use crate::greeting::GreetingPicker;
use crate::intent::LeadIntentDetector;
use crate::knowledge::KnowledgeStore;
use crate::notify::LeadNotifier;
use crate::session::{AwaitingAction, Role, Session};

pub const EMAIL_PROMPT_TEMPLATE: &str = "Thanks {name}! What's your email address?";
pub const CONFIRMATION_TEMPLATE: &str =
    "Perfect! We'll contact you at {email} within 24 hours! 🎉";
pub const INVALID_EMAIL_PROMPT: &str =
    "That doesn't look like a valid email. Can you please try again?";
pub const NAME_PROMPT: &str = "Awesome! Let's get you started. What's your name?";
pub const KNOWLEDGE_MISSING: &str =
    "Error: Knowledge base not found. Please ensure your knowledge base has been built.";

/// The controller's answer for one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub response: String,
    pub confidence: f64,
    /// What the next message is expected to be, if anything.
    pub requires_action: Option<AwaitingAction>,
}

impl Reply {
    fn new(response: impl Into<String>, confidence: f64, next: AwaitingAction) -> Self {
        Self {
            response: response.into(),
            confidence,
            requires_action: next.as_str().map(|_| next),
        }
    }
}

/// Minimal syntactic check: the text contains both `@` and `.`.
pub fn validate_email(text: &str) -> Result<(), LeadError> {
    if text.contains('@') && text.contains('.') {
        Ok(())
    } else {
        Err(LeadError::InvalidEmailFormat(text.to_string()))
    }
}

pub struct ConversationController {
    knowledge: Arc<dyn KnowledgeStore>,
    generator: Arc<dyn AnswerGenerator>,
    notifier: Arc<dyn LeadNotifier>,
    greeting: Arc<dyn GreetingPicker>,
    intent: LeadIntentDetector,
    top_k: usize,
}

impl ConversationController {
    pub fn new(
        knowledge: Arc<dyn KnowledgeStore>,
        generator: Arc<dyn AnswerGenerator>,
        notifier: Arc<dyn LeadNotifier>,
        greeting: Arc<dyn GreetingPicker>,
        intent: LeadIntentDetector,
        top_k: usize,
    ) -> Self {
        Self {
            knowledge,
            generator,
            notifier,
            greeting,
            intent,
            top_k,
        }
    }

    /// Apply one user message to `session` and produce the reply.
    pub async fn handle(&self, session: &mut Session, text: &str) -> Result<Reply, ChatError> {
        session.push(Role::User, text);

        let reply = match session.awaiting_action {
            AwaitingAction::GetName => self.capture_name(session, text),
            AwaitingAction::GetEmail => self.capture_email(session, text).await,
            AwaitingAction::None if self.intent.detect(text) => {
                debug!(session_id = %session.id, "lead intent detected");
                session.awaiting_action = AwaitingAction::GetName;
                Reply::new(NAME_PROMPT, 0.9, AwaitingAction::GetName)
            }
            AwaitingAction::None => self.answer(text).await?,
        };

        session.push(Role::Assistant, reply.response.clone());
        Ok(reply)
    }

    fn capture_name(&self, session: &mut Session, text: &str) -> Reply {
        session.user_data.name = Some(text.to_string());
        session.awaiting_action = AwaitingAction::GetEmail;
        Reply::new(
            EMAIL_PROMPT_TEMPLATE.replace("{name}", text),
            0.9,
            AwaitingAction::GetEmail,
        )
    }

    async fn capture_email(&self, session: &mut Session, text: &str) -> Reply {
        if let Err(e) = validate_email(text) {
            debug!(session_id = %session.id, error = %e, "rejected email");
            session.awaiting_action = AwaitingAction::GetEmail;
            return Reply::new(INVALID_EMAIL_PROMPT, 0.5, AwaitingAction::GetEmail);
        }

        session.user_data.email = Some(text.to_string());
        session.awaiting_action = AwaitingAction::None;

        match self
            .notifier
            .send(&session.user_data, &session.message_history)
            .await
        {
            Ok(()) => info!(session_id = %session.id, "lead captured and notification sent"),
            Err(e) => warn!(session_id = %session.id, error = %e, "lead notification failed"),
        }

        Reply::new(
            CONFIRMATION_TEMPLATE.replace("{email}", text),
            1.0,
            AwaitingAction::None,
        )
    }

    async fn answer(&self, text: &str) -> Result<Reply, ChatError> {
        if !self.knowledge.is_built().await {
            warn!("knowledge base not built; answering with fixed error");
            return Ok(Reply::new(KNOWLEDGE_MISSING, 0.0, AwaitingAction::None));
        }

        let passages = self
            .knowledge
            .search(text, self.top_k)
            .await
            .map_err(ChatError::Retrieval)?;
        debug!(passages = passages.len(), "retrieved context");

        let answer = self
            .generator
            .generate(&passages, text)
            .await
            .map_err(ChatError::Generation)?;

        Ok(Reply::new(
            format!("{} {}", self.greeting.pick(), answer),
            0.95,
            AwaitingAction::None,
        ))
    }
}
