//! Chat transcript and the request shape expected by the stateless chat
//! backend.
//!
//! The transcript is append-only. When a message is sent, the newest user
//! message travels as `message` and everything before it (minus local-only
//! entries such as the greeting) travels as `history`, in insertion order.

use std::sync::Arc;

use chrono::Utc;
use shared::{
    domain::{ChatMessage, ChatRole, MessageId},
    error::ApiError,
    protocol::{ChatRequest, HistoryTurn},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    events::{publish, ClientEvent},
    EnergyBackend,
};

pub const DEFAULT_GREETING: &str = "Hello! I am your AI Energy Advisor. How can I help you today? I can assist with energy optimization, electricity pricing, appliance scheduling, and more.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub text: String,
    pub suggestions: Vec<String>,
}

impl Default for Greeting {
    fn default() -> Self {
        Self {
            text: DEFAULT_GREETING.to_string(),
            suggestions: vec![
                "How can I reduce my electricity bill?".to_string(),
                "What time should I run my appliances?".to_string(),
                "Tell me about energy optimization".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub reply: ChatMessage,
    /// False when the reply is a synthetic error message.
    pub delivered: bool,
}

struct Transcript {
    messages: Vec<ChatMessage>,
    next_id: u64,
    awaiting_reply: bool,
    /// Bumped on reset so replies requested before it are dropped.
    epoch: u64,
}

impl Transcript {
    fn new(greeting: Option<&Greeting>, epoch: u64) -> Self {
        let mut transcript = Self {
            messages: Vec::new(),
            next_id: 1,
            awaiting_reply: false,
            epoch,
        };
        if let Some(greeting) = greeting {
            transcript.push(
                ChatRole::Assistant,
                greeting.text.clone(),
                greeting.suggestions.clone(),
                true,
            );
        }
        transcript
    }

    fn push(
        &mut self,
        role: ChatRole,
        text: String,
        suggestions: Vec<String>,
        local: bool,
    ) -> ChatMessage {
        let message = ChatMessage {
            id: MessageId(self.next_id),
            role,
            text,
            suggestions,
            local,
            sent_at: Utc::now(),
        };
        self.next_id += 1;
        self.messages.push(message.clone());
        message
    }
}

/// Builds the chat payload for the newest message in `messages`.
///
/// The newest message must be a transmittable user message. History is the
/// strict prefix before it with local-only messages removed.
pub fn build_chat_request(messages: &[ChatMessage]) -> Result<ChatRequest, ApiError> {
    let Some((current, prefix)) = messages.split_last() else {
        return Err(ApiError::validation("no message to send"));
    };
    if current.role != ChatRole::User || current.local {
        return Err(ApiError::validation("newest message is not a pending user message"));
    }

    let history = prefix
        .iter()
        .filter(|message| !message.local)
        .map(|message| HistoryTurn {
            role: message.role.into(),
            content: message.text.clone(),
        })
        .collect();

    Ok(ChatRequest {
        message: current.text.clone(),
        history,
    })
}

pub fn error_reply_text(err: &ApiError) -> String {
    format!(
        "Error: {}. Please make sure the backend is running and the chat service is configured.",
        err.message
    )
}

pub struct ConversationController {
    backend: Arc<dyn EnergyBackend>,
    greeting: Option<Greeting>,
    transcript: Mutex<Transcript>,
    events: broadcast::Sender<ClientEvent>,
}

impl ConversationController {
    /// A controller whose transcript starts empty.
    pub fn new(backend: Arc<dyn EnergyBackend>, events: broadcast::Sender<ClientEvent>) -> Self {
        Self {
            backend,
            greeting: None,
            transcript: Mutex::new(Transcript::new(None, 0)),
            events,
        }
    }

    /// A controller whose transcript opens with a local greeting that is never
    /// sent to the backend.
    pub fn with_greeting(
        backend: Arc<dyn EnergyBackend>,
        events: broadcast::Sender<ClientEvent>,
        greeting: Greeting,
    ) -> Self {
        Self {
            backend,
            transcript: Mutex::new(Transcript::new(Some(&greeting), 0)),
            greeting: Some(greeting),
            events,
        }
    }

    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.transcript.lock().await.messages.clone()
    }

    pub async fn is_awaiting_reply(&self) -> bool {
        self.transcript.lock().await.awaiting_reply
    }

    /// Appends a user message. Blank text, or any text while a reply is
    /// awaited, is ignored and returns `None`.
    pub async fn append_user_message(&self, text: &str) -> Option<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring blank chat message");
            return None;
        }
        let message = {
            let mut transcript = self.transcript.lock().await;
            if transcript.awaiting_reply {
                debug!("ignoring chat message while a reply is pending");
                return None;
            }
            transcript.push(ChatRole::User, text.to_string(), Vec::new(), false)
        };
        publish(&self.events, ClientEvent::TranscriptAppended(message.clone()));
        Some(message)
    }

    /// Sends the newest user message with the preceding transcript as
    /// history and appends the reply. A failed request appends an inline
    /// error reply instead; only local validation failures return `Err`.
    ///
    /// A reply that arrives after [`reset`](Self::reset) is discarded and
    /// reported as a validation error.
    pub async fn send_pending(&self) -> Result<SendOutcome, ApiError> {
        let (request, epoch) = {
            let mut transcript = self.transcript.lock().await;
            if transcript.awaiting_reply {
                return Err(ApiError::validation("a reply is already pending"));
            }
            let request = build_chat_request(&transcript.messages)?;
            transcript.awaiting_reply = true;
            (request, transcript.epoch)
        };
        info!(history_len = request.history.len(), "sending chat message");

        let result = self.backend.chat(&request).await;

        let outcome = {
            let mut transcript = self.transcript.lock().await;
            if transcript.epoch != epoch {
                debug!(ok = result.is_ok(), "dropping chat reply for a reset transcript");
                return Err(ApiError::validation(
                    "conversation was reset before the reply arrived",
                ));
            }
            transcript.awaiting_reply = false;
            match result {
                Ok(response) => SendOutcome {
                    reply: transcript.push(
                        ChatRole::Assistant,
                        response.response,
                        response.suggestions,
                        false,
                    ),
                    delivered: true,
                },
                Err(err) => {
                    warn!(error = %err, "chat request failed");
                    SendOutcome {
                        reply: transcript.push(
                            ChatRole::Assistant,
                            error_reply_text(&err),
                            Vec::new(),
                            false,
                        ),
                        delivered: false,
                    }
                }
            }
        };
        publish(
            &self.events,
            ClientEvent::TranscriptAppended(outcome.reply.clone()),
        );
        Ok(outcome)
    }

    /// Sends a suggestion exactly as if the user had typed it.
    pub async fn send_suggestion(&self, suggestion: &str) -> Result<SendOutcome, ApiError> {
        if suggestion.trim().is_empty() {
            return Err(ApiError::validation("suggestion text is empty"));
        }
        if self.append_user_message(suggestion).await.is_none() {
            return Err(ApiError::validation("a reply is already pending"));
        }
        self.send_pending().await
    }

    /// Clears the transcript back to its greeting (if any). A reply still in
    /// flight is dropped when it arrives.
    pub async fn reset(&self) {
        let mut transcript = self.transcript.lock().await;
        let epoch = transcript.epoch + 1;
        *transcript = Transcript::new(self.greeting.as_ref(), epoch);
    }
}

#[cfg(test)]
#[path = "tests/conversation_tests.rs"]
mod tests;
