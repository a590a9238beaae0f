//! Conversation log and the single-flight chat state machine.
//!
//! A turn is split in two halves around the network await: [`begin_turn`]
//! validates and records the user message under the state lock, then the
//! client releases the lock, awaits the backend and records the assistant
//! reply (or the failure notice) on resumption.

use serde::{Deserialize, Serialize};
use shared::{
    domain::{Role, SourceType},
    protocol::{ChatRequest, ChatResponse, Citation},
};
use tracing::{info, warn};

use crate::{
    settings::{TopKPolicy, DEFAULT_TOP_K},
    state::CopilotState,
    ClientEvent, CopilotClient,
};

/// Content of the assistant message appended when a chat request fails.
pub const REQUEST_FAILED_NOTICE: &str = "Request failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Citation>>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: None,
        }
    }

    pub fn assistant(response: ChatResponse) -> Self {
        Self {
            role: Role::Assistant,
            content: response.answer,
            sources: Some(response.sources),
        }
    }

    pub fn request_failed() -> Self {
        Self {
            role: Role::Assistant,
            content: REQUEST_FAILED_NOTICE.to_string(),
            sources: None,
        }
    }
}

/// Append-only, chronologically ordered message history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub(crate) fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatPhase {
    #[default]
    Idle,
    AwaitingAnswer,
}

/// Raw values of the chat controls, editable at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatControls {
    pub source_filter: Option<SourceType>,
    pub top_k: i64,
    pub enable_mcp: bool,
}

impl Default for ChatControls {
    fn default() -> Self {
        Self {
            source_filter: None,
            top_k: DEFAULT_TOP_K,
            enable_mcp: false,
        }
    }
}

/// Validated per-request configuration captured at submit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequestConfig {
    pub source_type_filter: Option<SourceType>,
    pub top_k: i64,
    pub enable_mcp: bool,
}

impl ChatRequestConfig {
    pub fn from_controls(controls: &ChatControls, policy: TopKPolicy) -> Option<Self> {
        Some(Self {
            source_type_filter: controls.source_filter.clone(),
            top_k: policy.apply(controls.top_k)?,
            enable_mcp: controls.enable_mcp,
        })
    }

    pub fn into_request(self, message: String) -> ChatRequest {
        ChatRequest {
            message,
            source_type: self.source_type_filter,
            top_k: self.top_k,
            enable_mcp: self.enable_mcp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    Blank,
    Busy,
    TopKOutOfRange(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Answered,
    Failed,
    Rejected(SubmitRejection),
}

/// Validates the pending input and, if accepted, records the user message
/// and moves to [`ChatPhase::AwaitingAnswer`].
///
/// Rejections leave `state` untouched.
pub(crate) fn begin_turn(
    state: &mut CopilotState,
    policy: TopKPolicy,
) -> Result<(ChatRequest, Message), SubmitRejection> {
    if state.phase == ChatPhase::AwaitingAnswer {
        return Err(SubmitRejection::Busy);
    }
    if state.chat_input.trim().is_empty() {
        return Err(SubmitRejection::Blank);
    }
    let config = ChatRequestConfig::from_controls(&state.controls, policy)
        .ok_or(SubmitRejection::TopKOutOfRange(state.controls.top_k))?;

    let content = std::mem::take(&mut state.chat_input);
    let message = Message::user(content.clone());
    state.conversation.append(message.clone());
    state.phase = ChatPhase::AwaitingAnswer;

    Ok((config.into_request(content), message))
}

impl CopilotClient {
    /// Submits the current chat input.
    pub async fn submit(&self) -> SubmitOutcome {
        let started = {
            let mut guard = self.inner.lock().await;
            begin_turn(&mut guard, self.settings.top_k_policy)
        };
        self.run_turn(started).await
    }

    /// Replaces the chat input with `text` and submits it in one step.
    pub async fn send_message(&self, text: impl Into<String>) -> SubmitOutcome {
        let started = {
            let mut guard = self.inner.lock().await;
            guard.chat_input = text.into();
            begin_turn(&mut guard, self.settings.top_k_policy)
        };
        self.run_turn(started).await
    }

    async fn run_turn(
        &self,
        started: Result<(ChatRequest, Message), SubmitRejection>,
    ) -> SubmitOutcome {
        let (request, user_message) = match started {
            Ok(started) => started,
            Err(rejection) => {
                info!(?rejection, "chat submission ignored");
                return SubmitOutcome::Rejected(rejection);
            }
        };

        self.emit(ClientEvent::MessageAppended(user_message));
        self.emit(ClientEvent::PhaseChanged(ChatPhase::AwaitingAnswer));

        let (reply, outcome) = match self.backend.chat(&request).await {
            Ok(response) => {
                info!(
                    citations = response.sources.len(),
                    top_k = request.top_k,
                    enable_mcp = request.enable_mcp,
                    "chat answered"
                );
                (Message::assistant(response), SubmitOutcome::Answered)
            }
            Err(error) => {
                warn!(%error, "chat request failed");
                self.emit(ClientEvent::Error(format!("chat failed: {error}")));
                (Message::request_failed(), SubmitOutcome::Failed)
            }
        };

        {
            let mut guard = self.inner.lock().await;
            guard.conversation.append(reply.clone());
            guard.phase = ChatPhase::Idle;
        }

        self.emit(ClientEvent::MessageAppended(reply));
        self.emit(ClientEvent::PhaseChanged(ChatPhase::Idle));
        outcome
    }
}

#[cfg(test)]
#[path = "tests/conversation_tests.rs"]
mod tests;
