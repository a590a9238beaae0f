use crate::{
    conversation::{ChatControls, ChatPhase, ConversationLog},
    registry::SourceRegistry,
    transport::FileBlob,
};

/// Everything a front end renders from.
///
/// Owned by [`crate::CopilotClient`]; callers only ever see clones taken
/// through [`crate::CopilotClient::snapshot`] and mutate through the client.
#[derive(Debug, Clone, Default)]
pub struct CopilotState {
    pub conversation: ConversationLog,
    pub phase: ChatPhase,
    pub registry: SourceRegistry,
    pub controls: ChatControls,
    pub chat_input: String,
    pub url_input: String,
    pub selected_files: Vec<FileBlob>,
    pub file_upload_pending: bool,
    pub url_ingest_pending: bool,
}

impl CopilotState {
    pub fn new(default_top_k: i64) -> Self {
        Self {
            controls: ChatControls {
                top_k: default_top_k,
                ..ChatControls::default()
            },
            ..Self::default()
        }
    }

    pub fn is_awaiting_answer(&self) -> bool {
        self.phase == ChatPhase::AwaitingAnswer
    }

    /// Whether a send affordance should be enabled.
    pub fn can_submit(&self) -> bool {
        !self.is_awaiting_answer() && !self.chat_input.trim().is_empty()
    }
}
