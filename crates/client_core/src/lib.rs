use std::sync::Arc;

use shared::{domain::SourceType, protocol::SourceItem};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

pub mod conversation;
pub mod ingest;
pub mod registry;
pub mod settings;
pub mod state;
pub mod transport;

pub use conversation::{
    ChatControls, ChatPhase, ChatRequestConfig, ConversationLog, Message, SubmitOutcome,
    SubmitRejection, REQUEST_FAILED_NOTICE,
};
pub use ingest::{parse_url_list, IngestKind, IngestOutcome};
pub use registry::SourceRegistry;
pub use settings::{load_settings, ClientSettings, TopKPolicy};
pub use state::CopilotState;
pub use transport::{CopilotBackend, FileBlob, HttpBackend, TransportError};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notifications a front end re-renders on.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    MessageAppended(Message),
    PhaseChanged(ChatPhase),
    SourcesRefreshed(Vec<SourceItem>),
    IngestionFinished {
        kind: IngestKind,
        outcome: IngestOutcome,
    },
    Error(String),
}

/// Owns the conversation, the source snapshot and the form fields, and runs
/// every command against a [`CopilotBackend`].
///
/// The state lock is never held across a backend call, so controls stay
/// editable while a request is in flight.
pub struct CopilotClient {
    backend: Arc<dyn CopilotBackend>,
    settings: ClientSettings,
    inner: Mutex<CopilotState>,
    events: broadcast::Sender<ClientEvent>,
}

impl CopilotClient {
    /// Builds a client talking HTTP to `settings.api_base`.
    pub fn new(settings: ClientSettings) -> Result<Arc<Self>, TransportError> {
        let backend = HttpBackend::from_settings(&settings)?;
        Ok(Self::with_backend(settings, Arc::new(backend)))
    }

    pub fn with_backend(settings: ClientSettings, backend: Arc<dyn CopilotBackend>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            backend,
            inner: Mutex::new(CopilotState::new(settings.default_top_k)),
            settings,
            events,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> CopilotState {
        self.inner.lock().await.clone()
    }

    pub async fn set_chat_input(&self, text: impl Into<String>) {
        self.inner.lock().await.chat_input = text.into();
    }

    pub async fn set_url_input(&self, text: impl Into<String>) {
        self.inner.lock().await.url_input = text.into();
    }

    pub async fn select_files(&self, files: Vec<FileBlob>) {
        self.inner.lock().await.selected_files = files;
    }

    pub async fn set_source_filter(&self, filter: Option<SourceType>) {
        self.inner.lock().await.controls.source_filter = filter;
    }

    pub async fn set_top_k(&self, top_k: i64) {
        self.inner.lock().await.controls.top_k = top_k;
    }

    pub async fn set_enable_mcp(&self, enabled: bool) {
        self.inner.lock().await.controls.enable_mcp = enabled;
    }

    fn emit(&self, event: ClientEvent) {
        if self.events.send(event).is_err() {
            debug!("no event subscribers");
        }
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
