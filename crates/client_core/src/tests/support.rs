use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use shared::{
    domain::SourceType,
    protocol::{
        ChatRequest, ChatResponse, Citation, IngestResponse, IngestUrlsRequest, SourceItem,
    },
};
use tokio::sync::{oneshot, Mutex};

use crate::transport::{CopilotBackend, FileBlob, TransportError};

struct CallGate {
    entered: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// In-memory backend with scripted replies and request recording.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    chat_replies: Mutex<VecDeque<Result<ChatResponse, TransportError>>>,
    chat_gate: Mutex<Option<CallGate>>,
    ingest_gate: Mutex<Option<CallGate>>,
    source_snapshots: Mutex<VecDeque<Result<Vec<SourceItem>, TransportError>>>,
    pub list_calls: AtomicUsize,
    pub file_uploads: Mutex<Vec<Vec<FileBlob>>>,
    pub url_requests: Mutex<Vec<IngestUrlsRequest>>,
    pub fail_ingestion: AtomicBool,
}

impl ScriptedBackend {
    pub async fn push_chat_reply(&self, reply: Result<ChatResponse, TransportError>) {
        self.chat_replies.lock().await.push_back(reply);
    }

    pub async fn push_sources(&self, snapshot: Result<Vec<SourceItem>, TransportError>) {
        self.source_snapshots.lock().await.push_back(snapshot);
    }

    /// Holds the next chat call until the returned sender fires. The returned
    /// receiver resolves once the call has reached the backend.
    pub async fn hold_next_chat(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        install_gate(&self.chat_gate).await
    }

    /// Same as [`Self::hold_next_chat`] for the next file or URL ingestion.
    pub async fn hold_next_ingest(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        install_gate(&self.ingest_gate).await
    }

    pub async fn chat_request_count(&self) -> usize {
        self.chat_requests.lock().await.len()
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CopilotBackend for ScriptedBackend {
    async fn list_sources(&self) -> Result<Vec<SourceItem>, TransportError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.source_snapshots
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn ingest_files(&self, files: Vec<FileBlob>) -> Result<IngestResponse, TransportError> {
        let count = files.len() as u64;
        self.file_uploads.lock().await.push(files);
        pass_gate(&self.ingest_gate).await;
        if self.fail_ingestion.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        Ok(IngestResponse {
            inserted: count,
            source_type: SourceType::File,
        })
    }

    async fn ingest_urls(
        &self,
        request: &IngestUrlsRequest,
    ) -> Result<IngestResponse, TransportError> {
        self.url_requests.lock().await.push(request.clone());
        pass_gate(&self.ingest_gate).await;
        if self.fail_ingestion.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        Ok(IngestResponse {
            inserted: request.urls.len() as u64,
            source_type: SourceType::Url,
        })
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, TransportError> {
        self.chat_requests.lock().await.push(request.clone());

        pass_gate(&self.chat_gate).await;

        self.chat_replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| {
                Ok(ChatResponse {
                    answer: format!("Answer for: {}", request.message),
                    sources: Vec::new(),
                })
            })
    }
}

async fn install_gate(
    slot: &Mutex<Option<CallGate>>,
) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
    let (entered_tx, entered_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel();
    *slot.lock().await = Some(CallGate {
        entered: entered_tx,
        release: release_rx,
    });
    (entered_rx, release_tx)
}

async fn pass_gate(slot: &Mutex<Option<CallGate>>) {
    let gate = slot.lock().await.take();
    if let Some(gate) = gate {
        let _ = gate.entered.send(());
        let _ = gate.release.await;
    }
}

pub(crate) fn server_error() -> TransportError {
    TransportError::Http {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: "boom".to_string(),
    }
}

pub(crate) fn citation(name: &str, source_type: SourceType, snippet: &str) -> Citation {
    Citation {
        name: name.to_string(),
        source_type,
        snippet: snippet.to_string(),
    }
}

pub(crate) fn source_item(name: &str, source_type: SourceType, minute: u32) -> SourceItem {
    SourceItem {
        name: name.to_string(),
        source_type,
        created_at: Utc
            .with_ymd_and_hms(2024, 5, 2, 9, minute, 0)
            .single()
            .expect("valid timestamp"),
    }
}
