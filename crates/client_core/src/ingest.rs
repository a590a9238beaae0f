//! File and URL ingestion commands.
//!
//! Both commands refresh the source registry exactly once when their request
//! completes, whether it succeeded or not. Clearing the pending selection or
//! input after a failure is governed by `ClientSettings::clear_on_failure`.

use shared::protocol::{IngestResponse, IngestUrlsRequest};
use tracing::{info, warn};

use crate::{
    transport::{FileBlob, TransportError},
    ClientEvent, CopilotClient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestKind {
    Files,
    Urls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Nothing selected or entered; no request was issued.
    Skipped,
    /// Another ingestion of the same kind is still in flight.
    Busy,
    Completed { inserted: u64 },
    Failed,
}

/// Splits URL input on newlines and commas, dropping blank entries.
pub fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(['\n', ','])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

impl CopilotClient {
    pub async fn ingest_selected_files(&self) -> IngestOutcome {
        let files = {
            let mut guard = self.inner.lock().await;
            if guard.selected_files.is_empty() {
                return IngestOutcome::Skipped;
            }
            if guard.file_upload_pending {
                return IngestOutcome::Busy;
            }
            guard.file_upload_pending = true;
            guard.selected_files.clone()
        };

        let file_count = files.len();
        let result = self.backend.ingest_files(files).await;
        let succeeded = result.is_ok();
        let outcome = self.log_ingest_result(IngestKind::Files, file_count, result);

        {
            let mut guard = self.inner.lock().await;
            guard.file_upload_pending = false;
            if succeeded || self.settings.clear_on_failure {
                guard.selected_files.clear();
            }
        }

        self.finish_ingestion(IngestKind::Files, outcome).await
    }

    pub async fn ingest_url_input(&self) -> IngestOutcome {
        let urls = {
            let mut guard = self.inner.lock().await;
            let urls = parse_url_list(&guard.url_input);
            if urls.is_empty() {
                return IngestOutcome::Skipped;
            }
            if guard.url_ingest_pending {
                return IngestOutcome::Busy;
            }
            guard.url_ingest_pending = true;
            urls
        };

        let url_count = urls.len();
        let result = self.backend.ingest_urls(&IngestUrlsRequest { urls }).await;
        let succeeded = result.is_ok();
        let outcome = self.log_ingest_result(IngestKind::Urls, url_count, result);

        {
            let mut guard = self.inner.lock().await;
            guard.url_ingest_pending = false;
            if succeeded || self.settings.clear_on_failure {
                guard.url_input.clear();
            }
        }

        self.finish_ingestion(IngestKind::Urls, outcome).await
    }

    fn log_ingest_result(
        &self,
        kind: IngestKind,
        submitted: usize,
        result: Result<IngestResponse, TransportError>,
    ) -> IngestOutcome {
        match result {
            Ok(response) => {
                info!(
                    ?kind,
                    submitted,
                    inserted = response.inserted,
                    source_type = %response.source_type,
                    "ingestion accepted"
                );
                IngestOutcome::Completed {
                    inserted: response.inserted,
                }
            }
            Err(error) => {
                warn!(?kind, submitted, %error, "ingestion request failed");
                self.emit(ClientEvent::Error(format!("ingestion failed: {error}")));
                IngestOutcome::Failed
            }
        }
    }

    async fn finish_ingestion(&self, kind: IngestKind, outcome: IngestOutcome) -> IngestOutcome {
        self.emit(ClientEvent::IngestionFinished { kind, outcome });
        let _ = self.refresh_sources().await;
        outcome
    }
}
