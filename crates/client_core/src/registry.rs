use chrono::{DateTime, Utc};
use shared::protocol::SourceItem;
use tracing::{info, warn};

use crate::{transport::TransportError, ClientEvent, CopilotClient};

/// Last successful snapshot of the backend's source list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRegistry {
    items: Vec<SourceItem>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl SourceRegistry {
    pub fn items(&self) -> &[SourceItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    fn replace(&mut self, items: Vec<SourceItem>) {
        self.items = items;
        self.refreshed_at = Some(Utc::now());
    }
}

impl CopilotClient {
    /// Loads the initial source snapshot. Failures are logged only.
    pub async fn bootstrap(&self) {
        let _ = self.refresh_sources().await;
    }

    /// Replaces the snapshot with the backend's current list.
    ///
    /// On failure the previous snapshot stays in place; the error is logged
    /// and handed back for callers that want to inspect it.
    pub async fn refresh_sources(&self) -> Result<usize, TransportError> {
        match self.backend.list_sources().await {
            Ok(items) => {
                let count = items.len();
                {
                    let mut guard = self.inner.lock().await;
                    guard.registry.replace(items.clone());
                }
                info!(count, "source registry refreshed");
                self.emit(ClientEvent::SourcesRefreshed(items));
                Ok(count)
            }
            Err(error) => {
                warn!(%error, "failed to fetch sources");
                Err(error)
            }
        }
    }
}
