//! Request primitive the orchestrator is built on.
//!
//! [`CopilotBackend`] is the seam: the orchestrator only needs a single
//! success/failure completion per request. [`HttpBackend`] is the production
//! implementation talking JSON and multipart to the knowledge backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    error::describe_error_body,
    protocol::{
        ChatRequest, ChatResponse, HealthResponse, IngestResponse, IngestUrlsRequest, SourceItem,
    },
};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::settings::{ClientSettings, MIN_REQUEST_TIMEOUT_MS};

pub const SOURCES_PATH: &str = "/api/sources";
pub const INGEST_FILES_PATH: &str = "/api/ingest/files";
pub const INGEST_URLS_PATH: &str = "/api/ingest/urls";
pub const CHAT_PATH: &str = "/api/chat";
pub const HEALTH_PATH: &str = "/health";

/// Multipart form field every uploaded file is attached under.
pub const FILES_FIELD: &str = "files";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("backend base url is missing")]
    BaseUrlMissing,
    #[error("invalid backend base url: {message}")]
    InvalidBaseUrl { message: String },
    #[error("request failed: {message}")]
    Request { message: String },
    #[error("request timed out: {message}")]
    Timeout { message: String },
    #[error("failed to read response body: {message}")]
    Read { message: String },
    #[error("backend returned {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("failed to decode response: {message}")]
    Decode { message: String },
    #[error("invalid upload part for {file_name}: {message}")]
    InvalidPart { file_name: String, message: String },
}

/// One selected file, already read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait CopilotBackend: Send + Sync {
    async fn list_sources(&self) -> Result<Vec<SourceItem>, TransportError>;
    async fn ingest_files(&self, files: Vec<FileBlob>) -> Result<IngestResponse, TransportError>;
    async fn ingest_urls(
        &self,
        request: &IngestUrlsRequest,
    ) -> Result<IngestResponse, TransportError>;
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(api_base: &str, timeout_ms: u64) -> Result<Self, TransportError> {
        Ok(Self {
            base_url: normalize_base_url(api_base)?,
            timeout: Duration::from_millis(timeout_ms.max(MIN_REQUEST_TIMEOUT_MS)),
            http: reqwest::Client::new(),
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, TransportError> {
        Self::new(&settings.api_base, settings.request_timeout_ms)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        let path = path.trim();
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub async fn health(&self) -> Result<HealthResponse, TransportError> {
        self.get_json(HEALTH_PATH).await
    }

    async fn get_json<T>(&self, path: &str) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
    {
        let request = self.http.get(self.endpoint(path));
        self.send(path, request).await
    }

    async fn post_json<Req, Res>(&self, path: &str, payload: &Req) -> Result<Res, TransportError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let request = self.http.post(self.endpoint(path)).json(payload);
        self.send(path, request).await
    }

    async fn send<T>(&self, path: &str, request: reqwest::RequestBuilder) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
    {
        let request_id = format!("req_{}", Uuid::new_v4().simple());
        debug!(%path, %request_id, "sending backend request");
        let response = request
            .header("x-request-id", request_id)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(map_send_error)?;
        decode_json_response(response).await
    }
}

#[async_trait]
impl CopilotBackend for HttpBackend {
    async fn list_sources(&self) -> Result<Vec<SourceItem>, TransportError> {
        self.get_json(SOURCES_PATH).await
    }

    async fn ingest_files(&self, files: Vec<FileBlob>) -> Result<IngestResponse, TransportError> {
        let form = build_upload_form(files)?;
        let request = self.http.post(self.endpoint(INGEST_FILES_PATH)).multipart(form);
        self.send(INGEST_FILES_PATH, request).await
    }

    async fn ingest_urls(
        &self,
        request: &IngestUrlsRequest,
    ) -> Result<IngestResponse, TransportError> {
        self.post_json(INGEST_URLS_PATH, request).await
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, TransportError> {
        self.post_json(CHAT_PATH, request).await
    }
}

fn build_upload_form(files: Vec<FileBlob>) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for blob in files {
        let mut part = Part::bytes(blob.bytes).file_name(blob.file_name.clone());
        if let Some(mime_type) = blob.mime_type.as_deref() {
            part = part
                .mime_str(mime_type)
                .map_err(|error| TransportError::InvalidPart {
                    file_name: blob.file_name.clone(),
                    message: error.to_string(),
                })?;
        }
        form = form.part(FILES_FIELD, part);
    }
    Ok(form)
}

pub fn format_http_error(status: StatusCode, body: &[u8]) -> TransportError {
    TransportError::Http {
        status,
        body: describe_error_body(body),
    }
}

fn map_send_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            message: error.to_string(),
        }
    } else {
        TransportError::Request {
            message: error.to_string(),
        }
    }
}

fn normalize_base_url(base_url: &str) -> Result<String, TransportError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(TransportError::BaseUrlMissing);
    }
    url::Url::parse(trimmed).map_err(|error| TransportError::InvalidBaseUrl {
        message: format!("{trimmed}: {error}"),
    })?;
    Ok(trimmed.trim_end_matches('/').to_string())
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, TransportError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let bytes = response.bytes().await.map_err(|error| {
        if error.is_timeout() {
            TransportError::Timeout {
                message: error.to_string(),
            }
        } else {
            TransportError::Read {
                message: error.to_string(),
            }
        }
    })?;

    if !status.is_success() {
        return Err(format_http_error(status, &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| TransportError::Decode {
        message: error.to_string(),
    })
}
