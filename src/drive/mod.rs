//! Google Drive REST client
//!
//! This module provides:
//! - Typed file metadata for listing responses
//! - Paginated files.list calls
//! - Binary download and native-format export
//! - JSON fetches for the Docs/Sheets/Slides structured APIs
//!
//! Every worker owns its own client instance; nothing here is shared, so no
//! locking is needed around the HTTP client itself. Rate limiting and retry
//! live above this layer.

use crate::config::DriveConfig;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
pub const SHORTCUT_MIME: &str = "application/vnd.google-apps.shortcut";

const LIST_FIELDS: &str =
    "nextPageToken, files(id, name, mimeType, modifiedTime, size, fileExtension)";

/// Error raised by remote API calls, classified for retry decisions
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP {status} from {endpoint}: {message}")]
    Status {
        status: u16,
        endpoint: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response shape: {0}")]
    Decode(String),

    #[error("shutdown requested")]
    Shutdown,

    #[error("timed out waiting for a rate limit token")]
    LimiterTimeout,
}

impl ApiError {
    /// Whether the failure is worth retrying with backoff.
    ///
    /// 429 and 5xx are transient quota/server conditions; everything else in
    /// the 4xx range (auth, permission, malformed request) is fatal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Status { status, .. } => *status == 429 || (500..=599).contains(status),
            ApiError::Transport(err) => !err.is_builder() && !err.is_decode(),
            ApiError::Decode(_) | ApiError::Shutdown | ApiError::LimiterTimeout => false,
        }
    }
}

/// File metadata returned by files.list
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub modified_time: Option<String>,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: Option<u64>,
    #[serde(default)]
    pub file_extension: Option<String>,
}

impl DriveFile {
    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn mime(&self) -> &str {
        self.mime_type.as_deref().unwrap_or("")
    }

    pub fn is_folder(&self) -> bool {
        self.mime() == FOLDER_MIME
    }

    pub fn is_shortcut(&self) -> bool {
        self.mime() == SHORTCUT_MIME
    }

    /// Lowercased extension, from the metadata field or the file name
    pub fn extension(&self) -> Option<String> {
        if let Some(ext) = &self.file_extension {
            let ext = ext.trim().trim_start_matches('.').to_lowercase();
            if !ext.is_empty() {
                return Some(ext);
            }
        }
        let name = self.name.as_deref()?;
        let (_, ext) = name.rsplit_once('.')?;
        let ext = ext.trim().to_lowercase();
        if ext.is_empty() {
            None
        } else {
            Some(ext)
        }
    }
}

// Drive serializes size as a decimal string; accept a bare number too.
fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(Value::Number(n)) => n.as_u64(),
        _ => None,
    })
}

/// One page of a files.list response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePage {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Per-worker Drive API client
pub struct DriveClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    page_size: u32,
}

impl DriveClient {
    pub fn new(config: &DriveConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .gzip(true)
            .build()?;

        let token = std::env::var(&config.access_token_env).ok();
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            page_size: config.page_size,
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.get(format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn check_status(endpoint: &str, response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        let message = message.chars().take(512).collect();
        Err(ApiError::Status {
            status: status.as_u16(),
            endpoint: endpoint.to_string(),
            message,
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        debug!("GET {}", path);
        let response = self.request(path).query(query).send().await?;
        let response = Self::check_status(path, response).await?;
        Ok(response.json().await?)
    }

    async fn get_bytes(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<u8>, ApiError> {
        debug!("GET {} (binary)", path);
        let response = self.request(path).query(query).send().await?;
        let response = Self::check_status(path, response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// One page of files.list matching the query `q`
    pub async fn list_page(&self, q: &str, page_token: Option<&str>) -> Result<FilePage, ApiError> {
        let page_size = self.page_size.to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("q", q),
            ("fields", LIST_FIELDS),
            ("pageSize", &page_size),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let value = self.get_json("/drive/v3/files", &query).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Download raw file content (files.get with alt=media)
    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>, ApiError> {
        self.get_bytes(&format!("/drive/v3/files/{}", file_id), &[("alt", "media")])
            .await
    }

    /// Export a Google-native file to the given MIME type
    pub async fn export(&self, file_id: &str, mime_type: &str) -> Result<Vec<u8>, ApiError> {
        self.get_bytes(
            &format!("/drive/v3/files/{}/export", file_id),
            &[("mimeType", mime_type)],
        )
        .await
    }

    /// Structured document body (Docs API documents.get)
    pub async fn get_document(&self, document_id: &str) -> Result<Value, ApiError> {
        self.get_json(&format!("/v1/documents/{}", document_id), &[])
            .await
    }

    /// Spreadsheet metadata including sheet titles (Sheets API spreadsheets.get)
    pub async fn get_spreadsheet(&self, spreadsheet_id: &str) -> Result<Value, ApiError> {
        self.get_json(&format!("/v4/spreadsheets/{}", spreadsheet_id), &[])
            .await
    }

    /// Cell values for a range (Sheets API values.get)
    pub async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Value, ApiError> {
        self.get_json(
            &format!("/v4/spreadsheets/{}/values/{}", spreadsheet_id, range),
            &[],
        )
        .await
    }

    /// Presentation body (Slides API presentations.get)
    pub async fn get_presentation(&self, presentation_id: &str) -> Result<Value, ApiError> {
        self.get_json(&format!("/v1/presentations/{}", presentation_id), &[])
            .await
    }
}
