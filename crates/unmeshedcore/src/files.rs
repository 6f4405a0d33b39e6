use crate::UnmeshedError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ListFilesRequest {
    pub path: String,
}

impl ListFilesRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub folder: bool,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ListFilesResponse {
    pub path: String,
    pub entries: Vec<FileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct UploadFileResponse {
    pub path: String,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct DownloadFileRequest {
    pub path: String,
}

impl DownloadFileRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct DownloadFileBase64Response {
    pub path: String,
    pub content_base64: Option<String>,
}

impl DownloadFileBase64Response {
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            content_base64: Some(STANDARD.encode(bytes)),
        }
    }

    /// Decoded file content; `None` when the engine sent no content
    pub fn decode(&self) -> Result<Option<Vec<u8>>, UnmeshedError> {
        self.content_base64
            .as_deref()
            .map(|content| {
                STANDARD
                    .decode(content)
                    .map_err(|e| UnmeshedError::Decode(format!("Invalid base64 content: {}", e)))
            })
            .transpose()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteFileRequest {
    pub path: String,
}

impl DeleteFileRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteFileResponse {
    pub path: String,
    pub deleted: bool,
    pub message: String,
}
