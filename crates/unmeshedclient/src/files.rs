//! Remote file store calls.

use crate::http::{transport, HttpClient};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use unmeshedcore::{
    DeleteFileRequest, DeleteFileResponse, DownloadFileBase64Response, DownloadFileRequest,
    ListFilesRequest, ListFilesResponse, Result, UnmeshedError, UploadFileResponse,
};

#[derive(Clone)]
pub struct FileClient {
    http: Arc<HttpClient>,
}

impl FileClient {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    /// List files and folders directly under a path
    pub async fn list(&self, request: &ListFilesRequest) -> Result<ListFilesResponse> {
        self.http.post(&["api", "files", "list"], &[], request).await
    }

    /// Upload a local file into a remote folder
    ///
    /// The remote name defaults to the local file name.
    pub async fn upload(
        &self,
        file_path: impl AsRef<Path>,
        folder_path: &str,
        custom_file_name: Option<&str>,
    ) -> Result<UploadFileResponse> {
        let file_path = file_path.as_ref();
        let file_name = match custom_file_name {
            Some(name) => name.to_string(),
            None => file_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    UnmeshedError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("{} has no file name", file_path.display()),
                    ))
                })?,
        };

        let content = tokio::fs::read(file_path).await?;
        tracing::info!(
            "Uploading {} ({} bytes) to {}/{}",
            file_path.display(),
            content.len(),
            folder_path.trim_end_matches('/'),
            file_name
        );

        let part = Part::bytes(content)
            .file_name(file_name.clone())
            .mime_str("application/octet-stream")
            .map_err(transport)?;
        let form = Form::new().part("file", part);

        let request = self
            .http
            .request(Method::POST, &["api", "files", "upload"])
            .query(&[("folderPath", folder_path), ("fileName", file_name.as_str())])
            .multipart(form);
        self.http.send_json(request).await
    }

    /// Download raw file content
    pub async fn download(
        &self,
        request: &DownloadFileRequest,
        read_timeout: Option<Duration>,
    ) -> Result<Vec<u8>> {
        let mut builder = self
            .http
            .request(Method::POST, &["api", "files", "download"])
            .json(request);
        if let Some(timeout) = read_timeout {
            builder = builder.timeout(timeout);
        }
        self.http.send_bytes(builder).await
    }

    pub async fn download_base64(
        &self,
        request: &DownloadFileRequest,
    ) -> Result<DownloadFileBase64Response> {
        self.http
            .post(&["api", "files", "download", "base64"], &[], request)
            .await
    }

    /// Delete a file, or a folder with everything below it
    pub async fn delete(&self, request: &DeleteFileRequest) -> Result<DeleteFileResponse> {
        self.http.post(&["api", "files", "delete"], &[], request).await
    }
}
