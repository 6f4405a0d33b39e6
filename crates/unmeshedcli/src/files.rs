use crate::report;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use unmeshedclient::{
    ClientConfig, DeleteFileRequest, DownloadFileRequest, ListFilesRequest, UnmeshedClient,
    UnmeshedError, UploadFileResponse,
};

const UPLOAD_FOLDER: &str = "/test-sdk/folder1";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Upload body stamped with `now` in fractional epoch seconds
fn sample_payload(now: DateTime<Utc>) -> serde_json::Value {
    json!({"message": "hello world", "timestamp": now.timestamp_millis() as f64 / 1000.0})
}

/// Write a small JSON payload to a temp file under `dir` and upload it
///
/// The temp file is gone when this returns, whether the upload worked or not.
pub async fn upload_sample(client: &UnmeshedClient, dir: &Path) -> unmeshedclient::Result<UploadFileResponse> {
    let name = format!("sample_upload_{}.json", uuid::Uuid::new_v4().simple());

    let mut file = tempfile::Builder::new()
        .prefix("unmeshed-")
        .suffix(".json")
        .tempfile_in(dir)?;
    serde_json::to_writer(&mut file, &sample_payload(Utc::now()))?;
    file.flush()?;
    tracing::info!("Temporary file contents: {}", std::fs::read_to_string(file.path())?);

    client.upload_file(file.path(), UPLOAD_FOLDER, Some(&name)).await
}

/// Upload, list, download and delete, logging each step
pub async fn run(config: ClientConfig) -> Result<()> {
    // File calls only, no polling
    let client = UnmeshedClient::new(config.with_enable_results_submission(false))?;

    let uploaded = report(
        "Upload file",
        upload_sample(&client, &std::env::temp_dir()).await,
    );
    report("Listing at /", client.view_files(&ListFilesRequest::new("/")).await);

    let path = match &uploaded {
        Some(uploaded) => uploaded.path.clone(),
        None => format!("/sample_upload_{}.json", uuid::Uuid::new_v4().simple()),
    };

    match client
        .download_file(&DownloadFileRequest::new(path.as_str()), Some(DOWNLOAD_TIMEOUT))
        .await
        .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).map_err(UnmeshedError::from))
    {
        Ok(payload) => tracing::info!("Downloaded file: {}", payload),
        Err(e) => tracing::error!("Download of {} failed: {}", path, e),
    }

    let base64_path = format!("/app/files{}", path);
    match client
        .download_file_base64(&DownloadFileRequest::new(base64_path.as_str()))
        .await
        .and_then(|response| response.decode())
    {
        Ok(Some(bytes)) => tracing::info!("Downloaded file base64: {}", String::from_utf8_lossy(&bytes)),
        Ok(None) => tracing::info!("No content returned for {}", base64_path),
        Err(e) => tracing::error!("Base64 download of {} failed: {}", base64_path, e),
    }

    report("Delete", client.delete_file(&DeleteFileRequest::new(path.as_str())).await);
    Ok(())
}
