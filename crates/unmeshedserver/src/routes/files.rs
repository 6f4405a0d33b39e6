use crate::auth::SdkClient;
use crate::error::ApiError;
use crate::AppState;
use actix_multipart::Multipart;
use actix_web::{post, web, HttpResponse};
use futures::StreamExt;
use serde::Deserialize;
use unmeshedcore::{DeleteFileRequest, DownloadFileBase64Response, DownloadFileRequest, ListFilesRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadQuery {
    folder_path: String,
    file_name: Option<String>,
}

#[post("/api/files/list")]
pub async fn list(
    _client: SdkClient,
    data: web::Data<AppState>,
    request: web::Json<ListFilesRequest>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.files().list(&request.path)?))
}

/// Multipart upload; the `file` field carries the content
#[post("/api/files/upload")]
pub async fn upload(
    _client: SdkClient,
    data: web::Data<AppState>,
    query: web::Query<UploadQuery>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| {
            tracing::warn!("Failed to process multipart field: {}", e);
            ApiError::BadRequest("Failed to process upload".to_string())
        })?;

        let Some(disposition) = field.content_disposition() else {
            continue;
        };
        if disposition.get_name() != Some("file") {
            continue;
        }
        let filename = disposition.get_filename().map(String::from);

        let mut content = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ApiError::BadRequest(format!("Upload interrupted: {}", e)))?;
            content.extend_from_slice(&chunk);
        }
        upload = Some((filename, content));
    }

    let (filename, content) =
        upload.ok_or_else(|| ApiError::BadRequest("Missing multipart field 'file'".to_string()))?;
    let query = query.into_inner();
    let name = query
        .file_name
        .or(filename)
        .ok_or_else(|| ApiError::BadRequest("File name is required".to_string()))?;

    let response = data.files().upload(&query.folder_path, &name, content)?;
    Ok(HttpResponse::Ok().json(response))
}

#[post("/api/files/download")]
pub async fn download(
    _client: SdkClient,
    data: web::Data<AppState>,
    request: web::Json<DownloadFileRequest>,
) -> Result<HttpResponse, ApiError> {
    let files = data.files();
    let (_, content) = files.download(&request.path)?;
    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .body(content.to_vec()))
}

#[post("/api/files/download/base64")]
pub async fn download_base64(
    _client: SdkClient,
    data: web::Data<AppState>,
    request: web::Json<DownloadFileRequest>,
) -> Result<HttpResponse, ApiError> {
    let files = data.files();
    let (path, content) = files.download(&request.path)?;
    Ok(HttpResponse::Ok().json(DownloadFileBase64Response::from_bytes(path, content)))
}

/// Delete a file, or a whole folder
#[post("/api/files/delete")]
pub async fn delete(
    _client: SdkClient,
    data: web::Data<AppState>,
    request: web::Json<DeleteFileRequest>,
) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.files().delete(&request.path)))
}
