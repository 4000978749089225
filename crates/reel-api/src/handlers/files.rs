//! File server handlers. Every path is resolved under the data root.

use std::path::{Path as FsPath, PathBuf};

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

use reel_models::{DirEntry, DirListing, EntryKind};

use crate::error::{ApiError, ApiResult};
use crate::security::safe_path;
use crate::state::AppState;

/// Multipart field carrying the upload.
const UPLOAD_FIELD: &str = "file";

async fn is_dir(path: &FsPath) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

/// Stream a file back to the caller.
pub async fn download_file(State(state): State<AppState>, Path(path): Path<String>) -> ApiResult<Response> {
    let full = safe_path(&state.files_root, &path).await?;

    let metadata = match tokio::fs::metadata(&full).await {
        Ok(m) if m.is_file() => m,
        _ => return Err(ApiError::not_found(format!("File not found: {}", path))),
    };
    let file = tokio::fs::File::open(&full).await?;
    let filename = full
        .file_name()
        .map(|n| n.to_string_lossy().replace('"', ""))
        .unwrap_or_default();

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, metadata.len().to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub path: String,
    pub size: u64,
    pub filename: String,
}

/// Staging name next to the target so the final rename stays on one filesystem.
fn upload_staging_path(target: &FsPath) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}.upload", name, Uuid::new_v4().simple()))
}

/// Store the multipart `file` field at `path`, creating parent directories.
pub async fn upload_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let full = safe_path(&state.files_root, &path).await?;
    if full == *state.files_root || is_dir(&full).await {
        return Err(ApiError::bad_request(format!("Not a file path: {}", path)));
    }

    let mut field = loop {
        match multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
        {
            Some(field) if field.name() == Some(UPLOAD_FIELD) => break field,
            Some(_) => continue,
            None => return Err(ApiError::bad_request("Missing 'file' field")),
        }
    };
    let filename = field.file_name().map(str::to_string);

    if let Some(parent) = full.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let staging = upload_staging_path(&full);
    let mut file = tokio::fs::File::create(&staging).await?;
    let mut size = 0u64;

    let written: ApiResult<()> = async {
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::bad_request(format!("Upload interrupted: {}", e)))?
        {
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
    .await;
    drop(file);

    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(&staging).await {
            warn!(path = %staging.display(), error = %cleanup, "Failed to remove partial upload");
        }
        return Err(e);
    }
    tokio::fs::rename(&staging, &full).await?;

    info!(path = %path, size = size, "File uploaded");
    let filename = filename.unwrap_or_else(|| {
        full.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    Ok(Json(UploadResponse {
        success: true,
        path,
        size,
        filename,
    }))
}

/// Delete a file or directory tree. Deleting something already gone succeeds.
pub async fn delete_file(State(state): State<AppState>, Path(path): Path<String>) -> ApiResult<Json<Value>> {
    let full = safe_path(&state.files_root, &path).await?;
    if full == *state.files_root {
        return Err(ApiError::forbidden("Refusing to delete the file root"));
    }

    let metadata = match tokio::fs::symlink_metadata(&full).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Json(json!({"success": true, "message": "File already deleted"})));
        }
        Err(e) => return Err(e.into()),
    };

    if metadata.is_dir() {
        tokio::fs::remove_dir_all(&full).await?;
    } else {
        tokio::fs::remove_file(&full).await?;
    }

    info!(path = %path, "Deleted");
    Ok(Json(json!({"success": true, "path": path})))
}

async fn list(state: &AppState, path: &str) -> ApiResult<Json<DirListing>> {
    let full = safe_path(&state.files_root, path).await?;

    let metadata = tokio::fs::metadata(&full)
        .await
        .map_err(|_| ApiError::not_found(format!("Directory not found: {}", path)))?;
    if !metadata.is_dir() {
        return Err(ApiError::bad_request(format!("Not a directory: {}", path)));
    }

    let mut items = Vec::new();
    let mut entries = tokio::fs::read_dir(&full).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        // Partial uploads are not part of the listing
        if name.starts_with('.') && name.ends_with(".upload") {
            continue;
        }
        let meta = match entry.metadata().await {
            Ok(m) => m,
            Err(_) => continue,
        };

        let is_dir = meta.is_dir();
        items.push(DirEntry {
            name,
            kind: if is_dir { EntryKind::Directory } else { EntryKind::File },
            size: if is_dir { 0 } else { meta.len() },
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
        });
    }

    Ok(Json(DirListing::new(path.trim_matches('/'), items)))
}

pub async fn list_root(State(state): State<AppState>) -> ApiResult<Json<DirListing>> {
    list(&state, "").await
}

pub async fn list_dir(State(state): State<AppState>, Path(path): Path<String>) -> ApiResult<Json<DirListing>> {
    list(&state, &path).await
}

/// Create a directory and any missing parents.
pub async fn make_dir(State(state): State<AppState>, Path(path): Path<String>) -> ApiResult<Json<Value>> {
    let full = safe_path(&state.files_root, &path).await?;
    tokio::fs::create_dir_all(&full).await?;
    Ok(Json(json!({"success": true, "path": path})))
}
