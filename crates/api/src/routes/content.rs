//! Paid content files

use std::path::{Component, Path as FsPath};

use axum::{
    extract::{Path, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

fn content_type(file: &str) -> &'static str {
    match FsPath::new(file).extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Only plain relative paths below the content directory
fn is_safe_path(file: &str) -> bool {
    !file.is_empty()
        && !file.contains('\\')
        && FsPath::new(file)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

pub async fn serve(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> ApiResult<Response> {
    if !is_safe_path(&file) {
        return Err(ApiError::NotFound("File not found".to_string()));
    }

    let path = state.config.content_dir.join(&file);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(([(CONTENT_TYPE, content_type(&file))], bytes).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::NotFound("File not found".to_string()))
        }
        Err(e) => Err(ApiError::Internal(format!(
            "reading {}: {}",
            path.display(),
            e
        ))),
    }
}
