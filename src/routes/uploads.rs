//! Proof image upload and serving
//!
//! - POST /api/upload     - Raw image body (image/png or image/jpeg)
//! - GET  /uploads/{name} - Stored image

use hyper::header::CONTENT_TYPE;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::info;

use crate::routes::common::{bytes_response, json_response, ApiRequest, BoxBody};
use crate::server::AppState;
use crate::types::{FavorrError, Result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub proof_image_ref: String,
}

/// POST /api/upload
pub async fn handle_upload(state: &AppState, req: &ApiRequest) -> Result<Response<BoxBody>> {
    let identity = req.identity(state)?;
    let content_type = req
        .header(CONTENT_TYPE)
        .ok_or_else(|| FavorrError::Validation("Content-Type header is required".into()))?;

    let reference = state.files.put(content_type, req.body.clone()).await?;
    info!("{} uploaded {}", identity.username, reference);

    Ok(json_response(
        StatusCode::CREATED,
        &UploadResponse {
            proof_image_ref: reference,
        },
    ))
}

/// GET /uploads/{name}
pub async fn handle_serve(state: &AppState, name: &str) -> Result<Response<BoxBody>> {
    let file = state
        .files
        .get(name)
        .await?
        .ok_or_else(|| FavorrError::UnknownEntity(format!("upload {}", name)))?;

    Ok(bytes_response(
        StatusCode::OK,
        file.image_type.content_type(),
        file.data,
    ))
}
