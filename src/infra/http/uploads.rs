use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::error;

use crate::application::blobs::BlobError;
use crate::application::error::ErrorReport;

use super::envelope;
use super::state::AppState;

const SOURCE: &str = "infra::http::uploads::serve_upload";

pub async fn serve_upload(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    match state.blobs.read(&path).await {
        Ok(bytes) => build_upload_response(&path, bytes),
        Err(err @ (BlobError::InvalidPath(_) | BlobError::NotFound(_))) => {
            let mut response = envelope::respond(StatusCode::NOT_FOUND, "File not found", ());
            ErrorReport::from_error(SOURCE, StatusCode::NOT_FOUND, &err).attach(&mut response);
            response
        }
        Err(err) => {
            error!(
                target: "schoolboard::http::uploads",
                path = %path,
                error = %err,
                "failed to read stored upload"
            );
            let mut response = envelope::respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read uploaded file",
                (),
            );
            ErrorReport::from_error(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, &err)
                .attach(&mut response);
            response
        }
    }
}

fn build_upload_response(path: &str, bytes: Bytes) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let mut response = Body::from(bytes).into_response();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    response
}
