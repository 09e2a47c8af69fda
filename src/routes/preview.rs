use super::RouteError;
use crate::{client::Detector, server::SharedState};
use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::Response,
};

pub async fn preview<D: Detector>(
    State(state): State<SharedState<D>>,
    Path(id): Path<u64>,
) -> Result<Response, RouteError> {
    let preview = state
        .session
        .previews()
        .get(id)
        .ok_or(RouteError::PreviewNotFound(id))?;

    Response::builder()
        .header(header::CONTENT_TYPE, preview.mime_type)
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from(preview.data))
        .map_err(|e| RouteError::HttpBuilder(e.to_string()))
}
