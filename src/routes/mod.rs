mod health;
mod index;
mod metrics;
mod preview;
mod state;
mod upload;

use crate::{client::Detector, server::SharedState, telemetry::MetricsError};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Preview {0} not found")]
    PreviewNotFound(u64),
    #[error("Detection task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Metrics unavailable: {0}")]
    Metrics(#[from] MetricsError),
    #[error("HTTP builder failed: {0}")]
    HttpBuilder(String),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = match self {
            RouteError::Multipart(_) => StatusCode::BAD_REQUEST,
            RouteError::PreviewNotFound(_) => StatusCode::NOT_FOUND,
            RouteError::Task(_) | RouteError::Metrics(_) | RouteError::HttpBuilder(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

pub fn api_routes<D: Detector>() -> Router<SharedState<D>> {
    Router::new()
        .route("/", get(index::index::<D>))
        .route(
            "/select",
            post(upload::select_image::<D>).layer(DefaultBodyLimit::disable()),
        )
        .route("/submit", post(upload::submit_image::<D>))
        .route("/clear", post(upload::clear_image::<D>))
        .route("/preview/{id}", get(preview::preview::<D>))
        .route("/api/state", get(state::upload_state::<D>))
        .route("/health_check", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler::<D>))
}
