use super::RouteError;
use crate::{
    candidate::{FileSelection, MAX_UPLOAD_BYTES},
    client::Detector,
    notification::Notification,
    server::SharedState,
    upload::{SessionError, SubmitOutcome},
};
use axum::{
    extract::{Multipart, State},
    response::Redirect,
};
use bytes::BytesMut;
use std::time::Instant;
use tracing::instrument;

const IMAGE_FIELD: &str = "image";

/// Reads the `image` field. Bytes past the size ceiling are counted, not kept.
#[instrument(skip(state, multipart))]
pub async fn select_image<D: Detector>(
    State(state): State<SharedState<D>>,
    mut multipart: Multipart,
) -> Result<Redirect, RouteError> {
    state.metrics.record_request("/select");

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let mut size_bytes = 0u64;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = field.chunk().await? {
            size_bytes += chunk.len() as u64;
            if size_bytes <= MAX_UPLOAD_BYTES {
                buffer.extend_from_slice(&chunk);
            }
        }

        // A file input submitted without a file still sends an empty part.
        if file_name.is_empty() && size_bytes == 0 {
            break;
        }

        // Rejections are reported through the notifier.
        let _ = state.session.select_file(FileSelection {
            file_name,
            mime_type,
            size_bytes,
            bytes: buffer.freeze(),
        });
        return Ok(Redirect::to("/"));
    }

    state
        .session
        .notifier()
        .notify(Notification::missing_image());
    Ok(Redirect::to("/"))
}

/// Waits for the round trip. It runs on its own task so that a dropped
/// connection cannot cancel a request already sent.
#[instrument(skip(state))]
pub async fn submit_image<D: Detector>(
    State(state): State<SharedState<D>>,
) -> Result<Redirect, RouteError> {
    state.metrics.record_request("/submit");

    let session = state.session.clone();
    let started = Instant::now();
    let outcome = tokio::spawn(async move { session.submit().await }).await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(SubmitOutcome::Completed(statistics)) => {
            state.metrics.record_round_trip(elapsed_ms, true);
            state.metrics.record_detections(
                statistics
                    .labels
                    .iter()
                    .map(|s| (s.label.as_str(), s.count)),
            );
            tracing::info!(
                detections = statistics.total,
                elapsed_ms,
                "Detection round trip complete"
            );
        }
        Ok(SubmitOutcome::Discarded) => state.metrics.record_round_trip(elapsed_ms, true),
        Err(SessionError::Detection(_)) => state.metrics.record_round_trip(elapsed_ms, false),
        Err(e) => tracing::debug!("Submit rejected: {}", e),
    }

    Ok(Redirect::to("/"))
}

#[instrument(skip(state))]
pub async fn clear_image<D: Detector>(State(state): State<SharedState<D>>) -> Redirect {
    state.metrics.record_request("/clear");
    state.session.clear();
    Redirect::to("/")
}
