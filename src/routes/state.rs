use crate::{
    client::Detector, notification::Notification, server::SharedState, upload::UploadSnapshot,
};
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct StateResponse {
    #[serde(flatten)]
    snapshot: UploadSnapshot,
    can_submit: bool,
    notifications: Vec<Notification>,
}

/// Same view as the page, without consuming pending notifications.
pub async fn upload_state<D: Detector>(
    State(state): State<SharedState<D>>,
) -> Json<StateResponse> {
    let snapshot = state.session.snapshot();
    Json(StateResponse {
        can_submit: snapshot.can_submit(),
        snapshot,
        notifications: state.session.notifier().pending(),
    })
}
