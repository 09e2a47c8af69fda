use crate::{client::Detector, page::render_page, server::SharedState};
use axum::{extract::State, response::Html};

pub async fn index<D: Detector>(State(state): State<SharedState<D>>) -> Html<String> {
    state.metrics.record_request("/");
    let snapshot = state.session.snapshot();
    let notifications = state.session.notifier().drain();
    Html(render_page(&snapshot, &notifications))
}
