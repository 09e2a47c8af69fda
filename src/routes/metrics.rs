use super::RouteError;
use crate::{client::Detector, server::SharedState};
use axum::extract::State;

pub async fn metrics_handler<D: Detector>(
    State(state): State<SharedState<D>>,
) -> Result<String, RouteError> {
    Ok(state.metrics.encode()?)
}
