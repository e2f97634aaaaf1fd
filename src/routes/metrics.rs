use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use http::StatusCode;

use crate::{collector::CollectError, metrics, AppState};

pub async fn handler(State(state): State<AppState>) -> Response {
    let samples = match state.cache.collect(chrono::Utc::now()) {
        Ok(samples) => samples,
        Err(e @ CollectError::NotReady) => {
            tracing::warn!("Scrape rejected: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };

    match metrics::render(&state.config.provider, &samples) {
        Ok(body) => (
            [(header::CONTENT_TYPE, metrics::content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{e}")).into_response()
        }
    }
}
