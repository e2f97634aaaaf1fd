use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl HealthResponse {
    fn new(fetched_at: Option<DateTime<Utc>>) -> Self {
        Self {
            ok: fetched_at.is_some(),
            fetched_at,
        }
    }
}

pub async fn handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::new(
        state.cache.snapshot().map(|s| s.fetched_at),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reports_fetch_time_as_rfc3339() {
        let fetched_at = Utc.timestamp_opt(1_699_999_200, 0).unwrap();
        let body = serde_json::to_value(HealthResponse::new(Some(fetched_at))).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "ok": true, "fetched_at": "2023-11-14T22:00:00Z" })
        );
    }

    #[test]
    fn not_ok_before_first_fetch() {
        let body = serde_json::to_value(HealthResponse::new(None)).unwrap();
        assert_eq!(body, serde_json::json!({ "ok": false }));
    }
}
