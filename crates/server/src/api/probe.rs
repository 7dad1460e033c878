//! Source URL probe handler.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use pressroom_core::{job::validate_source_url, FetchError, SourceInfo};

use super::jobs::{ApiError, ErrorResponse};
use crate::state::AppState;

/// Request body for probing a source
#[derive(Debug, Deserialize)]
pub struct ProbeRequest {
    pub url: String,
}

/// Check a source URL without downloading it.
///
/// POST /api/v1/probe
pub async fn probe_source(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProbeRequest>,
) -> Result<Json<SourceInfo>, ApiError> {
    let url = validate_source_url(&body.url).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(e.to_string(), "validation")),
        )
    })?;

    match state.fetcher().probe(&url).await {
        Ok(info) => Ok(Json(info)),
        Err(e) => {
            debug!(url = %url, error = %e, "Probe failed");
            let status = match e {
                FetchError::ContentType { .. }
                | FetchError::TooLarge { .. }
                | FetchError::Empty => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::BAD_GATEWAY,
            };
            Err((status, Json(ErrorResponse::new(e.to_string(), "fetch"))))
        }
    }
}
