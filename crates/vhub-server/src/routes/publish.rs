use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;

use vhub_core::PublishReport;

use crate::error::{Result, ServerError};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/topics/:topic/publish", post(publish))
}

#[derive(Serialize)]
struct PublishResponse {
    success: bool,
    topic: String,
    report: PublishReport,
}

/// Publish an arbitrary JSON payload to a topic. Requires the admin role.
async fn publish(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<PublishResponse>> {
    let principal = state.auth.authenticate(&headers, None)?;
    if !principal.is_admin() {
        return Err(ServerError::Forbidden(format!(
            "role {} may not publish",
            principal.role
        )));
    }

    let report = state.hub.publish(&topic, &payload)?;
    tracing::info!(
        user_id = %principal.user_id,
        topic = %topic,
        delivered = report.delivered,
        evicted = report.evicted,
        "published via api"
    );

    Ok(Json(PublishResponse {
        success: true,
        topic,
        report,
    }))
}
