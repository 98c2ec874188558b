use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let status = if state.hub.is_stopped() {
        "stopping"
    } else {
        "healthy"
    };

    Json(json!({
        "status": status,
        "service": "vhub-server",
        "version": env!("CARGO_PKG_VERSION"),
        "hub": state.hub.stats(),
        "outbox_capacity": state.hub.config().outbox_capacity(),
    }))
}
