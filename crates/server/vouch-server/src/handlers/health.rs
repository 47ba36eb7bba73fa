use axum::Json;
use serde_json::{Value, json};

/// `GET /healthcheck`
pub async fn healthcheck() -> Json<Value> {
    Json(json!({ "ok": true }))
}
