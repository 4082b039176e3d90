use axum::response::Json;
use serde_json::{json, Value};

#[axum::debug_handler]
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "success": true }))
}
