pub mod library;

use axum::response::Json;
use serde_json::{Value, json};

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "ok": true }))
}
