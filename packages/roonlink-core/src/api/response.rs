//! HTTP response helper functions for consistent API responses.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

/// Standard API success response with JSON data.
pub fn api_success<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(data))
}

/// Acknowledgement of a command handed to the Core session.
///
/// `accepted` means queued, not executed: the zone state shows the outcome
/// on a later poll.
pub fn api_accepted(details: serde_json::Value) -> impl IntoResponse {
    let mut body = json!({ "ok": true, "accepted": true });
    if let (Some(body), serde_json::Value::Object(details)) = (body.as_object_mut(), details) {
        body.extend(details);
    }
    api_success(body)
}

/// Valid "nothing to show yet" answer for the status endpoint.
pub fn api_no_data(reason: &str, zone_id: Option<&str>) -> impl IntoResponse {
    let mut body = json!({ "available": false, "reason": reason });
    if let Some(zone_id) = zone_id {
        body["zone_id"] = json!(zone_id);
    }
    api_success(body)
}
