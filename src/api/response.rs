//! Success envelope: `{ "success": true, "message"?: ..., ...payload }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug)]
pub struct ApiResponse {
    status: StatusCode,
    message: Option<String>,
    payload: Map<String, Value>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            message: None,
            payload: Map::new(),
        }
    }

    pub fn created() -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Add a top-level payload field
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.payload.insert(key.to_string(), value);
        self
    }

    fn into_body(self) -> Value {
        let mut body = Map::new();
        body.insert("success".to_string(), Value::Bool(true));
        if let Some(message) = self.message {
            body.insert("message".to_string(), Value::String(message));
        }
        body.extend(self.payload);
        Value::Object(body)
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self.into_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Pagination;

    #[test]
    fn test_envelope_flattens_payload() {
        let body = ApiResponse::ok()
            .message("Cart cleared")
            .with("cart", Vec::<u32>::new())
            .into_body();
        assert_eq!(
            body,
            serde_json::json!({"success": true, "message": "Cart cleared", "cart": []})
        );
    }

    #[test]
    fn test_message_is_optional() {
        let body = ApiResponse::ok()
            .with("pagination", Pagination::new(2, 10, 25))
            .into_body();
        assert!(body.get("message").is_none());
        assert_eq!(body["pagination"]["pages"], 3);
    }
}
