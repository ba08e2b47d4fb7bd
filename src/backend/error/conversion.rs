/**
 * Error Conversion
 *
 * This module provides conversion implementations for backend errors,
 * allowing them to be returned directly from Axum handlers (the WebSocket
 * handshake refusal and the health route).
 *
 * # Response Format
 *
 * Error responses are returned as JSON with the following structure:
 * ```json
 * {
 *   "error": "Authentication failed: token expired",
 *   "code": 4001,
 *   "status": 401
 * }
 * ```
 */

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::backend::error::types::BackendError;

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.wire_message();
        let code = self.code();

        let body = serde_json::json!({
            "error": message,
            "code": code,
            "status": status.as_u16(),
        });

        Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap_or_else(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response())
    }
}
