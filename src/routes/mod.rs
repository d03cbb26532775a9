//! HTTP routes for the guardian service

pub mod capability;
pub mod endpoints;
pub mod health;
pub mod info;
pub mod provision;

pub use capability::handle_process_capability;
pub use endpoints::handle_add_endpoint;
pub use health::health_check;
pub use info::handle_info;
pub use provision::{handle_provision_token_issuer, handle_provision_token_object};

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::types::{ErrorResponse, GuardianError};

/// JSON response with the given status
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "failed to serialize response")
        }
    }
}

/// `{"error": ...}` response for a guardian error
pub fn error_response(err: &GuardianError) -> Response<Full<Bytes>> {
    let status = err.status_code();
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    } else {
        debug!(error = %err, status = %status, "Request rejected");
    }
    error_body(status, &err.to_string())
}

pub fn error_body(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = ErrorResponse {
        error: message.to_string(),
    };
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Collect a request body no larger than `limit` and decode it as JSON
pub async fn read_json<T: DeserializeOwned>(
    req: Request<Incoming>,
    limit: usize,
) -> Result<T, Response<Full<Bytes>>> {
    let body = match Limited::new(req.into_body(), limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(error_body(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"));
        }
        Err(e) => {
            return Err(error_body(
                StatusCode::BAD_REQUEST,
                &format!("failed to read body: {e}"),
            ));
        }
    };

    serde_json::from_slice(&body)
        .map_err(|e| error_body(StatusCode::BAD_REQUEST, &format!("invalid JSON: {e}")))
}
