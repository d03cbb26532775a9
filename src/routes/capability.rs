use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;

use super::{error_response, json_response, read_json};
use crate::server::AppState;

/// POST /process_capability
///
/// The body is decoded as loose JSON so shape errors surface as the
/// guardian's own validation messages.
pub async fn handle_process_capability(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let request: Value = match read_json(req, state.args.max_body_bytes).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.guardian.process(&request).await {
        Ok(result) => json_response(StatusCode::OK, &result),
        Err(e) => error_response(&e),
    }
}
