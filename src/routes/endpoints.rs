use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;

use super::{error_response, json_response, read_json};
use crate::server::AppState;
use crate::types::{AddEndpointRequest, SuccessResponse};

/// POST /add_endpoint
pub async fn handle_add_endpoint(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let request: AddEndpointRequest = match read_json(req, state.args.max_body_bytes).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state.guardian.register_endpoint(&request) {
        Ok(()) => json_response(StatusCode::OK, &SuccessResponse { success: true }),
        Err(e) => error_response(&e),
    }
}
