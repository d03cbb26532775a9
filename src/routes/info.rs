use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;

use super::{error_response, json_response};
use crate::server::AppState;

/// GET /info: the guardian's service keys and storage service URL
pub fn handle_info(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.guardian.service_info() {
        Ok(info) => json_response(StatusCode::OK, &info),
        Err(e) => error_response(&e),
    }
}
