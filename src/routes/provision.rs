//! Provisioning routes for token issuers and token objects

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;

use super::{error_response, json_response, read_json};
use crate::server::AppState;
use crate::types::{ProvisionTokenIssuerRequest, SecretEnvelope};

/// POST /provision_token_issuer
pub async fn handle_provision_token_issuer(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let request: ProvisionTokenIssuerRequest =
        match read_json(req, state.args.max_body_bytes).await {
            Ok(request) => request,
            Err(response) => return response,
        };

    match state.guardian.provision_issuer(&request.contract_id) {
        Ok(envelope) => json_response(StatusCode::OK, &envelope),
        Err(e) => error_response(&e),
    }
}

/// POST /provision_token_object
pub async fn handle_provision_token_object(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let secret: SecretEnvelope = match read_json(req, state.args.max_body_bytes).await {
        Ok(secret) => secret,
        Err(response) => return response,
    };

    match state.guardian.provision_object(&secret).await {
        Ok(envelope) => json_response(StatusCode::OK, &envelope),
        Err(e) => error_response(&e),
    }
}
