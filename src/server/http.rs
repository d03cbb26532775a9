//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection. POST routes share a
//! semaphore; when it is exhausted the request is answered with 429 and a
//! `Retry-After` header so clients back off and resubmit.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, RETRY_AFTER};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::capability::{CapabilityKeyStore, EndpointRegistry, KeyValueStore, MemoryStore, SledStore};
use crate::config::Args;
use crate::handlers::HandlerMap;
use crate::routes;
use crate::services::{GuardianService, GuardianSettings};
use crate::types::Result;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub guardian: Arc<GuardianService>,
    /// Bounds concurrently processed POST requests
    pub limiter: Arc<Semaphore>,
    pub started: Instant,
}

impl AppState {
    /// Open the stores named by `args` and build the standard guardian
    pub fn new(args: Args) -> Result<Self> {
        let (key_backing, endpoint_backing): (Arc<dyn KeyValueStore>, Arc<dyn KeyValueStore>) =
            if args.ephemeral {
                warn!("Ephemeral mode - capability keys will not survive restart");
                (Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
            } else {
                std::fs::create_dir_all(&args.data_dir)?;
                (
                    Arc::new(SledStore::open(args.keystore_path())?),
                    Arc::new(SledStore::open(args.endpoint_registry_path())?),
                )
            };

        let keys = Arc::new(CapabilityKeyStore::open(key_backing)?);
        let handlers = HandlerMap::standard(Duration::from_millis(args.handler_timeout_ms))?;
        let guardian = GuardianService::new(
            keys,
            EndpointRegistry::new(endpoint_backing),
            handlers,
            GuardianSettings {
                storage_service_url: args.storage_service_url.clone(),
                allowed_code_hashes: args.allowed_code_hashes.clone(),
                allowed_contract_ids: args.allowed_contract_ids.clone(),
            },
        );

        Ok(Self::with_guardian(args, Arc::new(guardian)))
    }

    pub fn with_guardian(args: Args, guardian: Arc<GuardianService>) -> Self {
        let limiter = Arc::new(Semaphore::new(args.max_concurrent_requests));
        Self {
            args,
            guardian,
            limiter,
            started: Instant::now(),
        }
    }
}

/// Bind the configured address and serve until the process exits
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("Guardian listening on {}", state.args.listen);
    serve(listener, state).await
}

/// Serve connections from an already-bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::OPTIONS, _) => preflight_response(),

        (Method::GET, "/health") => routes::health_check(Arc::clone(&state)),

        (Method::GET, "/info") => routes::handle_info(Arc::clone(&state)),

        (Method::POST, "/add_endpoint")
        | (Method::POST, "/provision_token_issuer")
        | (Method::POST, "/provision_token_object")
        | (Method::POST, "/process_capability") => {
            // Held until the handler finishes
            let _permit = match Arc::clone(&state.limiter).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(path = %path, "Guardian busy, asking client to retry");
                    return Ok(to_boxed(busy_response(state.args.retry_after_secs)));
                }
            };

            match path.as_str() {
                "/add_endpoint" => routes::handle_add_endpoint(req, Arc::clone(&state)).await,
                "/provision_token_issuer" => {
                    routes::handle_provision_token_issuer(req, Arc::clone(&state)).await
                }
                "/provision_token_object" => {
                    routes::handle_provision_token_object(req, Arc::clone(&state)).await
                }
                _ => routes::handle_process_capability(req, Arc::clone(&state)).await,
            }
        }

        _ => not_found_response(&path),
    };

    Ok(to_boxed(response))
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert("Access-Control-Allow-Headers", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response
}

fn busy_response(retry_after_secs: u64) -> Response<Full<Bytes>> {
    let mut response = routes::error_body(StatusCode::TOO_MANY_REQUESTS, "service busy");
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}

fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    routes::error_body(StatusCode::NOT_FOUND, &format!("no route for {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_busy_response_has_retry_after() {
        let response = busy_response(3);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "3");
    }

    #[test]
    fn test_ephemeral_state() {
        let args = Args::parse_from(["guardian", "--ephemeral"]);
        let state = AppState::new(args).unwrap();
        assert_eq!(state.limiter.available_permits(), 64);
        assert!(state.guardian.service_info().is_ok());
    }
}
