//! Capability relay over a bound socket
//!
//! Starts the guardian on an ephemeral port and drives it with plain HTTP
//! requests and with [`GuardianClient`].

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use contract_guardian::capability::{CapabilityKeyStore, EndpointRegistry, MemoryStore};
use contract_guardian::client::{GuardianApi, GuardianClient};
use contract_guardian::config::Args;
use contract_guardian::handlers::{CapabilityHandler, HandlerMap, Parameters};
use contract_guardian::server::{serve, AppState};
use contract_guardian::services::{capability_request, GuardianService, GuardianSettings};
use contract_guardian::types::CapabilityOperation;
use contract_guardian::Result;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;

/// Answers every call with a fixed value; each request id is accepted once
struct GetValueHandler;

#[async_trait::async_trait]
impl CapabilityHandler for GetValueHandler {
    fn unique_requests(&self) -> bool {
        true
    }

    async fn call(&self, _parameters: &Parameters) -> Result<Option<Value>> {
        Ok(Some(json!({ "value": 42 })))
    }
}

/// Holds its permit long enough for a second request to be turned away
struct SlowHandler;

#[async_trait::async_trait]
impl CapabilityHandler for SlowHandler {
    async fn call(&self, _parameters: &Parameters) -> Result<Option<Value>> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(Some(json!({ "slow": true })))
    }
}

async fn start(extra_args: &[&str]) -> (String, Arc<GuardianService>) {
    let mut handlers = HandlerMap::new();
    handlers.register("get_value", GetValueHandler);
    handlers.register("slow", SlowHandler);

    let guardian = Arc::new(GuardianService::new(
        Arc::new(CapabilityKeyStore::open(Arc::new(MemoryStore::new())).unwrap()),
        EndpointRegistry::new(Arc::new(MemoryStore::new())),
        handlers,
        GuardianSettings::default(),
    ));

    let mut argv = vec!["guardian", "--ephemeral"];
    argv.extend_from_slice(extra_args);
    let state = Arc::new(AppState::with_guardian(Args::parse_from(argv), guardian.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(serve(listener, state));
    (url, guardian)
}

fn capability(guardian: &GuardianService, minted_identity: &str, method: &str, request_id: Option<&str>) -> Value {
    let keys = guardian.key_store().create_capability_key(minted_identity).unwrap();
    let operation = CapabilityOperation {
        nonce: uuid::Uuid::new_v4().to_string(),
        request_identifier: request_id.map(str::to_string),
        method_name: method.to_string(),
        parameters: Map::new(),
    };
    capability_request(keys.encryption_key(), minted_identity, &operation).unwrap()
}

#[tokio::test]
async fn test_process_capability_and_replay() {
    let (url, guardian) = start(&[]).await;
    let http = reqwest::Client::new();
    let body = capability(&guardian, "minted-1", "get_value", Some("req-1"));

    let response = http
        .post(format!("{}/process_capability", url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({ "value": 42 }));

    // same request identifier for the same minted identity
    let replay = http
        .post(format!("{}/process_capability", url))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), 401);
}

#[tokio::test]
async fn test_missing_request_identifier_and_unknown_method() {
    let (url, guardian) = start(&[]).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{}/process_capability", url))
        .json(&capability(&guardian, "minted-2", "get_value", None))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = http
        .post(format!("{}/process_capability", url))
        .json(&capability(&guardian, "minted-2", "launch", None))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = http
        .post(format!("{}/process_capability", url))
        .json(&json!({ "minted_identity": "nobody" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_busy_guardian_answers_429() {
    let (url, guardian) = start(&["--max-concurrent-requests", "1", "--retry-after-secs", "2"]).await;
    let http = reqwest::Client::new();

    let slow = {
        let http = http.clone();
        let url = url.clone();
        let body = capability(&guardian, "minted-3", "slow", None);
        tokio::spawn(async move {
            http.post(format!("{}/process_capability", url))
                .json(&body)
                .send()
                .await
                .unwrap()
                .status()
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let busy = http
        .post(format!("{}/process_capability", url))
        .json(&capability(&guardian, "minted-3", "slow", None))
        .send()
        .await
        .unwrap();
    assert_eq!(busy.status(), 429);
    assert_eq!(busy.headers()["retry-after"], "2");

    assert_eq!(slow.await.unwrap(), 200);
}

#[tokio::test]
async fn test_client_info_and_health() {
    let (url, guardian) = start(&[]).await;

    let client = GuardianClient::new(&url).unwrap();
    let info = client.info().await.unwrap();
    assert_eq!(info, guardian.service_info().unwrap());

    let result = client
        .process_capability(&capability(&guardian, "minted-4", "get_value", Some("r")))
        .await
        .unwrap();
    assert_eq!(result["value"], 42);

    let health = reqwest::get(format!("{}/health", url)).await.unwrap();
    assert_eq!(health.status(), 200);
}
