// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios: registration, discovery-driven routing, replica
//! balancing, and teardown, driven through the assembled router without
//! sockets.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use prost_reflect::{DynamicMessage, Value};
use tonic::metadata::MetadataMap;
use tonic::Status;
use tower::ServiceExt;

use archway_gateway::descriptor::testing;
use archway_gateway::discovery::{CatalogEntry, MemoryCatalog, PollingProvider, Provider};
use archway_gateway::routing::{RouteHandler, RouteTable};
use archway_gateway::rpc::{StreamReply, UnaryCall, UnaryReply};
use archway_gateway::service::LocalService;
use archway_gateway::{
    ConnHandle, Dialer, Gateway, GatewayOptions, Result, RpcConn,
};

/// A connection that implements the echo contract and records which target
/// served each call.
struct EchoConn {
    target: String,
    hits: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl RpcConn for EchoConn {
    async fn invoke(&self, call: UnaryCall) -> std::result::Result<UnaryReply, Status> {
        self.hits.lock().unwrap().push(self.target.clone());

        let mut message = DynamicMessage::new(call.output.clone());
        if let (Some(say_field), Some(msg_field)) = (
            call.input.get_field_by_name("say"),
            call.output.get_field_by_name("message"),
        ) {
            let say = call
                .request
                .get_field(&say_field)
                .as_str()
                .unwrap_or_default()
                .to_string();
            message.set_field(&msg_field, Value::String(format!("you said {say}")));
        }
        Ok(UnaryReply {
            message,
            metadata: MetadataMap::new(),
        })
    }

    async fn open_stream(&self, _call: UnaryCall) -> std::result::Result<StreamReply, Status> {
        Err(Status::unimplemented("unary only"))
    }
}

/// Hands out [`EchoConn`]s instead of dialing sockets.
struct EchoDialer {
    hits: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Dialer for EchoDialer {
    async fn dial(&self, target: &str) -> Result<ConnHandle> {
        Ok(Arc::new(EchoConn {
            target: target.to_string(),
            hits: self.hits.clone(),
        }))
    }
}

fn echo_entry(id: &str, address: &str) -> CatalogEntry {
    CatalogEntry {
        id: id.to_string(),
        service: "Echo".to_string(),
        address: address.to_string(),
        service_type: "rpc_server".to_string(),
        file_descriptor_key: "echo.proto".to_string(),
        ..CatalogEntry::default()
    }
}

struct Harness {
    gateway: Gateway,
    catalog: Arc<MemoryCatalog>,
    hits: Arc<Mutex<Vec<String>>>,
}

async fn discovery_harness() -> Harness {
    let hits = Arc::new(Mutex::new(Vec::new()));
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.put_schema("echo.proto", testing::echo_blob().to_bytes());

    let gateway = Gateway::new(
        GatewayOptions::default().with_dialer(Arc::new(EchoDialer { hits: hits.clone() })),
    )
    .unwrap();

    let token = gateway.shutdown_token();
    {
        let catalog = catalog.clone();
        gateway.coordinator().register_provider("memory", move || {
            Box::new(PollingProvider::spawn(
                "memory",
                catalog.clone(),
                Some(catalog.clone()),
                Duration::from_millis(20),
                token.clone(),
            )) as Box<dyn Provider>
        });
    }

    gateway.start().await.unwrap();
    Harness {
        gateway,
        catalog,
        hits,
    }
}

async fn get(gateway: &Gateway, uri: &str) -> (StatusCode, String) {
    let response = gateway
        .router()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

/// S1: a locally-implemented service bound under the API prefix.
#[tokio::test]
async fn test_static_local_bind() {
    let gateway = Gateway::with_defaults().unwrap();

    let handler: RouteHandler = Arc::new(|parts| {
        Box::pin(async move {
            let say = parts
                .query_pairs()
                .into_iter()
                .find(|(key, _)| key == "say")
                .map(|(_, value)| value)
                .unwrap_or_default();
            axum::Json(serde_json::json!({ "message": format!("you said {say}") }))
                .into_response()
        })
    });
    gateway
        .register_service(Arc::new(LocalService::new(
            "Echo",
            move |table: &mut RouteTable, _conn: &ConnHandle| {
                table.bind(axum::http::Method::GET, "/api/echo", handler.clone())
            },
        )))
        .unwrap();

    gateway.start().await.unwrap();

    let (status, body) = get(&gateway, "/api/echo?say=hi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"message":"you said hi"}"#);

    gateway.shutdown_token().cancel();
}

/// S2: an unknown service joins with a file descriptor and becomes routable.
#[tokio::test]
async fn test_dynamic_join_routes_within_a_second() {
    let h = discovery_harness().await;

    h.catalog.add(echo_entry("e1", "127.0.0.1:5001"));
    tokio::time::sleep(Duration::from_millis(300)).await;

    let (status, body) = get(&h.gateway, "/api/echo?say=one").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"message":"you said one"}"#);
    assert_eq!(h.hits.lock().unwrap().as_slice(), ["127.0.0.1:5001"]);

    h.gateway.shutdown_token().cancel();
}

/// S3: two replicas split round-robin traffic exactly in half.
#[tokio::test]
async fn test_replica_balance() {
    let h = discovery_harness().await;

    h.catalog.add(echo_entry("e1", "127.0.0.1:5001"));
    h.catalog.add(echo_entry("e2", "127.0.0.1:5002"));
    tokio::time::sleep(Duration::from_millis(300)).await;

    for _ in 0..10 {
        let (status, _) = get(&h.gateway, "/api/echo?say=x").await;
        assert_eq!(status, StatusCode::OK);
    }

    let hits = h.hits.lock().unwrap();
    let per_target = hits.iter().fold(HashMap::<&str, usize>::new(), |mut acc, t| {
        *acc.entry(t.as_str()).or_default() += 1;
        acc
    });
    assert_eq!(per_target.get("127.0.0.1:5001"), Some(&5));
    assert_eq!(per_target.get("127.0.0.1:5002"), Some(&5));

    h.gateway.shutdown_token().cancel();
}

/// S4: leaves drain replicas; an empty muxer yields 503.
#[tokio::test]
async fn test_leave_then_unavailable() {
    let h = discovery_harness().await;

    h.catalog.add(echo_entry("e1", "127.0.0.1:5001"));
    h.catalog.add(echo_entry("e2", "127.0.0.1:5002"));
    tokio::time::sleep(Duration::from_millis(300)).await;

    h.catalog.remove("e1");
    tokio::time::sleep(Duration::from_millis(300)).await;
    h.hits.lock().unwrap().clear();

    for _ in 0..10 {
        let (status, _) = get(&h.gateway, "/api/echo?say=x").await;
        assert_eq!(status, StatusCode::OK);
    }
    assert!(h
        .hits
        .lock()
        .unwrap()
        .iter()
        .all(|target| target == "127.0.0.1:5002"));

    h.catalog.remove("e2");
    tokio::time::sleep(Duration::from_millis(300)).await;

    let (status, body) = get(&h.gateway, "/api/echo?say=x").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("no available connection"));

    h.gateway.shutdown_token().cancel();
}

/// Idempotent join: re-announcing a live replica does not double it.
#[tokio::test]
async fn test_idempotent_join() {
    let h = discovery_harness().await;

    h.catalog.add(echo_entry("e1", "127.0.0.1:5001"));
    tokio::time::sleep(Duration::from_millis(200)).await;

    // bounce the entry through a remove/add with the same id and target
    h.catalog.remove("e1");
    tokio::time::sleep(Duration::from_millis(200)).await;
    h.catalog.add(echo_entry("e1", "127.0.0.1:5001"));
    h.catalog.add(echo_entry("e1b", "127.0.0.1:5001"));
    tokio::time::sleep(Duration::from_millis(300)).await;

    h.hits.lock().unwrap().clear();
    for _ in 0..4 {
        let (status, _) = get(&h.gateway, "/api/echo?say=x").await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(h.hits.lock().unwrap().len(), 4);

    h.gateway.shutdown_token().cancel();
}

/// Joins without a schema and without a prior registration are dropped.
#[tokio::test]
async fn test_schemaless_unknown_join_is_dropped() {
    let h = discovery_harness().await;

    let mut entry = echo_entry("m1", "127.0.0.1:6001");
    entry.service = "Mystery".to_string();
    entry.file_descriptor_key = String::new();
    h.catalog.add(entry);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let (status, _) = get(&h.gateway, "/api/mystery").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(h.hits.lock().unwrap().is_empty());

    h.gateway.shutdown_token().cancel();
}

/// Infrastructure surface: metrics endpoint, user routes, not-found.
#[tokio::test]
async fn test_http_surface() {
    let gateway = Gateway::with_defaults().unwrap();
    gateway.route("/healthz", axum::routing::get(|| async { "OK" }));
    gateway.start().await.unwrap();

    let (status, body) = get(&gateway, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let (status, _) = get(&gateway, "/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&gateway, "/outside").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (metrics_status, metrics_body) = get(&gateway, "/metrics").await;
    assert_eq!(metrics_status, StatusCode::OK);
    assert!(metrics_body.contains("archway_gateway_inflight_requests"));

    gateway.shutdown_token().cancel();
}
