// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! A runnable gateway for kicking the tires.
//!
//! Serves a locally-implemented echo under `GET /api/echo`, and — when
//! `--echo-target` points at a gRPC server implementing `echo.Echo` — a
//! descriptor-built echo under the same schema's annotations, wired through
//! an in-memory discovery catalog.

use std::sync::Arc;
use std::time::Duration;

use axum::response::IntoResponse;
use clap::Parser;

use archway_gateway::descriptor::testing;
use archway_gateway::discovery::{CatalogEntry, MemoryCatalog, PollingProvider, Provider};
use archway_gateway::routing::{RouteHandler, RouteTable};
use archway_gateway::service::LocalService;
use archway_gateway::{ConnHandle, Gateway, GatewayOptions};

#[derive(Parser, Debug)]
#[command(name = "archway-run", about = "Run a demo archway gateway")]
struct Args {
    /// HTTP listen address.
    #[arg(long, default_value = "0.0.0.0:8080", env = "ARCHWAY_LISTEN")]
    listen: String,

    /// Address of a gRPC server implementing `echo.Echo`; when set, the
    /// gateway discovers it and routes `GET /api/echo` to it.
    #[arg(long)]
    echo_target: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    archway_logging::init();
    let args = Args::parse();

    let gateway = Gateway::new(GatewayOptions::from_env())?;

    match &args.echo_target {
        Some(target) => {
            // announce the remote echo replica through an in-memory catalog;
            // the gateway builds its routes from the shipped descriptor
            let catalog = Arc::new(MemoryCatalog::new());
            catalog.put_schema("echo.proto", testing::echo_blob().to_bytes());
            catalog.add(CatalogEntry {
                id: "echo-1".to_string(),
                service: "Echo".to_string(),
                address: target.clone(),
                service_type: "rpc_server".to_string(),
                file_descriptor_key: "echo.proto".to_string(),
                ..CatalogEntry::default()
            });

            let token = gateway.shutdown_token();
            gateway.coordinator().register_provider("memory", move || {
                Box::new(PollingProvider::spawn(
                    "memory",
                    catalog.clone(),
                    Some(catalog.clone()),
                    Duration::from_secs(5),
                    token.clone(),
                )) as Box<dyn Provider>
            });
            tracing::info!(target = %target, "echo backend will be discovered");
        }
        None => {
            gateway.register_service(Arc::new(local_echo()))?;
            tracing::info!("serving local echo at GET /api/echo");
        }
    }

    let token = gateway.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
            token.cancel();
        }
    });

    gateway.serve_on(&args.listen).await
}

fn local_echo() -> LocalService {
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

    LocalService::new("Echo", move |table: &mut RouteTable, _conn: &ConnHandle| {
        table.bind(axum::http::Method::GET, "/api/echo", handler.clone())
    })
}
