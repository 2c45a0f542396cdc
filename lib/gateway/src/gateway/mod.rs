// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The gateway runtime.
//!
//! Owns the HTTP server, the routing table pool, the service table, and the
//! bridge between discovery events and per-service connection sets. The
//! lifecycle is phase-ordered (Init → Setup → Serving): services may be
//! registered in any phase, and wiring is deferred to Setup when
//! registration happens earlier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use axum::routing::MethodRouter;
use axum::Router;
use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::discovery::{Coordinator, MessageMethod, RegistryMessage};
use crate::error::GatewayError;
use crate::metrics::GatewayMetrics;
use crate::muxpool::MuxPool;
use crate::routing::{RouteHandler, RouteTable};
use crate::rpc::{Dialer, SignalConn, TonicDialer};
use crate::runqueue::{Phase, RunQueue};
use crate::service::{DescriptorService, DynamicFacet, Service};
use crate::{raise, Result};

mod http;

pub use http::MAX_BODY_BYTES;

/// Construction-time knobs. Everything has a sensible default; tests
/// typically swap the dialer and drive the coordinator by hand.
pub struct GatewayOptions {
    pub config: GatewayConfig,
    coordinator: Option<Arc<Coordinator>>,
    dialer: Option<Arc<dyn Dialer>>,
    not_found: Option<RouteHandler>,
    metrics_path: String,
    debug_path: String,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            config: GatewayConfig::default(),
            coordinator: None,
            dialer: None,
            not_found: None,
            metrics_path: "/metrics".to_string(),
            debug_path: "/debug/pprof".to_string(),
        }
    }
}

impl GatewayOptions {
    pub fn from_env() -> Self {
        Self {
            config: GatewayConfig::from_env(),
            ..Self::default()
        }
    }

    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_coordinator(mut self, coordinator: Arc<Coordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    pub fn with_not_found(mut self, handler: RouteHandler) -> Self {
        self.not_found = Some(handler);
        self
    }

    pub fn with_metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = path.into();
        self
    }

    pub fn with_debug_path(mut self, path: impl Into<String>) -> Self {
        self.debug_path = path.into();
        self
    }
}

struct ServiceEntry {
    service: Arc<dyn Service>,
    facet: Option<Arc<dyn DynamicFacet>>,
}

pub(crate) struct GatewayInner {
    config: GatewayConfig,
    metrics_path: String,
    debug_path: String,
    services: DashMap<String, ServiceEntry>,
    routes: RwLock<RouteTable>,
    pool: MuxPool,
    runqueue: Mutex<RunQueue>,
    coordinator: Arc<Coordinator>,
    dialer: Arc<dyn Dialer>,
    metrics: GatewayMetrics,
    not_found: Option<RouteHandler>,
    user_routes: Mutex<Vec<(String, MethodRouter)>>,
    root_token: CancellationToken,
    started: AtomicBool,
}

#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    pub fn new(options: GatewayOptions) -> Result<Self> {
        let config = options.config;
        let pool = MuxPool::new(config.mux_pool_size, Arc::new(RouteTable::new()));
        let coordinator = options.coordinator.unwrap_or_else(|| {
            Arc::new(Coordinator::new(
                config.discovery_channel_capacity,
                config.overflow_drain_interval,
            ))
        });
        let dialer = options
            .dialer
            .unwrap_or_else(|| Arc::new(TonicDialer::new()));

        Ok(Self {
            inner: Arc::new(GatewayInner {
                config,
                metrics_path: options.metrics_path,
                debug_path: options.debug_path,
                services: DashMap::new(),
                routes: RwLock::new(RouteTable::new()),
                pool,
                runqueue: Mutex::new(RunQueue::new()),
                coordinator,
                dialer,
                metrics: GatewayMetrics::new()?,
                not_found: options.not_found,
                user_routes: Mutex::new(Vec::new()),
                root_token: CancellationToken::new(),
                started: AtomicBool::new(false),
            }),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(GatewayOptions::default())
    }

    /// The discovery coordinator this gateway subscribes to. Providers are
    /// registered here.
    pub fn coordinator(&self) -> Arc<Coordinator> {
        self.inner.coordinator.clone()
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.inner.metrics
    }

    /// Cancelling this token unwinds every background loop and stops the
    /// HTTP server.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.root_token.clone()
    }

    /// Register a static service (client or local flavor).
    pub fn register_service(&self, service: Arc<dyn Service>) -> Result<()> {
        self.inner.clone().register_entry(service, None)
    }

    /// Register a service that also exposes the dynamic facet, so discovery
    /// joins and leaves reach its connection set.
    pub fn register_dynamic<S>(&self, service: Arc<S>) -> Result<()>
    where
        S: Service + DynamicFacet + 'static,
    {
        let facet: Arc<dyn DynamicFacet> = service.clone();
        self.inner.clone().register_entry(service, Some(facet))
    }

    /// Mount a user handler at an absolute path, outside the API prefix.
    pub fn route(&self, path: impl Into<String>, handler: MethodRouter) {
        self.inner
            .user_routes
            .lock()
            .unwrap()
            .push((path.into(), handler));
    }

    /// Run Init and Setup without binding a listener: starts the discovery
    /// coordinator, the discovery bridge, and wires every queued service.
    pub async fn start(&self) -> Result<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            raise!("gateway already started");
        }

        {
            let mut runqueue = self.inner.runqueue.lock().unwrap();
            runqueue.advance(Phase::Init)?;
        }

        self.spawn_discovery();

        {
            let mut runqueue = self.inner.runqueue.lock().unwrap();
            runqueue.advance(Phase::Setup)?;
        }

        // publish the routes the Setup drain accumulated
        let snapshot = Arc::new(self.inner.routes.read().unwrap().clone());
        self.inner.pool.prime(snapshot);

        Ok(())
    }

    /// Serve HTTP on the configured listen address until shutdown.
    pub async fn serve(&self) -> Result<()> {
        let addr = format!(
            "{}:{}",
            self.inner.config.http_host, self.inner.config.http_port
        );
        self.serve_on(&addr).await
    }

    /// Serve HTTP on `addr` until the shutdown token fires.
    pub async fn serve_on(&self, addr: &str) -> Result<()> {
        self.start().await?;

        let router = self.router();
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "gateway listening");

        let observer = self.inner.root_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(observer.cancelled_owned())
            .await?;
        Ok(())
    }

    /// The assembled HTTP handler chain. Exposed so callers can layer
    /// middleware or drive the gateway without a socket.
    pub fn router(&self) -> Router {
        http::build_router(self.inner.clone())
    }

    fn spawn_discovery(&self) {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<RegistryMessage>();
        self.inner.coordinator.discovery(move |message| {
            let _ = tx.send(message.clone());
        });

        {
            let coordinator = self.inner.coordinator.clone();
            let token = self.inner.root_token.clone();
            tokio::spawn(async move {
                if let Err(err) = coordinator.start(token).await {
                    tracing::error!(error = %err, "discovery coordinator stopped");
                }
            });
        }

        let inner = self.inner.clone();
        let token = self.inner.root_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = rx.recv() => {
                        let Some(message) = message else { break };
                        inner.handle_discovery(message).await;
                    }
                    _ = token.cancelled() => break,
                }
            }
        });
    }
}

impl GatewayInner {
    fn register_entry(
        self: Arc<Self>,
        service: Arc<dyn Service>,
        facet: Option<Arc<dyn DynamicFacet>>,
    ) -> Result<()> {
        let name = service.service_name().to_string();

        match self.services.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(GatewayError::DuplicateRegistration(name).into());
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(ServiceEntry { service, facet });
            }
        }

        let inner = self.clone();
        let wired_name = name.clone();
        self.runqueue
            .lock()
            .unwrap()
            .call(Phase::Setup, move || inner.wire(&wired_name))
    }

    /// Bind one registered service's routes into the canonical table and
    /// publish a fresh snapshot.
    fn wire(&self, name: &str) -> Result<()> {
        let entry = self
            .services
            .get(name)
            .ok_or_else(|| GatewayError::ServiceNotFound(name.to_string()))?;

        let docs = {
            let mut routes = self.routes.write().unwrap();
            entry.service.register(&mut routes)?
        };
        for doc in &docs {
            tracing::info!(service = %name, route = %doc, "registered http route");
        }

        self.pool
            .prime(Arc::new(self.routes.read().unwrap().clone()));
        Ok(())
    }

    /// Rebuild every pool slot from the canonical table, one slot at a time
    /// so at least one ready table serves throughout.
    async fn refresh_pool(&self) {
        for idx in 0..self.pool.len() {
            let snapshot = Arc::new(self.routes.read().unwrap().clone());
            let handle = self.pool.update(idx, move || Some(snapshot));
            if let Err(err) = handle.await {
                tracing::error!(slot = idx, error = %err, "route table rebuild failed");
            }
        }
    }

    async fn handle_discovery(self: &Arc<Self>, message: RegistryMessage) {
        let desc = message.desc;
        match message.method {
            MessageMethod::Join => {
                tracing::debug!(
                    service = %desc.service,
                    id = %desc.id,
                    target = %desc.target_uri,
                    "service join"
                );

                let facet = match self.services.get(&desc.service) {
                    Some(entry) => match &entry.facet {
                        Some(facet) => facet.clone(),
                        None => {
                            tracing::debug!(
                                service = %desc.service,
                                "join for statically-wired service, ignoring"
                            );
                            return;
                        }
                    },
                    None => {
                        let Some(blob) = desc.file_descriptor.clone() else {
                            tracing::warn!(
                                service = %desc.service,
                                id = %desc.id,
                                "dropping join: no schema and no prior registration"
                            );
                            return;
                        };

                        let service = Arc::new(DescriptorService::new(desc.service.clone(), blob));
                        let facet: Arc<dyn DynamicFacet> = service.clone();
                        if let Err(err) = self
                            .clone()
                            .register_entry(service, Some(facet.clone()))
                        {
                            tracing::error!(
                                service = %desc.service,
                                error = %err,
                                "failed to materialize descriptor service"
                            );
                            return;
                        }
                        self.refresh_pool().await;
                        facet
                    }
                };

                if facet.has_conn(&desc.id) {
                    return;
                }

                let conn = match self.dialer.dial(&desc.target_uri).await {
                    Ok(conn) => conn,
                    Err(err) => {
                        // a later leave/join cycle corrects the state
                        tracing::warn!(
                            service = %desc.service,
                            id = %desc.id,
                            target = %desc.target_uri,
                            error = %err,
                            "dial failed"
                        );
                        return;
                    }
                };

                let signal = SignalConn::wrap(conn);
                self.watch_conn_errors(&desc.service, &desc.id, signal.clone());

                if facet.add_conn(&desc.id, signal) {
                    tracing::debug!(
                        service = %desc.service,
                        id = %desc.id,
                        target = %desc.target_uri,
                        "service connected"
                    );
                }
            }
            MessageMethod::Leave => {
                tracing::debug!(service = %desc.service, id = %desc.id, "service leave");
                if let Some(entry) = self.services.get(&desc.service) {
                    if let Some(facet) = &entry.facet {
                        // the evicted handle drops asynchronously; in-flight
                        // calls on it run to completion
                        let evicted = facet.remove_conn(&desc.id);
                        if evicted.is_some() {
                            tracing::debug!(
                                service = %desc.service,
                                id = %desc.id,
                                "service disconnected"
                            );
                        }
                    }
                }
            }
        }
    }

    fn watch_conn_errors(&self, service: &str, id: &str, conn: Arc<SignalConn>) {
        let mut errors = conn.subscribe();
        let service = service.to_string();
        let id = id.to_string();
        let token = self.root_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                changed = errors.changed() => {
                    if changed.is_ok() {
                        tracing::warn!(
                            service = %service,
                            id = %id,
                            "connection reported a transport error"
                        );
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RouteTable;
    use crate::service::LocalService;
    use crate::ConnHandle;
    use axum::response::IntoResponse;
    use ::http::Method;

    fn echo_local_service() -> Arc<LocalService> {
        Arc::new(LocalService::new(
            "Echo",
            |table: &mut RouteTable, _conn: &ConnHandle| {
                table.bind(
                    Method::GET,
                    "/api/echo",
                    Arc::new(|_parts| Box::pin(async { "ok".into_response() })),
                )
            },
        ))
    }

    #[tokio::test]
    async fn test_registration_is_wired_at_setup() {
        let gateway = Gateway::with_defaults().unwrap();
        gateway.register_service(echo_local_service()).unwrap();

        // nothing routable before Setup runs
        assert!(gateway
            .inner
            .pool
            .get()
            .lookup(&Method::GET, "/api/echo")
            .is_none());

        gateway.start().await.unwrap();
        assert!(gateway
            .inner
            .pool
            .get()
            .lookup(&Method::GET, "/api/echo")
            .is_some());

        gateway.shutdown_token().cancel();
    }

    #[tokio::test]
    async fn test_registration_after_setup_runs_inline() {
        let gateway = Gateway::with_defaults().unwrap();
        gateway.start().await.unwrap();

        gateway.register_service(echo_local_service()).unwrap();
        assert!(gateway
            .inner
            .pool
            .get()
            .lookup(&Method::GET, "/api/echo")
            .is_some());

        gateway.shutdown_token().cancel();
    }

    #[tokio::test]
    async fn test_duplicate_service_name_fails_fast() {
        let gateway = Gateway::with_defaults().unwrap();
        gateway.register_service(echo_local_service()).unwrap();

        let err = gateway
            .register_service(echo_local_service())
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }
}
