// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-logical-service state and its four flavors.
//!
//! Every service exposes a name and a one-shot `register` that binds HTTP
//! routes into a [`RouteTable`]. The flavors differ in where calls go:
//!
//! - **client**: one pre-dialed connection, user-supplied route binder
//! - **local**: no connection at all; routes dispatch in-process
//! - **dynamic**: a [`Muxer`] whose replica set changes via discovery
//! - **descriptor**: a dynamic service whose routes are synthesized from a
//!   protobuf file descriptor instead of a hand-written binder
//!
//! Reflection-style delegates from classic gateways are re-expressed as the
//! [`RouteBinder`] and client-factory closures, validated by the compiler
//! instead of at runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::descriptor::{bind_descriptor_routes, DescriptorBlob};
use crate::error::GatewayError;
use crate::muxer::{Muxer, Strategy};
use crate::routing::{RouteDoc, RouteTable};
use crate::rpc::NopConn;
use crate::ConnHandle;

/// Binds a service's routes into a table, given the connection handle calls
/// should flow through.
pub trait RouteBinder: Send + Sync {
    fn bind(&self, table: &mut RouteTable, conn: &ConnHandle) -> Result<(), GatewayError>;
}

impl<F> RouteBinder for F
where
    F: Fn(&mut RouteTable, &ConnHandle) -> Result<(), GatewayError> + Send + Sync,
{
    fn bind(&self, table: &mut RouteTable, conn: &ConnHandle) -> Result<(), GatewayError> {
        self(table, conn)
    }
}

/// A named routable entity. `register` is called exactly once by the
/// gateway; calling it twice is a [`GatewayError::DuplicateRegistration`].
pub trait Service: Send + Sync {
    fn service_name(&self) -> &str;

    fn register(&self, table: &mut RouteTable) -> Result<Vec<RouteDoc>, GatewayError>;
}

/// The mutable facet of services whose replica set changes at runtime.
pub trait DynamicFacet: Send + Sync {
    /// Returns false when the id is already present (idempotent join).
    fn add_conn(&self, service_id: &str, conn: ConnHandle) -> bool;

    /// Returns the evicted connection; the caller owns closing it.
    fn remove_conn(&self, service_id: &str) -> Option<ConnHandle>;

    fn has_conn(&self, service_id: &str) -> bool;

    fn conn_count(&self) -> usize;
}

impl DynamicFacet for Muxer {
    fn add_conn(&self, service_id: &str, conn: ConnHandle) -> bool {
        self.add(service_id, conn)
    }

    fn remove_conn(&self, service_id: &str) -> Option<ConnHandle> {
        self.remove(service_id)
    }

    fn has_conn(&self, service_id: &str) -> bool {
        self.contains(service_id)
    }

    fn conn_count(&self) -> usize {
        self.len()
    }
}

fn guard_single_registration(
    name: &str,
    registered: &AtomicBool,
) -> Result<(), GatewayError> {
    if registered.swap(true, Ordering::SeqCst) {
        return Err(GatewayError::DuplicateRegistration(name.to_string()));
    }
    Ok(())
}

/// Static-client service: wraps one pre-dialed connection.
pub struct ClientService {
    name: String,
    conn: ConnHandle,
    binder: Arc<dyn RouteBinder>,
    registered: AtomicBool,
}

impl ClientService {
    pub fn new(
        name: impl Into<String>,
        conn: ConnHandle,
        binder: impl RouteBinder + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            conn,
            binder: Arc::new(binder),
            registered: AtomicBool::new(false),
        }
    }
}

impl Service for ClientService {
    fn service_name(&self) -> &str {
        &self.name
    }

    fn register(&self, table: &mut RouteTable) -> Result<Vec<RouteDoc>, GatewayError> {
        guard_single_registration(&self.name, &self.registered)?;
        let before = table.len();
        self.binder.bind(table, &self.conn)?;
        Ok(table.docs().split_off(before))
    }
}

/// Local-impl service: the binder closes over the in-process implementation
/// and dispatches without any connection.
pub struct LocalService {
    name: String,
    binder: Arc<dyn RouteBinder>,
    registered: AtomicBool,
}

impl LocalService {
    pub fn new(name: impl Into<String>, binder: impl RouteBinder + 'static) -> Self {
        Self {
            name: name.into(),
            binder: Arc::new(binder),
            registered: AtomicBool::new(false),
        }
    }
}

impl Service for LocalService {
    fn service_name(&self) -> &str {
        &self.name
    }

    fn register(&self, table: &mut RouteTable) -> Result<Vec<RouteDoc>, GatewayError> {
        guard_single_registration(&self.name, &self.registered)?;
        let before = table.len();
        let conn: ConnHandle = Arc::new(NopConn);
        self.binder.bind(table, &conn)?;
        Ok(table.docs().split_off(before))
    }
}

/// Dynamic service: routes bind against the muxer, and the replica set is
/// mutated through the [`DynamicFacet`].
pub struct DynamicService {
    name: String,
    muxer: Arc<Muxer>,
    binder: Arc<dyn RouteBinder>,
    registered: AtomicBool,
}

impl DynamicService {
    pub fn new(name: impl Into<String>, binder: impl RouteBinder + 'static) -> Self {
        Self::with_strategy(name, Strategy::default(), binder)
    }

    pub fn with_strategy(
        name: impl Into<String>,
        strategy: Strategy,
        binder: impl RouteBinder + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            muxer: Arc::new(Muxer::new(strategy)),
            binder: Arc::new(binder),
            registered: AtomicBool::new(false),
        }
    }

    pub fn muxer(&self) -> Arc<Muxer> {
        self.muxer.clone()
    }
}

impl Service for DynamicService {
    fn service_name(&self) -> &str {
        &self.name
    }

    fn register(&self, table: &mut RouteTable) -> Result<Vec<RouteDoc>, GatewayError> {
        guard_single_registration(&self.name, &self.registered)?;
        let before = table.len();
        let conn: ConnHandle = self.muxer.clone();
        self.binder.bind(table, &conn)?;
        Ok(table.docs().split_off(before))
    }
}

impl DynamicFacet for DynamicService {
    fn add_conn(&self, service_id: &str, conn: ConnHandle) -> bool {
        self.muxer.add(service_id, conn)
    }

    fn remove_conn(&self, service_id: &str) -> Option<ConnHandle> {
        self.muxer.remove(service_id)
    }

    fn has_conn(&self, service_id: &str) -> bool {
        self.muxer.contains(service_id)
    }

    fn conn_count(&self) -> usize {
        self.muxer.len()
    }
}

/// Descriptor-built service: everything the gateway knows arrives in the
/// file descriptor, handlers included.
pub struct DescriptorService {
    name: String,
    blob: DescriptorBlob,
    muxer: Arc<Muxer>,
    registered: AtomicBool,
}

impl DescriptorService {
    pub fn new(name: impl Into<String>, blob: DescriptorBlob) -> Self {
        Self {
            name: name.into(),
            blob,
            muxer: Arc::new(Muxer::default()),
            registered: AtomicBool::new(false),
        }
    }

    pub fn muxer(&self) -> Arc<Muxer> {
        self.muxer.clone()
    }

    pub fn blob(&self) -> &DescriptorBlob {
        &self.blob
    }
}

impl Service for DescriptorService {
    fn service_name(&self) -> &str {
        &self.name
    }

    fn register(&self, table: &mut RouteTable) -> Result<Vec<RouteDoc>, GatewayError> {
        guard_single_registration(&self.name, &self.registered)?;
        bind_descriptor_routes(table, &self.blob, self.muxer.clone())
    }
}

impl DynamicFacet for DescriptorService {
    fn add_conn(&self, service_id: &str, conn: ConnHandle) -> bool {
        self.muxer.add(service_id, conn)
    }

    fn remove_conn(&self, service_id: &str) -> Option<ConnHandle> {
        self.muxer.remove(service_id)
    }

    fn has_conn(&self, service_id: &str) -> bool {
        self.muxer.contains(service_id)
    }

    fn conn_count(&self) -> usize {
        self.muxer.len()
    }
}
