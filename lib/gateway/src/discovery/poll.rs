// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The provider-neutral polling harness.
//!
//! Concrete registries differ in transport but share the same shape: poll a
//! catalog, diff against the shadow of what was last emitted, announce
//! joins and leaves, and resolve schemas lazily through a side store. A
//! [`PollingProvider`] runs that loop over any [`Catalog`]; stores with
//! watch semantics can push snapshots faster than the tick, and the
//! eventual-consistency contract (one poll interval) is unchanged.
//!
//! The shadow only advances when an event is actually handed to the notify
//! channel, so a full channel means the diff is re-observed next tick
//! rather than lost.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::descriptor::DescriptorBlob;
use crate::Result;

use super::{Provider, RegistryMessage, ServiceDesc};

/// One replica as the external registry reports it.
#[derive(Debug, Clone, Default)]
pub struct CatalogEntry {
    pub id: String,
    pub service: String,
    /// `host:port`.
    pub address: String,
    pub namespace: String,
    pub group: String,
    pub service_type: String,
    pub file_descriptor_key: String,
}

impl CatalogEntry {
    fn to_desc(&self, schema: Option<DescriptorBlob>) -> ServiceDesc {
        ServiceDesc {
            id: self.id.clone(),
            service: self.service.clone(),
            version: None,
            namespace: self.namespace.clone(),
            service_type: self.service_type.clone(),
            target_uri: self.address.clone(),
            address: self.address.clone(),
            group: self.group.clone(),
            file_descriptor_key: self.file_descriptor_key.clone(),
            file_descriptor: schema,
        }
    }
}

/// A snapshot-producing view of an external registry.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn snapshot(&self) -> Result<HashMap<String, CatalogEntry>>;
}

/// The schema side store: `file_descriptor_key` → serialized descriptor set.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Option<Bytes>>;
}

pub struct PollingProvider {
    rx: Option<mpsc::Receiver<RegistryMessage>>,
}

impl PollingProvider {
    /// Spawn the poll loop and return the provider handle for registration
    /// with the coordinator.
    pub fn spawn(
        name: impl Into<String>,
        catalog: Arc<dyn Catalog>,
        schemas: Option<Arc<dyn SchemaStore>>,
        interval: Duration,
        token: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(10);
        tokio::spawn(poll_loop(name.into(), catalog, schemas, interval, tx, token));
        Self { rx: Some(rx) }
    }
}

impl Provider for PollingProvider {
    fn notify(&mut self) -> mpsc::Receiver<RegistryMessage> {
        self.rx.take().expect("notify may only be taken once")
    }
}

async fn poll_loop(
    name: String,
    catalog: Arc<dyn Catalog>,
    schemas: Option<Arc<dyn SchemaStore>>,
    interval: Duration,
    tx: mpsc::Sender<RegistryMessage>,
    token: CancellationToken,
) {
    let mut shadow: HashMap<String, ServiceDesc> = HashMap::new();
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = token.cancelled() => return,
        }

        let services = match catalog.snapshot().await {
            Ok(services) => services,
            Err(err) => {
                tracing::debug!(provider = %name, error = %err, "catalog poll failed");
                continue;
            }
        };

        let adds: Vec<&CatalogEntry> = services
            .values()
            .filter(|entry| !shadow.contains_key(&entry.id))
            .collect();
        let dels: Vec<String> = shadow
            .keys()
            .filter(|id| !services.contains_key(*id))
            .cloned()
            .collect();

        if !adds.is_empty() || !dels.is_empty() {
            tracing::debug!(
                provider = %name,
                adds = adds.len(),
                dels = dels.len(),
                "catalog changed"
            );
        }

        for entry in adds {
            let schema = match resolve_schema(&schemas, entry).await {
                Ok(schema) => schema,
                Err(err) => {
                    tracing::warn!(
                        provider = %name,
                        service = %entry.service,
                        key = %entry.file_descriptor_key,
                        error = %err,
                        "failed to fetch file descriptor"
                    );
                    continue;
                }
            };

            let desc = entry.to_desc(schema);
            if tx
                .try_send(RegistryMessage::join(desc.clone()))
                .is_ok()
            {
                shadow.insert(entry.id.clone(), desc);
            }
        }

        for id in dels {
            let Some(desc) = shadow.get(&id).cloned() else {
                continue;
            };
            if tx.try_send(RegistryMessage::leave(desc)).is_ok() {
                shadow.remove(&id);
            }
        }
    }
}

async fn resolve_schema(
    schemas: &Option<Arc<dyn SchemaStore>>,
    entry: &CatalogEntry,
) -> Result<Option<DescriptorBlob>> {
    if entry.file_descriptor_key.is_empty() {
        return Ok(None);
    }
    let Some(store) = schemas else {
        return Ok(None);
    };

    let Some(bytes) = store.fetch(&entry.file_descriptor_key).await? else {
        crate::raise!("file descriptor not found: {}", entry.file_descriptor_key);
    };
    Ok(Some(DescriptorBlob::from_bytes(bytes)?))
}
