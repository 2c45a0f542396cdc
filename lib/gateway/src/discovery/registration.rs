// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Outbound registration: the record written to external registries and the
//! TTL-refresh loop that keeps it alive.
//!
//! The record layout is shared across processes and languages; field names
//! are part of the wire contract and must not drift.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{error, Result};

use super::ServiceDesc;

/// Key prefix for the schema side store. Backends store serialized
/// descriptor sets under `archway/registry/protofile/<file_descriptor_key>`.
pub const SCHEMA_KEY_PREFIX: &str = "archway/registry/protofile/";

/// Full side-store key for a `file_descriptor_key`.
pub fn schema_store_key(key: &str) -> String {
    format!("{SCHEMA_KEY_PREFIX}{key}")
}

/// The registration record, bit-exact for cross-process compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(rename = "Meta")]
    pub meta: RegistrationMeta,
    #[serde(rename = "Check")]
    pub check: RegistrationCheck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RegistrationMeta {
    pub service_type: String,
    pub namespace: String,
    pub group: String,
    pub file_descriptor_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationCheck {
    #[serde(rename = "TTL")]
    pub ttl: String,
    #[serde(rename = "Timeout")]
    pub timeout: String,
    #[serde(rename = "DeregisterCriticalServiceAfter")]
    pub deregister_critical_service_after: String,
}

impl Default for RegistrationCheck {
    fn default() -> Self {
        Self {
            ttl: "30s".to_string(),
            timeout: "45s".to_string(),
            deregister_critical_service_after: "60s".to_string(),
        }
    }
}

impl RegistrationRecord {
    /// Build the record for a service description. `Address` is the bare
    /// host; the wildcard v6 host normalizes to loopback.
    pub fn for_desc(desc: &ServiceDesc) -> Result<Self> {
        let (host, port) = desc
            .address
            .rsplit_once(':')
            .ok_or_else(|| error!("address {:?} is not host:port", desc.address))?;
        let port: u16 = port
            .parse()
            .map_err(|_| error!("address {:?} has a bad port", desc.address))?;
        let host = if host == "::" || host == "[::]" {
            "127.0.0.1"
        } else {
            host
        };

        Ok(Self {
            id: desc.id.clone(),
            name: desc.service.clone(),
            address: host.to_string(),
            port,
            meta: RegistrationMeta {
                service_type: desc.service_type.clone(),
                namespace: desc.namespace.clone(),
                group: desc.group.clone(),
                file_descriptor_key: desc.file_descriptor_key.clone(),
            },
            check: RegistrationCheck::default(),
        })
    }
}

/// The write side of an external registry.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Register the record; `schema` carries the descriptor blob for the
    /// side store, keyed by `file_descriptor_key`.
    async fn register(
        &self,
        record: &RegistrationRecord,
        schema: Option<(String, Bytes)>,
    ) -> Result<()>;

    /// Renew the TTL check for `service_id`.
    async fn renew(&self, service_id: &str) -> Result<()>;

    async fn deregister(&self, service_id: &str) -> Result<()>;
}

/// Register `desc` with `backend` and keep it alive: renew every
/// `interval`, deregister when `token` cancels. Renewal failures log and
/// the loop continues; the next successful renewal heals the record.
pub async fn run_ttl_registration(
    backend: Arc<dyn AgentBackend>,
    mut desc: ServiceDesc,
    interval: Duration,
    token: CancellationToken,
) -> Result<()> {
    let schema = desc.file_descriptor.as_ref().map(|blob| {
        if desc.file_descriptor_key.is_empty() {
            desc.file_descriptor_key = blob
                .file_names()
                .into_iter()
                .next()
                .unwrap_or_else(|| desc.service.clone());
        }
        (desc.file_descriptor_key.clone(), blob.to_bytes())
    });

    let record = RegistrationRecord::for_desc(&desc)?;
    backend.register(&record, schema).await?;

    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tick.reset();

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(err) = backend.renew(&desc.id).await {
                    tracing::warn!(service = %desc.service, id = %desc.id, error = %err, "ttl renewal failed");
                }
            }
            _ = token.cancelled() => {
                return backend.deregister(&desc.id).await;
            }
        }
    }
}
