// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-memory discovery backends: the default agent, and a mutable catalog
//! that drives the polling provider in tests and demos.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::Result;

use super::agent::{Agent, LookupFilter};
use super::poll::{Catalog, CatalogEntry, SchemaStore};
use super::ServiceDesc;

/// A simple in-memory implementation of the [`Agent`] contract.
#[derive(Default)]
pub struct MemoryAgent {
    services: DashMap<String, ServiceDesc>,
}

impl MemoryAgent {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Agent for MemoryAgent {
    fn register(&self, desc: ServiceDesc) -> Result<()> {
        self.services.insert(desc.id.clone(), desc);
        Ok(())
    }

    fn deregister(&self, service_id: &str) -> Result<()> {
        self.services.remove(service_id);
        Ok(())
    }

    fn lookup(&self, service_name: &str, filter: &LookupFilter) -> (Vec<ServiceDesc>, bool) {
        let matches: Vec<ServiceDesc> = self
            .services
            .iter()
            .filter(|entry| entry.service == service_name && filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        let present = !matches.is_empty();
        (matches, present)
    }
}

/// A mutable in-memory catalog plus schema side store. Snapshots reflect
/// whatever `add`/`remove` have done by poll time, which makes it the
/// standard way to exercise join/leave flows without an external registry.
#[derive(Default)]
pub struct MemoryCatalog {
    entries: DashMap<String, CatalogEntry>,
    schemas: DashMap<String, Bytes>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, entry: CatalogEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    pub fn remove(&self, id: &str) {
        self.entries.remove(id);
    }

    pub fn put_schema(&self, key: impl Into<String>, bytes: Bytes) {
        self.schemas.insert(key.into(), bytes);
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn snapshot(&self) -> Result<HashMap<String, CatalogEntry>> {
        Ok(self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }
}

#[async_trait]
impl SchemaStore for MemoryCatalog {
    async fn fetch(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.schemas.get(key).map(|bytes| bytes.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(id: &str, service: &str, namespace: &str, service_type: &str) -> ServiceDesc {
        ServiceDesc {
            id: id.to_string(),
            service: service.to_string(),
            namespace: namespace.to_string(),
            service_type: service_type.to_string(),
            ..ServiceDesc::default()
        }
    }

    #[test]
    fn test_register_lookup_deregister() {
        let agent = MemoryAgent::new();
        agent.register(desc("e1", "Echo", "prod", "rpc_server")).unwrap();
        agent.register(desc("e2", "Echo", "prod", "rpc_server")).unwrap();
        agent.register(desc("u1", "Users", "prod", "rpc_server")).unwrap();

        let (echoes, present) = agent.lookup("Echo", &LookupFilter::default());
        assert!(present);
        assert_eq!(echoes.len(), 2);

        agent.deregister("e1").unwrap();
        let (echoes, _) = agent.lookup("Echo", &LookupFilter::default());
        assert_eq!(echoes.len(), 1);
        assert_eq!(echoes[0].id, "e2");
    }

    #[test]
    fn test_lookup_filters() {
        let agent = MemoryAgent::new();
        agent.register(desc("e1", "Echo", "prod", "rpc_server")).unwrap();
        agent.register(desc("e2", "Echo", "staging", "rpc_server")).unwrap();
        agent.register(desc("e3", "Echo", "prod", "config_provider")).unwrap();

        let (matches, present) = agent.lookup("Echo", &LookupFilter::namespace("prod"));
        assert!(present);
        assert_eq!(matches.len(), 2);

        let filter = LookupFilter {
            namespace: Some("prod".to_string()),
            service_type: Some("rpc_server".to_string()),
        };
        let (matches, _) = agent.lookup("Echo", &filter);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "e1");

        let (matches, present) = agent.lookup("Echo", &LookupFilter::namespace("dev"));
        assert!(!present);
        assert!(matches.is_empty());
    }
}
