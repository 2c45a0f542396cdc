// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The imperative side of discovery: register this process, look peers up.

use crate::Result;

use super::ServiceDesc;

/// Narrow a lookup to a namespace and/or service type. The empty filter
/// matches everything.
#[derive(Debug, Clone, Default)]
pub struct LookupFilter {
    pub namespace: Option<String>,
    pub service_type: Option<String>,
}

impl LookupFilter {
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    pub fn service_type(service_type: impl Into<String>) -> Self {
        Self {
            service_type: Some(service_type.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, desc: &ServiceDesc) -> bool {
        if let Some(namespace) = &self.namespace {
            if &desc.namespace != namespace {
                return false;
            }
        }
        if let Some(service_type) = &self.service_type {
            if &desc.service_type != service_type {
                return false;
            }
        }
        true
    }
}

/// An authoritative view of registered services. The in-process
/// [`MemoryAgent`](super::MemoryAgent) is the default; agents backed by an
/// external store additionally run a TTL-refresh loop (see
/// [`registration`](super::registration)).
pub trait Agent: Send + Sync {
    fn register(&self, desc: ServiceDesc) -> Result<()>;

    fn deregister(&self, service_id: &str) -> Result<()>;

    /// All replicas of `service_name` passing `filter`, and whether any
    /// matched.
    fn lookup(&self, service_name: &str, filter: &LookupFilter) -> (Vec<ServiceDesc>, bool);
}
