// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Service discovery: the contract providers satisfy and the coordinator
//! that unifies them.
//!
//! A provider watches one external registry and emits [`RegistryMessage`]s
//! on its notify channel. The [`Coordinator`](coordinator::Coordinator)
//! owns every provider's stream and fans events out to subscribers in
//! registration order. Concrete registries live outside this crate; the
//! [`poll`] harness carries the provider-neutral machinery (shadow diffing,
//! lazy schema fetch) they all share.

use tokio::sync::mpsc;

use crate::descriptor::DescriptorBlob;

pub mod agent;
pub mod coordinator;
pub mod memory;
pub mod poll;
pub mod registration;

pub use agent::{Agent, LookupFilter};
pub use coordinator::Coordinator;
pub use memory::{MemoryAgent, MemoryCatalog};
pub use poll::{Catalog, CatalogEntry, PollingProvider, SchemaStore};
pub use registration::{AgentBackend, RegistrationCheck, RegistrationMeta, RegistrationRecord};

/// One record per replica, as discovery sees it.
#[derive(Debug, Clone, Default)]
pub struct ServiceDesc {
    /// Globally unique replica id.
    pub id: String,
    /// Logical name shared by every replica of the service.
    pub service: String,
    pub version: Option<String>,
    pub namespace: String,
    /// Free-form tag, e.g. `rpc_server` or `config_provider`.
    pub service_type: String,
    /// Dial string for the replica.
    pub target_uri: String,
    /// `host:port` of the replica.
    pub address: String,
    /// Affinity tag.
    pub group: String,
    /// Key into the schema side store, when the service ships a schema.
    pub file_descriptor_key: String,
    pub file_descriptor: Option<DescriptorBlob>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageMethod {
    Join,
    Leave,
}

/// Emitted once per state transition a provider observes. Duplicates are
/// tolerated; consumers are idempotent.
#[derive(Debug, Clone)]
pub struct RegistryMessage {
    pub method: MessageMethod,
    pub desc: ServiceDesc,
}

impl RegistryMessage {
    pub fn join(desc: ServiceDesc) -> Self {
        Self {
            method: MessageMethod::Join,
            desc,
        }
    }

    pub fn leave(desc: ServiceDesc) -> Self {
        Self {
            method: MessageMethod::Leave,
            desc,
        }
    }
}

/// A pluggable discovery source.
///
/// `notify` hands over the provider's event stream and is called once, when
/// the coordinator starts. A provider that fails permanently closes the
/// channel; the coordinator stops reading from it while other providers
/// continue.
pub trait Provider: Send + Sync {
    fn notify(&mut self) -> mpsc::Receiver<RegistryMessage>;
}
