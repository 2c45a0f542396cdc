// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Runtime protobuf schemas and the bindings derived from them.
//!
//! A [`DescriptorBlob`] is the unit discovery providers ship around: the
//! deterministic encoding of a `FileDescriptorSet` plus its decoded
//! [`DescriptorPool`]. HTTP bindings are read out of method options by
//! wire-mirror decode (see [`proto`]), so descriptors compiled with
//! `google.api.http` annotations work without those protos being present in
//! any pool.

use bytes::Bytes;
use http::Method;
use prost::Message;
use prost_reflect::DescriptorPool;

use crate::error::GatewayError;
use crate::{ErrorContext, Result};

pub mod builder;
pub mod proto;
pub mod schema;
pub mod testing;

pub use builder::bind_descriptor_routes;
pub use schema::{FieldSchema, FileSchema, MethodSchema};

/// How the request body participates in binding, per the method's http rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyRule {
    /// No body; query parameters bind instead.
    None,
    /// The entire body decodes into the request message (`body: "*"`).
    All,
    /// The body decodes into one request field (`body: "<field>"`).
    Field(String),
}

/// One HTTP binding derived from a method's options. Immutable once built.
#[derive(Debug, Clone)]
pub struct MethodBinding {
    /// Fully-qualified service name, e.g. `echo.Echo`.
    pub service: String,
    pub method: String,
    pub verb: Method,
    pub template: String,
    pub body: BodyRule,
    pub summary: Option<String>,
    pub tags: Vec<String>,
}

impl MethodBinding {
    /// The full gRPC method path, `"/<service>/<method>"`.
    pub fn rpc_path(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }
}

/// A parsed protobuf schema, carried alongside its canonical encoding.
#[derive(Clone)]
pub struct DescriptorBlob {
    bytes: Bytes,
    pool: DescriptorPool,
}

impl std::fmt::Debug for DescriptorBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorBlob")
            .field("services", &self.service_names())
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl DescriptorBlob {
    /// Decode a serialized `FileDescriptorSet`. The set must be
    /// self-contained (imports included).
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        let pool = DescriptorPool::decode(bytes.clone())
            .context("failed to decode file descriptor set")?;
        Ok(Self { bytes, pool })
    }

    /// Build a blob from an authored [`FileSchema`].
    pub fn from_schema(schema: FileSchema) -> Result<Self> {
        Self::from_bytes(schema.encode_set())
    }

    /// The canonical encoding. Prost encodes fields in tag order, so equal
    /// schemas produce equal bytes and side stores can be keyed on content.
    pub fn to_bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Names of the files in the set, e.g. `echo.proto`.
    pub fn file_names(&self) -> Vec<String> {
        self.pool
            .files()
            .map(|file| file.name().to_string())
            .collect()
    }

    /// Fully-qualified names of every service in the blob.
    pub fn service_names(&self) -> Vec<String> {
        self.pool
            .services()
            .map(|service| service.full_name().to_string())
            .collect()
    }

    /// Derive the HTTP bindings for every annotated method. Methods without
    /// an http rule are absent; they stay unreachable over HTTP.
    pub fn bindings(&self) -> Result<Vec<MethodBinding>> {
        let set = proto::RawFileDescriptorSet::decode(self.bytes.clone())
            .context("failed to re-read descriptor set")?;

        let mut bindings = Vec::new();
        for file in &set.file {
            let package = file.package.as_deref().unwrap_or_default();
            for service in &file.service {
                let service_name = service.name.as_deref().unwrap_or_default();
                let full_service = if package.is_empty() {
                    service_name.to_string()
                } else {
                    format!("{package}.{service_name}")
                };

                for method in &service.method {
                    let Some(rule) = method.options.as_ref().and_then(|o| o.http.as_ref()) else {
                        continue;
                    };
                    let (Some(verb), Some(template)) = (rule.verb(), rule.path()) else {
                        continue;
                    };

                    let body = if verb == Method::GET || verb == Method::DELETE {
                        BodyRule::None
                    } else {
                        match rule.body.as_str() {
                            "" => BodyRule::None,
                            "*" => BodyRule::All,
                            field => BodyRule::Field(field.to_string()),
                        }
                    };

                    let operation = method
                        .options
                        .as_ref()
                        .and_then(|o| o.openapi_operation.as_ref());

                    bindings.push(MethodBinding {
                        service: full_service.clone(),
                        method: method.name.clone().unwrap_or_default(),
                        verb,
                        template: template.to_string(),
                        body,
                        summary: operation
                            .map(|op| op.summary.clone())
                            .filter(|s| !s.is_empty()),
                        tags: operation.map(|op| op.tags.clone()).unwrap_or_default(),
                    });
                }
            }
        }

        Ok(bindings)
    }

    /// Look up a method's message descriptors by binding.
    pub fn method_messages(
        &self,
        binding: &MethodBinding,
    ) -> Result<
        (
            prost_reflect::MessageDescriptor,
            prost_reflect::MessageDescriptor,
        ),
        GatewayError,
    > {
        let service = self
            .pool
            .services()
            .find(|service| service.full_name() == binding.service)
            .ok_or_else(|| GatewayError::ServiceNotFound(binding.service.clone()))?;
        let method = service
            .methods()
            .find(|method| method.name() == binding.method)
            .ok_or_else(|| {
                GatewayError::ContractViolation(format!(
                    "method {} not found on {}",
                    binding.method, binding.service
                ))
            })?;
        Ok((method.input(), method.output()))
    }
}
