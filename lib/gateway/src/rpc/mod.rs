// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The connection seam between the gateway and its gRPC backends.
//!
//! [`RpcConn`] is the dynamic analog of a generated client: it carries a
//! unary `invoke` and a server-streaming `open_stream`, both expressed over
//! [`DynamicMessage`] so no precompiled stubs are required. The production
//! implementation wraps a lazily-connected tonic [`Channel`]; the
//! [`Muxer`](crate::Muxer) implements the same trait by delegating to one of
//! its member connections, and tests substitute in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use http::uri::PathAndQuery;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use tonic::metadata::MetadataMap;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

use crate::{ConnHandle, Result};

mod codec;
mod signal;

pub use codec::DynamicCodec;
pub use signal::{ResettableClient, SignalConn};

/// One unary exchange, fully described: wire path, message schemas, payload,
/// and outgoing metadata.
#[derive(Debug, Clone)]
pub struct UnaryCall {
    /// Full gRPC path, `"/<package.Service>/<Method>"`.
    pub path: String,
    pub input: MessageDescriptor,
    pub output: MessageDescriptor,
    pub request: DynamicMessage,
    pub metadata: MetadataMap,
}

impl UnaryCall {
    pub fn new(
        path: impl Into<String>,
        input: MessageDescriptor,
        output: MessageDescriptor,
        request: DynamicMessage,
    ) -> Self {
        Self {
            path: path.into(),
            input,
            output,
            request,
            metadata: MetadataMap::new(),
        }
    }
}

/// The reply to a unary call. `metadata` holds the response headers with the
/// trailers merged in, which is where response-modifier keys travel.
#[derive(Debug)]
pub struct UnaryReply {
    pub message: DynamicMessage,
    pub metadata: MetadataMap,
}

/// A server-streaming reply: response headers plus the message stream. The
/// stream's lifetime is bound to the connection that produced it.
pub struct StreamReply {
    pub metadata: MetadataMap,
    pub messages: futures::stream::BoxStream<'static, std::result::Result<DynamicMessage, Status>>,
}

/// A logical gRPC connection. Cancellation propagates by dropping the
/// returned future; no explicit abort channel is needed.
#[async_trait]
pub trait RpcConn: Send + Sync {
    async fn invoke(&self, call: UnaryCall) -> std::result::Result<UnaryReply, Status>;

    async fn open_stream(&self, call: UnaryCall) -> std::result::Result<StreamReply, Status>;
}

/// Mutates outgoing request metadata before dispatch; the re-expression of a
/// client interceptor stack for dynamic calls.
pub trait RequestDecorator: Send + Sync {
    fn decorate(&self, metadata: &mut MetadataMap) -> std::result::Result<(), Status>;
}

impl<F> RequestDecorator for F
where
    F: Fn(&mut MetadataMap) -> std::result::Result<(), Status> + Send + Sync,
{
    fn decorate(&self, metadata: &mut MetadataMap) -> std::result::Result<(), Status> {
        self(metadata)
    }
}

/// An [`RpcConn`] over a tonic channel. The channel connects lazily, so
/// construction is cheap and a dead target surfaces as `Unavailable` on the
/// first call rather than as a dial failure.
pub struct TonicConn {
    channel: Channel,
    decorators: Vec<Arc<dyn RequestDecorator>>,
}

impl TonicConn {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            decorators: Vec::new(),
        }
    }

    pub fn with_decorators(channel: Channel, decorators: Vec<Arc<dyn RequestDecorator>>) -> Self {
        Self {
            channel,
            decorators,
        }
    }

    fn prepare(&self, call: UnaryCall) -> std::result::Result<(tonic::Request<DynamicMessage>, PathAndQuery, DynamicCodec), Status> {
        let path = PathAndQuery::try_from(call.path.as_str())
            .map_err(|err| Status::internal(format!("bad method path {}: {err}", call.path)))?;
        let codec = DynamicCodec::new(call.input, call.output);

        let mut request = tonic::Request::new(call.request);
        *request.metadata_mut() = call.metadata;
        for decorator in &self.decorators {
            decorator.decorate(request.metadata_mut())?;
        }

        Ok((request, path, codec))
    }
}

#[async_trait]
impl RpcConn for TonicConn {
    async fn invoke(&self, call: UnaryCall) -> std::result::Result<UnaryReply, Status> {
        let (request, path, codec) = self.prepare(call)?;

        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|err| Status::unavailable(format!("connection not ready: {err}")))?;

        let response = grpc.unary(request, path, codec).await?;
        let (metadata, message, _extensions) = response.into_parts();
        Ok(UnaryReply { message, metadata })
    }

    async fn open_stream(&self, call: UnaryCall) -> std::result::Result<StreamReply, Status> {
        let (request, path, codec) = self.prepare(call)?;

        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|err| Status::unavailable(format!("connection not ready: {err}")))?;

        let response = grpc.server_streaming(request, path, codec).await?;
        let (metadata, streaming, _extensions) = response.into_parts();
        Ok(StreamReply {
            metadata,
            messages: streaming.boxed(),
        })
    }
}

/// Dials targets into connection handles. The gateway owns one; tests swap
/// in fakes so discovery scenarios run without sockets.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, target: &str) -> Result<ConnHandle>;
}

/// The production dialer: tonic endpoint, lazy connect, gateway-wide
/// request decorators applied to every outgoing call.
#[derive(Default)]
pub struct TonicDialer {
    decorators: Vec<Arc<dyn RequestDecorator>>,
}

impl TonicDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decorators(decorators: Vec<Arc<dyn RequestDecorator>>) -> Self {
        Self { decorators }
    }
}

#[async_trait]
impl Dialer for TonicDialer {
    async fn dial(&self, target: &str) -> Result<ConnHandle> {
        let uri = if target.contains("://") {
            target.to_string()
        } else {
            format!("http://{target}")
        };
        let endpoint = Endpoint::from_shared(uri)?;
        let channel = endpoint.connect_lazy();
        Ok(Arc::new(TonicConn::with_decorators(
            channel,
            self.decorators.clone(),
        )))
    }
}

/// Turn a single-message stream into a [`StreamReply`]; useful for fakes and
/// for local services exposing streaming shapes.
pub fn stream_reply_once(
    metadata: MetadataMap,
    message: DynamicMessage,
) -> StreamReply {
    StreamReply {
        metadata,
        messages: futures::stream::once(async move { Ok(message) }).boxed(),
    }
}

/// A connection that accepts every call and returns an empty reply; the
/// stand-in handle for local (in-process) services.
pub struct NopConn;

#[async_trait]
impl RpcConn for NopConn {
    async fn invoke(&self, call: UnaryCall) -> std::result::Result<UnaryReply, Status> {
        Ok(UnaryReply {
            message: DynamicMessage::new(call.output),
            metadata: MetadataMap::new(),
        })
    }

    async fn open_stream(&self, call: UnaryCall) -> std::result::Result<StreamReply, Status> {
        Ok(stream_reply_once(
            MetadataMap::new(),
            DynamicMessage::new(call.output),
        ))
    }
}

/// Insert a metadata value, dropping it silently when it is not valid ASCII.
/// Used when projecting HTTP request headers into outgoing gRPC metadata.
pub fn metadata_insert(metadata: &mut MetadataMap, key: &'static str, value: &str) {
    if let Ok(value) = value.parse() {
        metadata.insert(key, value);
    }
}

#[allow(dead_code)]
fn _assert_stream_is_send(reply: StreamReply) -> impl Stream<Item = Result<DynamicMessage, Status>> + Send {
    reply.messages
}
