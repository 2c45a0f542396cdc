// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Synthesizes HTTP handlers from a file descriptor.
//!
//! For each annotated method, one handler closure is built that:
//! decodes the body per the method's body rule, binds path captures and
//! query parameters onto a fresh dynamic request message, annotates the
//! outgoing metadata with HTTP context, invokes through the service's
//! muxer, and writes the reply through the response-modifier chain.
//!
//! One handler shape serves every verb; the differences are entirely data
//! (`BodyRule` and the query-binding eligibility).

use std::collections::HashMap;
use std::sync::Arc;

use axum::response::Response;
use futures::future::BoxFuture;
use http::header;
use prost_reflect::{DynamicMessage, FieldDescriptor, Kind, MessageDescriptor, ReflectMessage, Value};
use tonic::metadata::MetadataMap;
use tonic::Status;

use crate::error::GatewayError;
use crate::modifier;
use crate::muxer::Muxer;
use crate::routing::{PathTemplate, RequestParts, RouteDoc, RouteHandler, RouteTable};
use crate::rpc::{metadata_insert, RpcConn, UnaryCall};
use crate::Result;

use super::{BodyRule, DescriptorBlob};

/// Bind every annotated method of `blob` into `table`, dispatching through
/// `muxer`. Returns the docs of the routes that were bound.
pub fn bind_descriptor_routes(
    table: &mut RouteTable,
    blob: &DescriptorBlob,
    muxer: Arc<Muxer>,
) -> Result<Vec<RouteDoc>, GatewayError> {
    let bindings = blob
        .bindings()
        .map_err(|err| GatewayError::ContractViolation(err.to_string()))?;

    let mut docs = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let (input, output) = blob.method_messages(&binding)?;

        // parse here so a bad annotation fails at registration time
        let template = PathTemplate::parse(&binding.template)?;
        let spec = Arc::new(HandlerSpec {
            rpc_path: binding.rpc_path(),
            template: binding.template.clone(),
            path_fields: template.fields().to_vec(),
            body: binding.body.clone(),
            input,
            output,
            muxer: muxer.clone(),
        });

        let handler: RouteHandler = Arc::new(move |parts| handle(spec.clone(), parts));
        table.bind(binding.verb.clone(), &binding.template, handler)?;

        tracing::debug!(
            method = %binding.verb,
            pattern = %binding.template,
            rpc = %binding.rpc_path(),
            summary = binding.summary.as_deref().unwrap_or(""),
            "bound http handler"
        );
        docs.push(RouteDoc::new(binding.verb.clone(), &binding.template));
    }

    Ok(docs)
}

#[derive(Clone)]
struct HandlerSpec {
    rpc_path: String,
    template: String,
    path_fields: Vec<String>,
    body: BodyRule,
    input: MessageDescriptor,
    output: MessageDescriptor,
    muxer: Arc<Muxer>,
}

fn handle(spec: Arc<HandlerSpec>, parts: RequestParts) -> BoxFuture<'static, Response> {
    Box::pin(async move {
        match transcode_and_invoke(&spec, parts).await {
            Ok(reply) => modifier::write_reply(&reply),
            Err(status) => {
                tracing::warn!(
                    rpc = %spec.rpc_path,
                    code = ?status.code(),
                    message = status.message(),
                    "rpc failed"
                );
                modifier::write_status(&status)
            }
        }
    })
}

async fn transcode_and_invoke(
    spec: &HandlerSpec,
    parts: RequestParts,
) -> Result<crate::rpc::UnaryReply, Status> {
    let mut request = DynamicMessage::new(spec.input.clone());

    match &spec.body {
        BodyRule::None => {}
        BodyRule::All => {
            if !parts.body.is_empty() {
                request = decode_json(&spec.input, &parts.body)?;
            }
        }
        BodyRule::Field(field_path) => {
            if !parts.body.is_empty() {
                let field_desc = resolve_field_path(&spec.input, field_path)?;
                let Kind::Message(sub_desc) = field_desc.leaf.kind() else {
                    return Err(Status::internal(format!(
                        "body selector {field_path} is not a message field"
                    )));
                };
                let sub = decode_json(&sub_desc, &parts.body)?;
                set_value_at_path(&mut request, &field_desc.path, Value::Message(sub))?;
            }
        }
    }

    // path captures override anything the body set
    for field_path in &spec.path_fields {
        let raw = parts.path_params.get(field_path).ok_or_else(|| {
            Status::invalid_argument(format!("missing parameter {field_path}"))
        })?;
        bind_scalar(&mut request, field_path, raw)?;
    }

    // query parameters fill the remaining fields when no body binds
    if spec.body == BodyRule::None {
        for (key, value) in parts.query_pairs() {
            if spec.path_fields.iter().any(|f| f == &key) {
                continue;
            }
            bind_query_param(&mut request, &key, &value)?;
        }
    }

    let mut metadata = MetadataMap::new();
    annotate_metadata(&mut metadata, &spec.template, &parts);

    let call = UnaryCall {
        path: spec.rpc_path.clone(),
        input: spec.input.clone(),
        output: spec.output.clone(),
        request,
        metadata,
    };
    spec.muxer.invoke(call).await
}

fn decode_json(desc: &MessageDescriptor, body: &[u8]) -> Result<DynamicMessage, Status> {
    let mut deserializer = serde_json::Deserializer::from_slice(body);
    let message = DynamicMessage::deserialize(desc.clone(), &mut deserializer)
        .map_err(|err| Status::invalid_argument(format!("invalid request body: {err}")))?;
    deserializer
        .end()
        .map_err(|err| Status::invalid_argument(format!("invalid request body: {err}")))?;
    Ok(message)
}

/// HTTP context forwarded to the backend, grpc-gateway conventions.
fn annotate_metadata(metadata: &mut MetadataMap, template: &str, parts: &RequestParts) {
    metadata_insert(metadata, "x-http-path-pattern", template);

    if let Some(agent) = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
    {
        metadata_insert(metadata, "grpcgateway-user-agent", agent);
    }

    if let Some(forwarded) = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        metadata_insert(metadata, "x-forwarded-for", forwarded);
    }

    if let Some(host) = parts.headers.get(header::HOST).and_then(|v| v.to_str().ok()) {
        metadata_insert(metadata, "x-forwarded-host", host);
    }
}

struct ResolvedField {
    /// Descriptors from the root to the leaf, one per path component.
    path: Vec<FieldDescriptor>,
    leaf: FieldDescriptor,
}

fn resolve_field_path(
    root: &MessageDescriptor,
    field_path: &str,
) -> Result<ResolvedField, Status> {
    let mut desc = root.clone();
    let mut path = Vec::new();

    let mut components = field_path.split('.').peekable();
    while let Some(name) = components.next() {
        let field = desc.get_field_by_name(name).ok_or_else(|| {
            Status::invalid_argument(format!("missing field {field_path}"))
        })?;

        path.push(field.clone());
        if components.peek().is_some() {
            match field.kind() {
                Kind::Message(sub) => desc = sub,
                _ => {
                    return Err(Status::invalid_argument(format!(
                        "field {name} in {field_path} is not a message"
                    )))
                }
            }
        }
    }

    let leaf = path
        .last()
        .cloned()
        .ok_or_else(|| Status::invalid_argument("empty field path"))?;
    Ok(ResolvedField { path, leaf })
}

/// Write `value` at a resolved path, materializing intermediate messages.
fn set_value_at_path(
    message: &mut DynamicMessage,
    path: &[FieldDescriptor],
    value: Value,
) -> Result<(), Status> {
    let (first, rest) = path
        .split_first()
        .ok_or_else(|| Status::internal("empty field path"))?;

    if rest.is_empty() {
        message.set_field(first, value);
        return Ok(());
    }

    let Kind::Message(sub_desc) = first.kind() else {
        return Err(Status::invalid_argument(format!(
            "field {} is not a message",
            first.name()
        )));
    };

    let mut sub = match message.get_field(first).as_ref() {
        Value::Message(existing) => existing.clone(),
        _ => DynamicMessage::new(sub_desc),
    };
    set_value_at_path(&mut sub, rest, value)?;
    message.set_field(first, Value::Message(sub));
    Ok(())
}

/// Bind a path capture: coerce `raw` to the leaf field's scalar kind.
fn bind_scalar(message: &mut DynamicMessage, field_path: &str, raw: &str) -> Result<(), Status> {
    let resolved = resolve_field_path(&message.descriptor(), field_path)?;
    let value = coerce_scalar(&resolved.leaf.kind(), raw).map_err(|_| {
        Status::invalid_argument(format!("invalid parameter {field_path}"))
    })?;
    set_value_at_path(message, &resolved.path, value)
}

/// Bind one query parameter. Unknown keys are ignored; a known key with an
/// unparseable value is an error. Repeated fields accumulate.
fn bind_query_param(message: &mut DynamicMessage, key: &str, raw: &str) -> Result<(), Status> {
    let desc = message.descriptor();
    let field = desc
        .get_field_by_name(key)
        .or_else(|| desc.fields().find(|f| f.json_name() == key));
    let Some(field) = field else {
        return Ok(());
    };

    let value = coerce_scalar(&field.kind(), raw)
        .map_err(|_| Status::invalid_argument(format!("invalid parameter {key}")))?;

    if field.is_list() {
        let mut list = match message.get_field(&field).as_ref() {
            Value::List(items) => items.clone(),
            _ => Vec::new(),
        };
        list.push(value);
        message.set_field(&field, Value::List(list));
    } else {
        message.set_field(&field, value);
    }
    Ok(())
}

/// Coerce a textual value to a protobuf scalar, standard textual forms only.
fn coerce_scalar(kind: &Kind, raw: &str) -> Result<Value, ()> {
    match kind {
        Kind::String => Ok(Value::String(raw.to_string())),
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            raw.parse::<i32>().map(Value::I32).map_err(|_| ())
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            raw.parse::<i64>().map(Value::I64).map_err(|_| ())
        }
        Kind::Uint32 | Kind::Fixed32 => raw.parse::<u32>().map(Value::U32).map_err(|_| ()),
        Kind::Uint64 | Kind::Fixed64 => raw.parse::<u64>().map(Value::U64).map_err(|_| ()),
        Kind::Float => raw.parse::<f32>().map(Value::F32).map_err(|_| ()),
        Kind::Double => raw.parse::<f64>().map(Value::F64).map_err(|_| ()),
        Kind::Bool => match raw {
            "true" | "TRUE" | "True" | "1" => Ok(Value::Bool(true)),
            "false" | "FALSE" | "False" | "0" => Ok(Value::Bool(false)),
            _ => Err(()),
        },
        Kind::Enum(desc) => {
            if let Some(value) = desc.get_value_by_name(raw) {
                Ok(Value::EnumNumber(value.number()))
            } else {
                raw.parse::<i32>().map(Value::EnumNumber).map_err(|_| ())
            }
        }
        _ => Err(()),
    }
}
