// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Wire-level mirrors of the descriptor subset the gateway reads and writes.
//!
//! Protobuf extensions are wire-compatible with plain fields, so declaring
//! `google.api.http` (72295728) and the OpenAPI v2 operation (1042) as
//! ordinary members of a `MethodOptions` mirror lets us read annotations out
//! of any compiled descriptor without registering google/api protos in a
//! pool. The same mirrors encode valid `FileDescriptorSet` bytes, which is
//! how the schema-authoring facility and the test fixtures produce
//! descriptors without a protoc run.

/// `google.protobuf.FileDescriptorSet`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawFileDescriptorSet {
    #[prost(message, repeated, tag = "1")]
    pub file: Vec<RawFileDescriptorProto>,
}

/// `google.protobuf.FileDescriptorProto` (subset)
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawFileDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub package: Option<String>,
    #[prost(string, repeated, tag = "3")]
    pub dependency: Vec<String>,
    #[prost(message, repeated, tag = "4")]
    pub message_type: Vec<RawDescriptorProto>,
    #[prost(message, repeated, tag = "6")]
    pub service: Vec<RawServiceDescriptorProto>,
    #[prost(string, optional, tag = "12")]
    pub syntax: Option<String>,
}

/// `google.protobuf.DescriptorProto` (subset)
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(message, repeated, tag = "2")]
    pub field: Vec<RawFieldDescriptorProto>,
}

/// `google.protobuf.FieldDescriptorProto` (subset)
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawFieldDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(int32, optional, tag = "3")]
    pub number: Option<i32>,
    #[prost(int32, optional, tag = "4")]
    pub label: Option<i32>,
    #[prost(int32, optional, tag = "5")]
    pub r#type: Option<i32>,
    #[prost(string, optional, tag = "6")]
    pub type_name: Option<String>,
    #[prost(string, optional, tag = "10")]
    pub json_name: Option<String>,
}

/// `google.protobuf.ServiceDescriptorProto`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawServiceDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(message, repeated, tag = "2")]
    pub method: Vec<RawMethodDescriptorProto>,
}

/// `google.protobuf.MethodDescriptorProto`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawMethodDescriptorProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub input_type: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub output_type: Option<String>,
    #[prost(message, optional, tag = "4")]
    pub options: Option<RawMethodOptions>,
    #[prost(bool, optional, tag = "5")]
    pub client_streaming: Option<bool>,
    #[prost(bool, optional, tag = "6")]
    pub server_streaming: Option<bool>,
}

/// `google.protobuf.MethodOptions`, reduced to the two extensions the
/// gateway understands.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawMethodOptions {
    /// `google.api.http`
    #[prost(message, optional, tag = "72295728")]
    pub http: Option<HttpRule>,
    /// `grpc.gateway.protoc_gen_openapiv2.options.openapiv2_operation`
    #[prost(message, optional, tag = "1042")]
    pub openapi_operation: Option<OpenapiOperation>,
}

/// `google.api.HttpRule` (subset: no custom patterns, no additional
/// bindings)
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpRule {
    #[prost(string, tag = "1")]
    pub selector: String,
    #[prost(string, tag = "7")]
    pub body: String,
    #[prost(string, tag = "12")]
    pub response_body: String,
    #[prost(oneof = "http_rule::Pattern", tags = "2, 3, 4, 5, 6")]
    pub pattern: Option<http_rule::Pattern>,
}

pub mod http_rule {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Pattern {
        #[prost(string, tag = "2")]
        Get(String),
        #[prost(string, tag = "3")]
        Put(String),
        #[prost(string, tag = "4")]
        Post(String),
        #[prost(string, tag = "5")]
        Delete(String),
        #[prost(string, tag = "6")]
        Patch(String),
    }
}

/// `grpc.gateway.protoc_gen_openapiv2.options.Operation` (subset)
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OpenapiOperation {
    #[prost(string, repeated, tag = "1")]
    pub tags: Vec<String>,
    #[prost(string, tag = "2")]
    pub summary: String,
    #[prost(string, tag = "3")]
    pub description: String,
    #[prost(string, tag = "5")]
    pub operation_id: String,
}

// FieldDescriptorProto.Label
pub const LABEL_OPTIONAL: i32 = 1;
pub const LABEL_REPEATED: i32 = 3;

// FieldDescriptorProto.Type
pub const TYPE_DOUBLE: i32 = 1;
pub const TYPE_FLOAT: i32 = 2;
pub const TYPE_INT64: i32 = 3;
pub const TYPE_UINT64: i32 = 4;
pub const TYPE_INT32: i32 = 5;
pub const TYPE_BOOL: i32 = 8;
pub const TYPE_STRING: i32 = 9;
pub const TYPE_MESSAGE: i32 = 11;
pub const TYPE_BYTES: i32 = 12;
pub const TYPE_UINT32: i32 = 13;

impl HttpRule {
    /// The HTTP verb declared by the rule's pattern.
    pub fn verb(&self) -> Option<http::Method> {
        match self.pattern.as_ref()? {
            http_rule::Pattern::Get(_) => Some(http::Method::GET),
            http_rule::Pattern::Put(_) => Some(http::Method::PUT),
            http_rule::Pattern::Post(_) => Some(http::Method::POST),
            http_rule::Pattern::Delete(_) => Some(http::Method::DELETE),
            http_rule::Pattern::Patch(_) => Some(http::Method::PATCH),
        }
    }

    /// The path template declared by the rule's pattern.
    pub fn path(&self) -> Option<&str> {
        match self.pattern.as_ref()? {
            http_rule::Pattern::Get(path)
            | http_rule::Pattern::Put(path)
            | http_rule::Pattern::Post(path)
            | http_rule::Pattern::Delete(path)
            | http_rule::Pattern::Patch(path) => Some(path.as_str()),
        }
    }
}
