// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-code authoring of descriptor sets.
//!
//! Services that live in the same process as the gateway still need a
//! schema to be routable, and the test-suite needs schemas without a protoc
//! step. This module builds valid `FileDescriptorSet` bytes from the wire
//! mirrors in [`proto`](super::proto).

use super::proto::*;

/// Builds one `FileDescriptorProto` with proto3 semantics.
#[derive(Clone)]
pub struct FileSchema {
    file: RawFileDescriptorProto,
}

impl FileSchema {
    pub fn new(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            file: RawFileDescriptorProto {
                name: Some(name.into()),
                package: Some(package.into()),
                dependency: Vec::new(),
                message_type: Vec::new(),
                service: Vec::new(),
                syntax: Some("proto3".to_string()),
            },
        }
    }

    pub fn message(mut self, name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        self.file.message_type.push(RawDescriptorProto {
            name: Some(name.into()),
            field: fields.into_iter().map(|f| f.field).collect(),
        });
        self
    }

    pub fn service(mut self, name: impl Into<String>, methods: Vec<MethodSchema>) -> Self {
        self.file.service.push(RawServiceDescriptorProto {
            name: Some(name.into()),
            method: methods.into_iter().map(|m| m.method).collect(),
        });
        self
    }

    pub fn into_file(self) -> RawFileDescriptorProto {
        self.file
    }

    /// Encode as a single-file `FileDescriptorSet`.
    pub fn encode_set(self) -> Vec<u8> {
        use prost::Message;
        RawFileDescriptorSet {
            file: vec![self.file],
        }
        .encode_to_vec()
    }
}

#[derive(Clone)]
pub struct FieldSchema {
    field: RawFieldDescriptorProto,
}

impl FieldSchema {
    fn scalar(name: &str, number: i32, kind: i32) -> Self {
        Self {
            field: RawFieldDescriptorProto {
                name: Some(name.to_string()),
                number: Some(number),
                label: Some(LABEL_OPTIONAL),
                r#type: Some(kind),
                type_name: None,
                json_name: None,
            },
        }
    }

    pub fn string(name: &str, number: i32) -> Self {
        Self::scalar(name, number, TYPE_STRING)
    }

    pub fn int32(name: &str, number: i32) -> Self {
        Self::scalar(name, number, TYPE_INT32)
    }

    pub fn int64(name: &str, number: i32) -> Self {
        Self::scalar(name, number, TYPE_INT64)
    }

    pub fn uint32(name: &str, number: i32) -> Self {
        Self::scalar(name, number, TYPE_UINT32)
    }

    pub fn uint64(name: &str, number: i32) -> Self {
        Self::scalar(name, number, TYPE_UINT64)
    }

    pub fn bool(name: &str, number: i32) -> Self {
        Self::scalar(name, number, TYPE_BOOL)
    }

    pub fn double(name: &str, number: i32) -> Self {
        Self::scalar(name, number, TYPE_DOUBLE)
    }

    pub fn float(name: &str, number: i32) -> Self {
        Self::scalar(name, number, TYPE_FLOAT)
    }

    pub fn bytes(name: &str, number: i32) -> Self {
        Self::scalar(name, number, TYPE_BYTES)
    }

    /// A message-typed field; `type_name` must be fully qualified, e.g.
    /// `.echo.EchoRequest`.
    pub fn message(name: &str, number: i32, type_name: &str) -> Self {
        let mut schema = Self::scalar(name, number, TYPE_MESSAGE);
        schema.field.type_name = Some(type_name.to_string());
        schema
    }

    pub fn repeated(mut self) -> Self {
        self.field.label = Some(LABEL_REPEATED);
        self
    }
}

#[derive(Clone)]
pub struct MethodSchema {
    method: RawMethodDescriptorProto,
}

impl MethodSchema {
    /// `input` and `output` are fully-qualified message names, e.g.
    /// `.echo.EchoRequest`.
    pub fn new(name: &str, input: &str, output: &str) -> Self {
        Self {
            method: RawMethodDescriptorProto {
                name: Some(name.to_string()),
                input_type: Some(input.to_string()),
                output_type: Some(output.to_string()),
                options: None,
                client_streaming: None,
                server_streaming: None,
            },
        }
    }

    fn rule(&mut self) -> &mut HttpRule {
        self.method
            .options
            .get_or_insert_with(RawMethodOptions::default)
            .http
            .get_or_insert_with(HttpRule::default)
    }

    pub fn http_get(mut self, path: &str) -> Self {
        self.rule().pattern = Some(http_rule::Pattern::Get(path.to_string()));
        self
    }

    pub fn http_post(mut self, path: &str, body: &str) -> Self {
        let rule = self.rule();
        rule.pattern = Some(http_rule::Pattern::Post(path.to_string()));
        rule.body = body.to_string();
        self
    }

    pub fn http_put(mut self, path: &str, body: &str) -> Self {
        let rule = self.rule();
        rule.pattern = Some(http_rule::Pattern::Put(path.to_string()));
        rule.body = body.to_string();
        self
    }

    pub fn http_patch(mut self, path: &str, body: &str) -> Self {
        let rule = self.rule();
        rule.pattern = Some(http_rule::Pattern::Patch(path.to_string()));
        rule.body = body.to_string();
        self
    }

    pub fn http_delete(mut self, path: &str) -> Self {
        self.rule().pattern = Some(http_rule::Pattern::Delete(path.to_string()));
        self
    }

    pub fn summary(mut self, summary: &str, tags: &[&str]) -> Self {
        let operation = self
            .method
            .options
            .get_or_insert_with(RawMethodOptions::default)
            .openapi_operation
            .get_or_insert_with(OpenapiOperation::default);
        operation.summary = summary.to_string();
        operation.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn server_streaming(mut self) -> Self {
        self.method.server_streaming = Some(true);
        self
    }
}
