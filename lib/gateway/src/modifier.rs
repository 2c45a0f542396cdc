// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Response modifiers.
//!
//! Backends steer how the gateway writes the HTTP response by setting
//! metadata keys on the RPC trailer. tonic merges trailers into the unary
//! response metadata, which is where these keys are read from:
//!
//! - `x-response-type`: selects an alternate body writer
//! - `x-response-content`: literal content to emit with it
//! - `x-text-extract-key`: emit one JSON field of the response as text
//!
//! The setter helpers are for in-process service implementations built on
//! tonic; remote backends set ordinary trailer metadata.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tonic::metadata::MetadataMap;
use tonic::Status;

use crate::configstore::lookup_path;
use crate::error::status_to_http;
use crate::rpc::UnaryReply;

pub const KEY_RESPONSE_TYPE: &str = "x-response-type";
pub const KEY_RESPONSE_CONTENT: &str = "x-response-content";
pub const KEY_TEXT_EXTRACT_KEY: &str = "x-text-extract-key";

/// Write a successful reply, honoring any modifier keys present in the
/// merged response metadata. The default writer is protojson.
pub fn write_reply(reply: &UnaryReply) -> Response {
    if let Some(key) = metadata_str(&reply.metadata, KEY_TEXT_EXTRACT_KEY) {
        return write_extracted_text(reply, &key);
    }

    if let Some(kind) = metadata_str(&reply.metadata, KEY_RESPONSE_TYPE) {
        let content =
            metadata_str(&reply.metadata, KEY_RESPONSE_CONTENT).unwrap_or_default();
        let content_type = match kind.as_str() {
            "text" | "plain" => "text/plain; charset=utf-8",
            "html" => "text/html; charset=utf-8",
            "json" => "application/json",
            other => return typed_response(other, content),
        };
        return typed_response(content_type, content);
    }

    match serde_json::to_vec(&reply.message) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to marshal response message");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                tonic::Code::Internal as i32,
                "failed to marshal response",
            )
        }
    }
}

/// Write a failed RPC as its HTTP projection.
pub fn write_status(status: &Status) -> Response {
    json_error(
        status_to_http(status.code()),
        status.code() as i32,
        status.message(),
    )
}

pub(crate) fn json_error(http: StatusCode, code: i32, message: &str) -> Response {
    let body = serde_json::json!({
        "code": code,
        "message": message,
    });
    (
        http,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn typed_response(content_type: &str, content: String) -> Response {
    match content_type.parse::<axum::http::HeaderValue>() {
        Ok(value) => {
            let mut response = Response::new(Body::from(content));
            response.headers_mut().insert(header::CONTENT_TYPE, value);
            response
        }
        Err(_) => (StatusCode::OK, content).into_response(),
    }
}

fn write_extracted_text(reply: &UnaryReply, key: &str) -> Response {
    let value = match serde_json::to_value(&reply.message) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "failed to marshal response message");
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                tonic::Code::Internal as i32,
                "failed to marshal response",
            );
        }
    };

    let extracted = lookup_path(&value, key);
    let text = match extracted {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text,
    )
        .into_response()
}

fn metadata_str(metadata: &MetadataMap, key: &str) -> Option<String> {
    metadata
        .get(key)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

/// Declare an alternate response type from an in-process tonic service.
pub fn set_response_type(metadata: &mut MetadataMap, kind: &str) {
    crate::rpc::metadata_insert(metadata, KEY_RESPONSE_TYPE, kind);
}

/// Declare literal response content, optionally with a type.
pub fn set_response_content(metadata: &mut MetadataMap, content: &str, kind: Option<&str>) {
    if let Some(kind) = kind {
        set_response_type(metadata, kind);
    }
    crate::rpc::metadata_insert(metadata, KEY_RESPONSE_CONTENT, content);
}

/// Ask the gateway to emit one field of the JSON response as plain text.
pub fn set_text_extract_key(metadata: &mut MetadataMap, key: &str) {
    crate::rpc::metadata_insert(metadata, KEY_TEXT_EXTRACT_KEY, key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::testing::echo_pool;
    use prost_reflect::{DynamicMessage, Value};

    fn echo_reply(message: &str) -> UnaryReply {
        let pool = echo_pool();
        let desc = pool.get_message_by_name("echo.EchoResponse").unwrap();
        let mut msg = DynamicMessage::new(desc.clone());
        let field = desc.get_field_by_name("message").unwrap();
        msg.set_field(&field, Value::String(message.to_string()));
        UnaryReply {
            message: msg,
            metadata: MetadataMap::new(),
        }
    }

    fn body_of(response: Response) -> String {
        let body = response.into_body();
        let bytes = futures::executor::block_on(axum::body::to_bytes(body, usize::MAX)).unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_default_writer_is_json() {
        let reply = echo_reply("you said hi");
        let response = write_reply(&reply);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_of(response), r#"{"message":"you said hi"}"#);
    }

    #[test]
    fn test_text_extraction() {
        let mut reply = echo_reply("just this");
        set_text_extract_key(&mut reply.metadata, "message");

        let response = write_reply(&reply);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_of(response), "just this");
    }

    #[test]
    fn test_literal_content_override() {
        let mut reply = echo_reply("ignored");
        set_response_content(&mut reply.metadata, "<h1>hello</h1>", Some("html"));

        let response = write_reply(&reply);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );
        assert_eq!(body_of(response), "<h1>hello</h1>");
    }

    #[test]
    fn test_status_projection() {
        let response = write_status(&Status::not_found("no such user"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_of(response);
        assert!(body.contains("no such user"));
        assert!(body.contains("\"code\":5"));
    }
}
