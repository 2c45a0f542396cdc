// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! HTTP handler chain assembly: infrastructure routes, user routes, and the
//! fallback that dispatches API-prefixed paths through the route-table pool.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::FutureExt;
use pprof::protos::Message;

use crate::modifier::json_error;
use crate::routing::RequestParts;
use crate::runqueue::panic_message;

use super::GatewayInner;

/// Requests with bodies beyond this many bytes are rejected up front.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

pub(crate) fn build_router(inner: Arc<GatewayInner>) -> Router {
    let debug = inner.debug_path.trim_end_matches('/').to_string();

    let core: Router = Router::new()
        .route(&inner.metrics_path, get(metrics_handler))
        .route(&format!("{debug}/"), get(pprof_index_handler))
        .route(&format!("{debug}/cmdline"), get(pprof_cmdline_handler))
        .route(&format!("{debug}/profile"), get(pprof_profile_handler))
        .route(&format!("{debug}/flamegraph"), get(pprof_flamegraph_handler))
        .fallback(dispatch)
        .with_state(inner.clone());

    let mut router = core;
    for (path, handler) in inner.user_routes.lock().unwrap().iter() {
        router = router.route(path, handler.clone());
    }
    router
}

/// Fallback for everything the static router does not know: API-prefixed
/// paths go through the routing table, the rest to the not-found handler.
async fn dispatch(State(inner): State<Arc<GatewayInner>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    if !is_api_path(&inner.config.api_prefix, &path) {
        return not_found(&inner, parts, body).await;
    }

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(err) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                tonic::Code::InvalidArgument as i32,
                &format!("failed to read request body: {err}"),
            );
        }
    };

    let table = inner.pool.get();
    let Some((handler, captures, pattern)) = table.lookup(&parts.method, &path) else {
        return not_found(&inner, parts, Body::from(body)).await;
    };

    let mut guard = inner.metrics.track(parts.method.as_str(), &pattern);
    let invocation = handler(RequestParts {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        path_params: captures,
        body,
    });

    // a panicking handler costs its request, never the process
    let response = match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            tracing::error!(pattern = %pattern, panic = %panic_message(&panic), "handler panicked");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                tonic::Code::Internal as i32,
                "internal error",
            )
        }
    };
    guard.set_status(response.status().as_u16());
    response
}

fn is_api_path(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

async fn not_found(
    inner: &Arc<GatewayInner>,
    parts: axum::http::request::Parts,
    body: Body,
) -> Response {
    if let Some(handler) = &inner.not_found {
        let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .unwrap_or_default();
        return handler(RequestParts {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            path_params: HashMap::new(),
            body,
        })
        .await;
    }

    json_error(
        StatusCode::NOT_FOUND,
        tonic::Code::NotFound as i32,
        "not found",
    )
}

async fn metrics_handler(State(inner): State<Arc<GatewayInner>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        inner.metrics.render(),
    )
}

async fn pprof_index_handler(State(inner): State<Arc<GatewayInner>>) -> impl IntoResponse {
    let debug = inner.debug_path.trim_end_matches('/');
    let body = format!(
        "<html><head><title>{debug}/</title></head><body>\n\
         <p>Profiles:</p>\n\
         <ul>\n\
         <li><a href=\"{debug}/profile?seconds=10\">profile</a></li>\n\
         <li><a href=\"{debug}/flamegraph?seconds=10\">flamegraph</a></li>\n\
         <li><a href=\"{debug}/cmdline\">cmdline</a></li>\n\
         </ul></body></html>"
    );
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body,
    )
}

async fn pprof_cmdline_handler() -> impl IntoResponse {
    let cmdline = std::env::args().collect::<Vec<_>>().join("\u{0}");
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        cmdline,
    )
}

fn profile_seconds(params: &HashMap<String, String>) -> u64 {
    params
        .get("seconds")
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(10)
        .clamp(1, 120)
}

async fn pprof_profile_handler(Query(params): Query<HashMap<String, String>>) -> Response {
    let seconds = profile_seconds(&params);
    let report = match collect_profile(seconds).await {
        Ok(report) => report,
        Err(err) => return profiler_error(err),
    };

    match report.pprof() {
        Ok(profile) => {
            let body = profile.encode_to_vec();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/octet-stream")],
                body,
            )
                .into_response()
        }
        Err(err) => profiler_error(err.to_string()),
    }
}

async fn pprof_flamegraph_handler(Query(params): Query<HashMap<String, String>>) -> Response {
    let seconds = profile_seconds(&params);
    let report = match collect_profile(seconds).await {
        Ok(report) => report,
        Err(err) => return profiler_error(err),
    };

    let mut svg = Vec::new();
    match report.flamegraph(&mut svg) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "image/svg+xml")],
            svg,
        )
            .into_response(),
        Err(err) => profiler_error(err.to_string()),
    }
}

async fn collect_profile(seconds: u64) -> Result<pprof::Report, String> {
    let guard = pprof::ProfilerGuardBuilder::default()
        .frequency(99)
        .blocklist(&["libc", "libgcc", "pthread", "vdso"])
        .build()
        .map_err(|err| err.to_string())?;

    tokio::time::sleep(std::time::Duration::from_secs(seconds)).await;

    guard.report().build().map_err(|err| err.to_string())
}

fn profiler_error(message: String) -> Response {
    tracing::warn!(error = %message, "profiling failed");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        tonic::Code::Internal as i32,
        &message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_api_path() {
        assert!(is_api_path("/api", "/api"));
        assert!(is_api_path("/api", "/api/echo"));
        assert!(!is_api_path("/api", "/apiary"));
        assert!(!is_api_path("/api", "/metrics"));
        assert!(is_api_path("/", "/anything"));
    }

    #[test]
    fn test_profile_seconds_bounds() {
        let mut params = HashMap::new();
        assert_eq!(profile_seconds(&params), 10);

        params.insert("seconds".to_string(), "0".to_string());
        assert_eq!(profile_seconds(&params), 1);

        params.insert("seconds".to_string(), "600".to_string());
        assert_eq!(profile_seconds(&params), 120);

        params.insert("seconds".to_string(), "30".to_string());
        assert_eq!(profile_seconds(&params), 30);
    }
}
