// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The dynamic routing table.
//!
//! Static infrastructure routes (`/metrics`, `/debug/pprof`, user handlers)
//! live on the axum router; everything synthesized from service
//! registrations lands here, because these routes use the gRPC-gateway path
//! grammar and are rebuilt at runtime. A [`RouteTable`] is an immutable
//! snapshot once published into the [`MuxPool`](crate::MuxPool); the gateway
//! mutates its canonical table and swaps fresh snapshots in.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::response::Response;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderMap, Method, Uri};

use crate::error::GatewayError;

pub mod httprule;

pub use httprule::PathTemplate;

/// What a route handler receives: the request, pre-read, plus the variables
/// captured from the path.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub path_params: HashMap<String, String>,
    pub body: Bytes,
}

impl RequestParts {
    /// Decoded query pairs, repeated keys preserved.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let Some(query) = self.uri.query() else {
            return Vec::new();
        };
        serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_default()
    }
}

pub type RouteHandler = Arc<dyn Fn(RequestParts) -> BoxFuture<'static, Response> + Send + Sync>;

/// Human-readable route descriptor, used for logs and the route listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDoc {
    pub method: Method,
    pub path: String,
}

impl RouteDoc {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }
}

impl fmt::Display for RouteDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

#[derive(Clone)]
struct Route {
    method: Method,
    template: PathTemplate,
    handler: RouteHandler,
}

/// An ordered set of (verb, template) → handler bindings.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` under `(method, template)`. Binding the same pair
    /// twice is a contract violation.
    pub fn bind(
        &mut self,
        method: Method,
        template: &str,
        handler: RouteHandler,
    ) -> Result<(), GatewayError> {
        let template = PathTemplate::parse(template)?;
        if self
            .routes
            .iter()
            .any(|route| route.method == method && route.template.raw() == template.raw())
        {
            return Err(GatewayError::ContractViolation(format!(
                "route already bound: {} {}",
                method,
                template.raw()
            )));
        }

        self.routes.push(Route {
            method,
            template,
            handler,
        });
        Ok(())
    }

    /// Find the first route matching `(method, path)` in binding order.
    pub fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(RouteHandler, HashMap<String, String>, String)> {
        for route in &self.routes {
            if route.method != *method {
                continue;
            }
            if let Some(captures) = route.template.matches(path) {
                return Some((
                    route.handler.clone(),
                    captures,
                    route.template.raw().to_string(),
                ));
            }
        }
        None
    }

    pub fn docs(&self) -> Vec<RouteDoc> {
        self.routes
            .iter()
            .map(|route| RouteDoc::new(route.method.clone(), route.template.raw()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    fn handler(tag: &'static str) -> RouteHandler {
        Arc::new(move |_parts| Box::pin(async move { tag.into_response() }))
    }

    #[test]
    fn test_bind_and_lookup() {
        let mut table = RouteTable::new();
        table
            .bind(Method::GET, "/api/echo", handler("echo"))
            .unwrap();
        table
            .bind(Method::GET, "/api/users/{id}", handler("users"))
            .unwrap();

        assert!(table.lookup(&Method::GET, "/api/echo").is_some());
        assert!(table.lookup(&Method::POST, "/api/echo").is_none());

        let (_, captures, pattern) = table.lookup(&Method::GET, "/api/users/42").unwrap();
        assert_eq!(captures.get("id").map(String::as_str), Some("42"));
        assert_eq!(pattern, "/api/users/{id}");
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let mut table = RouteTable::new();
        table
            .bind(Method::GET, "/api/echo", handler("one"))
            .unwrap();
        let err = table
            .bind(Method::GET, "/api/echo", handler("two"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::ContractViolation(_)));

        // same template, different verb is fine
        table
            .bind(Method::POST, "/api/echo", handler("three"))
            .unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_docs_in_binding_order() {
        let mut table = RouteTable::new();
        table.bind(Method::GET, "/api/a", handler("a")).unwrap();
        table.bind(Method::PUT, "/api/b", handler("b")).unwrap();

        let docs: Vec<String> = table.docs().iter().map(|d| d.to_string()).collect();
        assert_eq!(docs, vec!["GET /api/a", "PUT /api/b"]);
    }
}
