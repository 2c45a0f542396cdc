// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Gateway request metrics, Prometheus exposition.

use std::time::Instant;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::Result;

#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    requests: IntCounterVec,
    latency: HistogramVec,
    inflight: IntGauge,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(
                "archway_gateway_requests_total",
                "Requests dispatched through the routing table",
            ),
            &["method", "pattern", "status"],
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new(
                "archway_gateway_request_duration_seconds",
                "End-to-end latency of transcoded requests",
            ),
            &["method", "pattern"],
        )?;
        let inflight = IntGauge::new(
            "archway_gateway_inflight_requests",
            "Requests currently in flight",
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(inflight.clone()))?;

        Ok(Self {
            registry,
            requests,
            latency,
            inflight,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Track one dispatched request; the guard observes on drop.
    pub fn track(&self, method: &str, pattern: &str) -> RequestGuard {
        self.inflight.inc();
        RequestGuard {
            metrics: self.clone(),
            method: method.to_string(),
            pattern: pattern.to_string(),
            status: 0,
            started: Instant::now(),
        }
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        match encoder.encode(&self.registry.gather(), &mut buffer) {
            Ok(()) => String::from_utf8(buffer).unwrap_or_default(),
            Err(err) => {
                tracing::error!(error = %err, "failed to encode metrics");
                String::new()
            }
        }
    }
}

pub struct RequestGuard {
    metrics: GatewayMetrics,
    method: String,
    pattern: String,
    status: u16,
    started: Instant,
}

impl RequestGuard {
    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.metrics.inflight.dec();
        self.metrics
            .requests
            .with_label_values(&[&self.method, &self.pattern, &self.status.to_string()])
            .inc();
        self.metrics
            .latency
            .with_label_values(&[&self.method, &self.pattern])
            .observe(self.started.elapsed().as_secs_f64());
    }
}
