// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Process-level configuration, sourced from the environment.

use std::time::Duration;

/// Tunables for a gateway process. Everything has a default; `from_env`
/// overlays `ARCHWAY_*` environment variables on top.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen host for the HTTP server.
    pub http_host: String,
    /// Listen port for the HTTP server.
    pub http_port: u16,
    /// Prefix under which synthesized RPC routes are served.
    pub api_prefix: String,
    /// Capacity of the discovery coordinator's central channel.
    pub discovery_channel_capacity: usize,
    /// Interval between overflow-queue drains in the coordinator.
    pub overflow_drain_interval: Duration,
    /// Interval between provider catalog polls.
    pub poll_interval: Duration,
    /// Interval between TTL renewals for registered services.
    pub ttl_refresh_interval: Duration,
    /// Number of route-table slots in the mux pool.
    pub mux_pool_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            api_prefix: "/api".to_string(),
            discovery_channel_capacity: 100,
            overflow_drain_interval: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            ttl_refresh_interval: Duration::from_secs(15),
            mux_pool_size: 2,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("ARCHWAY_HTTP_HOST") {
            config.http_host = host;
        }
        if let Some(port) = env_parse::<u16>("ARCHWAY_HTTP_PORT") {
            config.http_port = port;
        }
        if let Ok(prefix) = std::env::var("ARCHWAY_API_PREFIX") {
            config.api_prefix = normalize_prefix(&prefix);
        }
        if let Some(cap) = env_parse::<usize>("ARCHWAY_DISCOVERY_CHANNEL_CAPACITY") {
            config.discovery_channel_capacity = cap.max(1);
        }
        if let Some(secs) = env_parse::<u64>("ARCHWAY_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(size) = env_parse::<usize>("ARCHWAY_MUX_POOL_SIZE") {
            config.mux_pool_size = size.max(2);
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(env: &str) -> Option<T> {
    std::env::var(env).ok().and_then(|v| v.parse::<T>().ok())
}

/// Prefixes always start with `/` and never end with one.
pub(crate) fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.discovery_channel_capacity, 100);
        assert_eq!(config.overflow_drain_interval, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.ttl_refresh_interval, Duration::from_secs(15));
        assert!(config.mux_pool_size >= 2);
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/api"), "/api");
        assert_eq!(normalize_prefix("api"), "/api");
        assert_eq!(normalize_prefix("/api/"), "/api");
        assert_eq!(normalize_prefix("/"), "/");
        assert_eq!(normalize_prefix(""), "/");
    }
}
