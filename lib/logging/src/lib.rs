// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Logging bootstrap shared by every archway process.
//!
//! Everything is keyed off environment variables so binaries and tests get
//! the same output without any wiring:
//!
//! - `ARCHWAY_LOG`: `EnvFilter` directive, defaults to `info`
//! - `ARCHWAY_LOGGING_JSONL`: emit one JSON object per line
//! - `ARCHWAY_DISABLE_ANSI_LOGGING`: strip colors

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const FILTER_ENV: &str = "ARCHWAY_LOG";
const JSONL_ENV: &str = "ARCHWAY_LOGGING_JSONL";
const NO_ANSI_ENV: &str = "ARCHWAY_DISABLE_ANSI_LOGGING";

/// Install the global tracing subscriber.
///
/// Safe to call more than once; subsequent calls are no-ops (the first
/// subscriber wins). Intended to be the first line of `main`.
pub fn init() {
    if env_flag(JSONL_ENV) {
        let layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_target(true)
            .with_ansi(false);
        let _ = tracing_subscriber::registry()
            .with(filter())
            .with(layer)
            .try_init();
    } else {
        let layer = fmt::layer()
            .with_target(true)
            .with_ansi(!env_flag(NO_ANSI_ENV));
        let _ = tracing_subscriber::registry()
            .with(filter())
            .with(layer)
            .try_init();
    }
}

fn filter() -> EnvFilter {
    match std::env::var(FILTER_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info")),
        Err(_) => EnvFilter::new("info"),
    }
}

/// A flag variable counts as set when its value reads as affirmative, in
/// any casing. Unset or unparseable means off.
fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| affirmative(&value))
        .unwrap_or(false)
}

fn affirmative(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
