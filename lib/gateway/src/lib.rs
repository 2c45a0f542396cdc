// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Archway gateway
//!
//! A long-running HTTP/JSON front door for a fleet of gRPC backends. The
//! gateway subscribes to a [discovery](crate::discovery) substrate, dials
//! replicas as they join, keeps one logical [`Muxer`] per service, and
//! transcodes HTTP requests into dynamic gRPC calls, including services
//! whose only build artifact is a protobuf file descriptor received at
//! discovery time.
//!
//! The unit of routing is a [`service::Service`]: a named entity that binds
//! HTTP patterns into the gateway's [`routing::RouteTable`]. Route tables are
//! held in a double-buffered [`MuxPool`] so the table can be rebuilt while
//! requests are in flight.

use std::sync::Arc;

pub use anyhow::{
    anyhow as error, bail as raise, Context as ErrorContext, Error, Result,
};

pub use tokio_util::sync::CancellationToken;

pub mod config;
pub mod configstore;
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod modifier;
pub mod muxer;
pub mod muxpool;
pub mod registry;
pub mod routing;
pub mod rpc;
pub mod runqueue;
pub mod service;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::{Gateway, GatewayOptions};
pub use muxer::{Muxer, Strategy};
pub use muxpool::MuxPool;
pub use rpc::{Dialer, RpcConn, TonicDialer, UnaryCall, UnaryReply};

/// Boxed connection handle, the unit the [`Muxer`] load-balances over.
pub type ConnHandle = Arc<dyn RpcConn>;
