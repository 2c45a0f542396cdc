// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Multi-connection multiplexer: one logical client over N replica
//! connections.
//!
//! The muxer owns the live connection set for a single logical service and
//! routes each call to one member per the configured [`Strategy`]. It
//! implements [`RpcConn`] itself, so anything written against a single
//! connection works unchanged against a replica set.
//!
//! Locking contract: selection happens under the read lock and the chosen
//! handle is cloned out before awaiting, so a concurrent `remove` during an
//! in-flight call lets that call finish against the detached connection
//! while no new call picks it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use rand::Rng;
use tonic::Status;

use crate::error::GatewayError;
use crate::rpc::{RpcConn, StreamReply, UnaryCall, UnaryReply};
use crate::ConnHandle;

/// Load-balancing strategy for call selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    RoundRobin,
    Random,
}

struct MuxEntry {
    service_id: String,
    conn: ConnHandle,
}

#[derive(Default)]
pub struct Muxer {
    strategy: Strategy,
    conns: RwLock<Vec<MuxEntry>>,
    last_idx: AtomicUsize,
}

impl Muxer {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Add a connection under `service_id`. Rejects duplicates; a repeated
    /// join for the same replica is a no-op.
    pub fn add(&self, service_id: impl Into<String>, conn: ConnHandle) -> bool {
        let service_id = service_id.into();
        let mut conns = self.conns.write().unwrap();
        if conns.iter().any(|entry| entry.service_id == service_id) {
            return false;
        }
        conns.push(MuxEntry { service_id, conn });
        true
    }

    /// Remove and return the connection registered under `service_id`.
    /// The caller owns closing it; in-flight calls on it run to completion.
    pub fn remove(&self, service_id: &str) -> Option<ConnHandle> {
        let mut conns = self.conns.write().unwrap();
        let idx = conns
            .iter()
            .position(|entry| entry.service_id == service_id)?;
        Some(conns.remove(idx).conn)
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.conns
            .read()
            .unwrap()
            .iter()
            .any(|entry| entry.service_id == service_id)
    }

    pub fn len(&self) -> usize {
        self.conns.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick one connection per the strategy. Fails with
    /// [`GatewayError::NoAvailableConnection`] when the set is empty.
    fn pick(&self) -> Result<ConnHandle, GatewayError> {
        let conns = self.conns.read().unwrap();
        if conns.is_empty() {
            return Err(GatewayError::NoAvailableConnection);
        }

        let idx = match self.strategy {
            Strategy::RoundRobin => self.last_idx.fetch_add(1, Ordering::Relaxed) % conns.len(),
            Strategy::Random => rand::thread_rng().gen_range(0..conns.len()),
        };

        Ok(conns[idx].conn.clone())
    }
}

#[async_trait]
impl RpcConn for Muxer {
    async fn invoke(&self, call: UnaryCall) -> Result<UnaryReply, Status> {
        let conn = self.pick().map_err(|err| err.to_status())?;
        conn.invoke(call).await
    }

    async fn open_stream(&self, call: UnaryCall) -> Result<StreamReply, Status> {
        let conn = self.pick().map_err(|err| err.to_status())?;
        conn.open_stream(call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::testing::echo_pool;
    use prost_reflect::DynamicMessage;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tonic::metadata::MetadataMap;

    struct CountingConn {
        id: String,
        hits: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RpcConn for CountingConn {
        async fn invoke(&self, call: UnaryCall) -> Result<UnaryReply, Status> {
            self.hits.lock().unwrap().push(self.id.clone());
            Ok(UnaryReply {
                message: DynamicMessage::new(call.output),
                metadata: MetadataMap::new(),
            })
        }

        async fn open_stream(&self, call: UnaryCall) -> Result<StreamReply, Status> {
            self.hits.lock().unwrap().push(self.id.clone());
            let message = DynamicMessage::new(call.output);
            Ok(crate::rpc::stream_reply_once(MetadataMap::new(), message))
        }
    }

    fn conn(id: &str, hits: &Arc<Mutex<Vec<String>>>) -> ConnHandle {
        Arc::new(CountingConn {
            id: id.to_string(),
            hits: hits.clone(),
        })
    }

    fn call() -> UnaryCall {
        let pool = echo_pool();
        let input = pool.get_message_by_name("echo.EchoRequest").unwrap();
        let output = pool.get_message_by_name("echo.EchoResponse").unwrap();
        UnaryCall::new(
            "/echo.Echo/Echo",
            input.clone(),
            output,
            DynamicMessage::new(input),
        )
    }

    #[test]
    fn test_add_rejects_duplicate_id() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let muxer = Muxer::default();
        assert!(muxer.add("e1", conn("e1", &hits)));
        assert!(!muxer.add("e1", conn("e1", &hits)));
        assert_eq!(muxer.len(), 1);
    }

    #[test]
    fn test_remove_returns_connection() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let muxer = Muxer::default();
        muxer.add("e1", conn("e1", &hits));

        assert!(muxer.remove("e1").is_some());
        assert!(muxer.remove("e1").is_none());
        assert!(muxer.is_empty());
    }

    #[tokio::test]
    async fn test_empty_muxer_fails_unavailable() {
        let muxer = Muxer::default();
        let err = muxer.invoke(call()).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unavailable);
        assert!(err.message().contains("no available connection"));
    }

    #[tokio::test]
    async fn test_round_robin_fairness() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let muxer = Muxer::new(Strategy::RoundRobin);
        for id in ["e1", "e2", "e3"] {
            muxer.add(id, conn(id, &hits));
        }

        for _ in 0..12 {
            muxer.invoke(call()).await.unwrap();
        }

        let mut per_conn: HashMap<String, usize> = HashMap::new();
        for id in hits.lock().unwrap().iter() {
            *per_conn.entry(id.clone()).or_default() += 1;
        }
        assert_eq!(per_conn.len(), 3);
        assert!(per_conn.values().all(|&count| count == 4));
    }

    #[tokio::test]
    async fn test_removed_connection_receives_no_new_calls() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let muxer = Muxer::new(Strategy::RoundRobin);
        muxer.add("e1", conn("e1", &hits));
        muxer.add("e2", conn("e2", &hits));

        muxer.remove("e1");
        for _ in 0..10 {
            muxer.invoke(call()).await.unwrap();
        }

        assert!(hits.lock().unwrap().iter().all(|id| id == "e2"));
    }

    #[tokio::test]
    async fn test_random_strategy_uses_live_conns_only() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let muxer = Muxer::new(Strategy::Random);
        muxer.add("e1", conn("e1", &hits));
        muxer.add("e2", conn("e2", &hits));

        for _ in 0..20 {
            muxer.invoke(call()).await.unwrap();
        }
        assert_eq!(hits.lock().unwrap().len(), 20);
    }
}
