// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error-observing connection wrapper and the resettable client built on it.
//!
//! [`SignalConn`] forwards calls and bumps a watch channel on every
//! transport failure. [`ResettableClient`] caches a materialized client per
//! connection and rebuilds it after a failure signal, so a stale client
//! never outlives the error that invalidated it.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use tonic::Status;

use crate::{ConnHandle, Result};

use super::{RpcConn, StreamReply, UnaryCall, UnaryReply};

/// Wraps a connection and signals observed transport errors.
pub struct SignalConn {
    inner: ConnHandle,
    errors: watch::Sender<u64>,
}

impl SignalConn {
    pub fn wrap(inner: ConnHandle) -> Arc<Self> {
        let (errors, _) = watch::channel(0);
        Arc::new(Self { inner, errors })
    }

    /// Subscribe to the error counter. The value increments once per failed
    /// call; receivers use it to notice that the connection misbehaved.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.errors.subscribe()
    }

    fn signal(&self) {
        self.errors.send_modify(|n| *n += 1);
    }
}

#[async_trait]
impl RpcConn for SignalConn {
    async fn invoke(&self, call: UnaryCall) -> Result<UnaryReply, Status> {
        match self.inner.invoke(call).await {
            Ok(reply) => Ok(reply),
            Err(status) => {
                self.signal();
                Err(status)
            }
        }
    }

    async fn open_stream(&self, call: UnaryCall) -> Result<StreamReply, Status> {
        match self.inner.open_stream(call).await {
            Ok(reply) => Ok(reply),
            Err(status) => {
                self.signal();
                Err(status)
            }
        }
    }
}

/// A lazily-materialized client keyed to the health of its connection.
///
/// `get` returns the cached client until the connection signals an error,
/// after which the next `get` rebuilds it through the factory. The epoch
/// comparison makes the replace atomic with respect to the error signal.
pub struct ResettableClient<C> {
    factory: Arc<dyn Fn(ConnHandle) -> C + Send + Sync>,
    conn: Arc<SignalConn>,
    errors: watch::Receiver<u64>,
    slot: Mutex<Option<(u64, C)>>,
}

impl<C: Clone> ResettableClient<C> {
    pub fn new(
        conn: Arc<SignalConn>,
        factory: impl Fn(ConnHandle) -> C + Send + Sync + 'static,
    ) -> Self {
        let errors = conn.subscribe();
        Self {
            factory: Arc::new(factory),
            conn,
            errors,
            slot: Mutex::new(None),
        }
    }

    pub fn get(&self) -> C {
        let epoch = *self.errors.borrow();
        let mut slot = self.slot.lock().unwrap();
        if let Some((cached_epoch, client)) = slot.as_ref() {
            if *cached_epoch == epoch {
                return client.clone();
            }
        }

        let client = (self.factory)(self.conn.clone() as ConnHandle);
        *slot = Some((epoch, client.clone()));
        client
    }
}
