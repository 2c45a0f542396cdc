// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Double-buffered pool of route tables.
//!
//! Readers pick any ready slot; a rebuild marks one slot busy, constructs
//! the replacement off to the side, swaps it in, and re-marks the slot
//! ready. Readiness is a bitmask: bit set means the slot may serve. The
//! sole remaining ready slot is never marked busy, so at least one bit is
//! set at every observable moment and dispatch never blocks on a rebuild.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use tokio::task::JoinHandle;

use crate::routing::RouteTable;

#[derive(Clone)]
pub struct MuxPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    bits: AtomicU32,
    slots: Vec<RwLock<Arc<RouteTable>>>,
}

impl MuxPool {
    /// Create a pool of `size` slots (minimum 2), all ready and all holding
    /// `initial`.
    pub fn new(size: usize, initial: Arc<RouteTable>) -> Self {
        let size = size.clamp(2, 31);
        let slots = (0..size)
            .map(|_| RwLock::new(initial.clone()))
            .collect::<Vec<_>>();
        let bits = (1u32 << size) - 1;

        Self {
            inner: Arc::new(PoolInner {
                bits: AtomicU32::new(bits),
                slots,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Snapshot of the readiness bitmask; non-zero by construction.
    pub fn ready_bits(&self) -> u32 {
        self.inner.bits.load(Ordering::Acquire)
    }

    /// Return the lowest-indexed ready table.
    pub fn get(&self) -> Arc<RouteTable> {
        let bits = self.inner.bits.load(Ordering::Acquire);
        let idx = if bits == 0 {
            0
        } else {
            bits.trailing_zeros() as usize
        };
        self.inner.slots[idx].read().unwrap().clone()
    }

    /// Synchronously install `table` into every slot, leaving readiness
    /// untouched. Used when the table set is assembled before serving
    /// begins; runtime rebuilds go through [`MuxPool::update`].
    pub fn prime(&self, table: Arc<RouteTable>) {
        for slot in &self.inner.slots {
            *slot.write().unwrap() = table.clone();
        }
    }

    /// Rebuild slot `idx` in the background. The builder runs off the
    /// request path; on `None` the prior table stays in place. Returns a
    /// handle resolving to whether a new table was installed.
    pub fn update(
        &self,
        idx: usize,
        builder: impl FnOnce() -> Option<Arc<RouteTable>> + Send + 'static,
    ) -> JoinHandle<bool> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if idx >= inner.slots.len() {
                return false;
            }

            // Mark the slot busy unless it is the only ready one; in that
            // case the swap happens in place and readers keep the old Arc
            // until it lands.
            let marked = loop {
                let bits = inner.bits.load(Ordering::Acquire);
                if bits & (1 << idx) == 0 {
                    return false;
                }
                let cleared = bits & !(1 << idx);
                if cleared == 0 {
                    break false;
                }
                if inner
                    .bits
                    .compare_exchange(bits, cleared, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    break true;
                }
            };

            let built = builder();
            let installed = match built {
                Some(table) => {
                    *inner.slots[idx].write().unwrap() = table;
                    true
                }
                None => false,
            };

            if marked {
                inner.bits.fetch_or(1 << idx, Ordering::AcqRel);
            }
            installed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RouteHandler;
    use axum::response::IntoResponse;
    use http::Method;

    fn table_with(paths: &[&str]) -> Arc<RouteTable> {
        let mut table = RouteTable::new();
        for path in paths {
            let handler: RouteHandler =
                Arc::new(move |_parts| Box::pin(async move { "ok".into_response() }));
            table.bind(Method::GET, path, handler).unwrap();
        }
        Arc::new(table)
    }

    #[tokio::test]
    async fn test_all_slots_start_ready() {
        let pool = MuxPool::new(2, table_with(&["/api/a"]));
        assert_eq!(pool.ready_bits(), 0b11);
        assert_eq!(pool.get().len(), 1);
    }

    #[tokio::test]
    async fn test_update_swaps_table() {
        let pool = MuxPool::new(2, table_with(&["/api/a"]));
        pool.update(0, || Some(table_with(&["/api/a", "/api/b"])))
            .await
            .unwrap();

        assert_eq!(pool.ready_bits(), 0b11);
        assert!(pool.get().lookup(&Method::GET, "/api/b").is_some());
    }

    #[tokio::test]
    async fn test_failed_update_keeps_prior_table() {
        let pool = MuxPool::new(2, table_with(&["/api/a"]));
        let installed = pool.update(0, || None).await.unwrap();

        assert!(!installed);
        assert_eq!(pool.ready_bits(), 0b11);
        assert!(pool.get().lookup(&Method::GET, "/api/a").is_some());
    }

    #[tokio::test]
    async fn test_liveness_under_concurrent_updates() {
        let pool = MuxPool::new(2, table_with(&["/api/a"]));

        let u0 = pool.update(0, || Some(table_with(&["/api/a", "/api/b"])));
        let u1 = pool.update(1, || Some(table_with(&["/api/a", "/api/b"])));

        // at every observable moment some slot serves
        for _ in 0..100 {
            assert_ne!(pool.ready_bits(), 0);
            let _ = pool.get();
        }

        let _ = u0.await;
        let _ = u1.await;
        assert_eq!(pool.ready_bits(), 0b11);
    }

    #[tokio::test]
    async fn test_hot_swap_under_load() {
        let pool = MuxPool::new(2, table_with(&["/api/a"]));

        let readers: Vec<_> = (0..100)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    for _ in 0..10 {
                        let table = pool.get();
                        assert!(table.lookup(&Method::GET, "/api/a").is_some());
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        pool.update(0, || Some(table_with(&["/api/a", "/api/new"])))
            .await
            .unwrap();
        pool.update(1, || Some(table_with(&["/api/a", "/api/new"])))
            .await
            .unwrap();

        for reader in readers {
            reader.await.unwrap();
        }
        assert!(pool.get().lookup(&Method::GET, "/api/new").is_some());
    }
}
