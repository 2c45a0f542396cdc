// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The discovery coordinator: N provider streams in, one ordered dispatch
//! stream out.
//!
//! Each provider gets a producer task that forwards its events into a
//! bounded central channel. When the channel is full, events park in that
//! producer's overflow queue; a periodic drain flushes them, so bursty
//! joins at startup are delivered late rather than dropped. Once a producer
//! has overflowed, its newer events queue behind the overflow until the
//! drain catches up, preserving per-provider FIFO order.
//!
//! Subscribers run synchronously, in registration order, under a panic
//! shield. A new subscriber sees only future events.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::registry::Registry;
use crate::runqueue::panic_message;
use crate::{raise, Result};

use super::{Provider, RegistryMessage};

type Subscriber = Box<dyn Fn(&RegistryMessage) + Send + Sync>;

pub struct Coordinator {
    providers: Registry<Box<dyn Provider>>,
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
    channel_capacity: usize,
    drain_interval: Duration,
    started: AtomicBool,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(10))
    }
}

impl Coordinator {
    pub fn new(channel_capacity: usize, drain_interval: Duration) -> Self {
        Self {
            providers: Registry::new(),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            channel_capacity: channel_capacity.max(1),
            drain_interval,
            started: AtomicBool::new(false),
        }
    }

    /// Register a provider constructor under `name`. Last registration for a
    /// name wins. Constructors run at `start`.
    pub fn register_provider(
        &self,
        name: impl Into<String>,
        ctor: impl Fn() -> Box<dyn Provider> + Send + Sync + 'static,
    ) {
        self.providers.register(name, ctor);
    }

    /// Append a subscriber. Subscribers receive every event dispatched after
    /// this call, in registration order.
    pub fn discovery(&self, subscriber: impl Fn(&RegistryMessage) + Send + Sync + 'static) {
        self.subscribers
            .write()
            .unwrap()
            .push(Box::new(subscriber));
    }

    /// Run the coordinator until `token` is cancelled. Starts every
    /// registered provider; returns an error if called twice.
    pub async fn start(&self, token: CancellationToken) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            raise!("discovery coordinator already started");
        }

        let (tx, mut rx) = mpsc::channel::<RegistryMessage>(self.channel_capacity);

        let mut providers: Vec<(String, Box<dyn Provider>)> = Vec::new();
        self.providers.range(|name, ctor| {
            providers.push((name.to_string(), ctor()));
        });

        for (name, mut provider) in providers {
            let notify = provider.notify();
            tokio::spawn(producer_loop(
                name,
                provider,
                notify,
                tx.clone(),
                self.drain_interval,
                token.clone(),
            ));
        }
        drop(tx);

        loop {
            tokio::select! {
                message = rx.recv() => {
                    match message {
                        Some(message) => self.dispatch(&message),
                        None => return Ok(()),
                    }
                }
                _ = token.cancelled() => return Ok(()),
            }
        }
    }

    fn dispatch(&self, message: &RegistryMessage) {
        let subscribers = self.subscribers.read().unwrap();
        for subscriber in subscribers.iter() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| subscriber(message))) {
                tracing::error!(
                    service = %message.desc.service,
                    panic = %panic_message(&panic),
                    "discovery subscriber panicked"
                );
            }
        }
    }
}

/// Forwards one provider's events into the central channel, parking bursts
/// in a local overflow queue that drains on a timer.
async fn producer_loop(
    name: String,
    _provider: Box<dyn Provider>,
    mut notify: mpsc::Receiver<RegistryMessage>,
    tx: mpsc::Sender<RegistryMessage>,
    drain_interval: Duration,
    token: CancellationToken,
) {
    let mut overflow: VecDeque<RegistryMessage> = VecDeque::new();
    let mut drain = tokio::time::interval(drain_interval);
    drain.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    drain.reset();

    loop {
        tokio::select! {
            message = notify.recv() => {
                let Some(message) = message else {
                    tracing::warn!(provider = %name, "provider stream closed");
                    break;
                };
                if overflow.is_empty() {
                    if let Err(mpsc::error::TrySendError::Full(message)) = tx.try_send(message) {
                        tracing::debug!(provider = %name, "central channel full, queueing");
                        overflow.push_back(message);
                    }
                } else {
                    overflow.push_back(message);
                }
            }
            _ = drain.tick() => {
                while let Some(message) = overflow.pop_front() {
                    if let Err(mpsc::error::TrySendError::Full(message)) = tx.try_send(message) {
                        overflow.push_front(message);
                        break;
                    }
                }
            }
            _ = token.cancelled() => break,
        }
    }

    // final flush so late queued events are not lost on graceful shutdown
    while let Some(message) = overflow.pop_front() {
        if tx.send(message).await.is_err() {
            break;
        }
    }
}
