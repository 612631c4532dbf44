//! Reply dispatcher for inbound service replies
//!
//! Sole consumer of the shared reply topic. Each message is decoded and
//! handed to the correlation registry; no business logic runs here.

#![warn(missing_docs)]

use crate::gateway::ReplyRegistry;
use crate::transport::ReplyEnvelope;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of routing one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Reply handed to its waiting caller
    Delivered,
    /// No caller was waiting (late, duplicate or unknown reply)
    Orphaned,
    /// Message could not be decoded
    Malformed,
}

/// Counters of dispatch outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Replies delivered to a caller
    pub delivered: u64,
    /// Replies dropped for lack of a caller
    pub orphaned: u64,
    /// Messages that failed to decode
    pub malformed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    orphaned: AtomicU64,
    malformed: AtomicU64,
}

/// Routes inbound replies to their waiting callers
#[derive(Debug)]
pub struct ReplyDispatcher {
    registry: Arc<ReplyRegistry>,
    counters: Counters,
}

impl ReplyDispatcher {
    /// Create a dispatcher delivering into `registry`
    pub fn new(registry: Arc<ReplyRegistry>) -> Self {
        Self {
            registry,
            counters: Counters::default(),
        }
    }

    /// Decode and route raw reply bytes
    pub fn handle_raw(&self, payload: &[u8]) -> DispatchOutcome {
        match serde_json::from_slice::<ReplyEnvelope>(payload) {
            Ok(envelope) => self.handle(envelope),
            Err(e) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, len = payload.len(), "discarding malformed service reply");
                DispatchOutcome::Malformed
            }
        }
    }

    /// Route a decoded reply
    pub fn handle(&self, envelope: ReplyEnvelope) -> DispatchOutcome {
        let key = envelope.correlation_key();

        if self.registry.deliver(&key, envelope.data) {
            self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            debug!(%key, gateway = %envelope.gateway, "service reply delivered");
            DispatchOutcome::Delivered
        } else {
            self.counters.orphaned.fetch_add(1, Ordering::Relaxed);
            debug!(%key, gateway = %envelope.gateway, "service reply orphaned");
            DispatchOutcome::Orphaned
        }
    }

    /// Snapshot of the outcome counters
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            orphaned: self.counters.orphaned.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
        }
    }

    /// Drain `inbound` with a fixed pool of `workers` tasks.
    ///
    /// Workers exit once every sender of `inbound` is dropped.
    pub fn spawn_workers(
        self: &Arc<Self>,
        inbound: mpsc::Receiver<Vec<u8>>,
        workers: usize,
    ) -> Vec<JoinHandle<()>> {
        let inbound = Arc::new(Mutex::new(inbound));

        (0..workers.max(1))
            .map(|worker| {
                let dispatcher = Arc::clone(self);
                let inbound = Arc::clone(&inbound);
                tokio::spawn(async move {
                    loop {
                        // Release the receiver before routing so siblings can pull
                        let next = inbound.lock().await.recv().await;
                        match next {
                            Some(payload) => {
                                dispatcher.handle_raw(&payload);
                            }
                            None => break,
                        }
                    }
                    info!(worker, "reply dispatcher worker stopped");
                })
            })
            .collect()
    }
}
