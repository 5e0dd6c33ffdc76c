// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection events and the cross-thread aggregator.
//!
//! Workers push events from their own threads through an [`EventSink`].
//! Nothing reaches listener code until the consuming thread calls
//! [`EventAggregator::drain_and_dispatch`].
//!
//! ```text
//!  worker A ──push──┐
//!  worker B ──push──┼──► unbounded FIFO ──drain_and_dispatch──► listeners
//!  worker C ──push──┘                      (consumer thread)
//! ```

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::resource::ResourceKey;

/// Connectivity transition of a managed resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnectorConnected { resource: ResourceKey },
    ConnectorDisconnected { resource: ResourceKey },
}

impl ConnectionEvent {
    pub fn resource(&self) -> &ResourceKey {
        match self {
            ConnectionEvent::ConnectorConnected { resource }
            | ConnectionEvent::ConnectorDisconnected { resource } => resource,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionEvent::ConnectorConnected { .. })
    }
}

/// Producer side of an [`EventAggregator`]. Cheap to clone, usable from any
/// thread, never blocks.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: Sender<ConnectionEvent>,
}

impl EventSink {
    pub fn push(&self, event: ConnectionEvent) {
        // The receiver lives in the aggregator; once that is gone nobody is
        // left to observe the event.
        if self.tx.send(event).is_err() {
            log::debug!("[EVENTS] aggregator dropped, event discarded");
        }
    }
}

/// Thread-safe FIFO between background producers and one consumer.
#[derive(Debug)]
pub struct EventAggregator {
    tx: Sender<ConnectionEvent>,
    rx: Receiver<ConnectionEvent>,
}

impl EventAggregator {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// New producer handle feeding this aggregator.
    pub fn sink(&self) -> EventSink {
        EventSink {
            tx: self.tx.clone(),
        }
    }

    /// Queue an event. Safe from any thread.
    pub fn push(&self, event: ConnectionEvent) {
        // Cannot fail: `self.rx` keeps the channel open.
        let _ = self.tx.send(event);
    }

    /// Number of events waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Deliver every event queued at the time of the call, in arrival order,
    /// exactly once. Events pushed while draining wait for the next call.
    ///
    /// Returns the number of events delivered.
    pub fn drain_and_dispatch<F>(&self, mut consumer: F) -> usize
    where
        F: FnMut(&ConnectionEvent),
    {
        let queued = self.rx.len();
        let mut delivered = 0;
        while delivered < queued {
            match self.rx.try_recv() {
                Ok(event) => {
                    consumer(&event);
                    delivered += 1;
                }
                Err(_) => break,
            }
        }
        delivered
    }
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new()
    }
}
