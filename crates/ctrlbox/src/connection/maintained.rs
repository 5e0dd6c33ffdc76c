// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A connector kept open according to a retry policy.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::connector::Connector;
use crate::error::{Error, Result};
use crate::events::{ConnectionEvent, EventSink};
use crate::resource::ResourceKey;
use crate::retry::RetryStrategy;

/// Owns one connector for one resource and (re)opens it when the retry
/// strategy allows.
///
/// Connectivity transitions are reported to the sink as
/// [`ConnectionEvent::ConnectorConnected`] / [`ConnectionEvent::ConnectorDisconnected`],
/// once per transition, in the order they were observed. A connector that
/// drops the link on its own is noticed at the next `open`, `close` or
/// [`sync_state`](Self::sync_state).
pub struct MaintainedConnection {
    resource: ResourceKey,
    connector: Arc<dyn Connector>,
    retry: Mutex<Box<dyn RetryStrategy>>,
    events: EventSink,
    /// Last state pushed to `events`.
    reported: AtomicBool,
}

impl MaintainedConnection {
    pub fn new(
        resource: ResourceKey,
        connector: Arc<dyn Connector>,
        retry: Box<dyn RetryStrategy>,
        events: EventSink,
    ) -> Self {
        Self {
            resource,
            connector,
            retry: Mutex::new(retry),
            events,
            reported: AtomicBool::new(false),
        }
    }

    pub fn resource(&self) -> &ResourceKey {
        &self.resource
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn is_connected(&self) -> bool {
        self.connector.is_connected()
    }

    /// Try to connect if the connector is closed and its resource available.
    ///
    /// Connection errors are logged and swallowed. Any other error is
    /// returned: it is fatal for this resource.
    ///
    /// Returns whether an attempt was made.
    pub fn open(&self) -> Result<bool> {
        let connector = &self.connector;
        let try_open = !connector.is_connected() && connector.is_available();
        if try_open {
            match connector.connect() {
                Ok(()) => {
                    log::info!("[CONN] device connected: {}", self.resource);
                    self.retry.lock().reset();
                }
                Err(Error::Connection(e)) => {
                    log::debug!("[CONN] unable to connect to {}: {}", self.resource, e);
                }
                Err(e) => {
                    self.sync_state();
                    return Err(e);
                }
            }
        }
        self.sync_state();
        Ok(try_open)
    }

    /// Disconnect if connected. Returns whether it had been connected.
    pub fn close(&self) -> bool {
        let was_connected = self.connector.is_connected();
        if was_connected {
            self.connector.disconnect();
            log::info!("[CONN] device disconnected: {}", self.resource);
        }
        self.sync_state();
        was_connected
    }

    /// Consult the retry strategy and open if an attempt is due.
    ///
    /// Returns whether an attempt was due.
    pub fn maintain(&self, now: Instant) -> Result<bool> {
        if !self.retry_delay(now).is_zero() {
            return Ok(false);
        }
        self.open()?;
        Ok(true)
    }

    /// Delay reported by the retry strategy. `Duration::ZERO` means an attempt
    /// is due and restarts the strategy's clock.
    pub fn retry_delay(&self, now: Instant) -> Duration {
        self.retry.lock().evaluate(now)
    }

    /// Report a connectivity change not yet pushed to the sink.
    pub fn sync_state(&self) {
        let connected = self.connector.is_connected();
        if self.reported.swap(connected, Ordering::AcqRel) == connected {
            return;
        }
        let resource = self.resource.clone();
        self.events.push(if connected {
            ConnectionEvent::ConnectorConnected { resource }
        } else {
            ConnectionEvent::ConnectorDisconnected { resource }
        });
    }
}

impl fmt::Debug for MaintainedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaintainedConnection")
            .field("resource", &self.resource)
            .field("connected", &self.connector.is_connected())
            .finish()
    }
}
