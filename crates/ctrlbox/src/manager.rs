// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection manager.
//!
//! Keeps one [`ConnectionRecord`] per available resource and tears records
//! down when resources disappear:
//! - `available()` creates a record, or replaces one holding another connector
//! - `unavailable()` stops and drops the record
//! - `maintain()` drives connections from the caller's thread
//! - `update()` delivers queued connection events to listeners
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                    ConnectionManager                         |
//! |  +-------------------------------------------------------+  |
//! |  |   records: RwLock<HashMap<ResourceKey, Record>>        |  |
//! |  |   (mutations serialised by a separate mutex)           |  |
//! |  +-------------------------------------------------------+  |
//! |        | one worker thread per record (Background mode)     |
//! |        v                                                    |
//! |  +-------------------------------------------------------+  |
//! |  |   EventAggregator  --update()-->  listeners            |  |
//! |  +-------------------------------------------------------+  |
//! +-------------------------------------------------------------+
//! ```
//!
//! A replaced or removed record is stopped (worker joined, connector
//! disconnected) before the call returns, and a replacement only becomes
//! visible once its predecessor is gone. Snapshot readers are never blocked
//! by a stop in progress.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::connection::{ConnectedCallback, ConnectionLoop, ConnectionRecord, MaintainedConnection};
use crate::connector::Connector;
use crate::error::{Error, Result};
use crate::events::{ConnectionEvent, EventAggregator, EventSink};
use crate::resource::ResourceKey;
use crate::retry::{BackoffRetryStrategy, PeriodRetryStrategy, RetryStrategy};

// ============================================================================
// Configuration
// ============================================================================

/// Who drives the maintained connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveMode {
    /// One background worker per record.
    #[default]
    Background,
    /// No workers; the owner calls [`ConnectionManager::maintain`].
    External,
}

/// Retry policy given to each new record.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RetryPolicy {
    /// Fixed spacing of [`ManagerConfig::retry_period`].
    #[default]
    Period,
    /// Growing spacing, reset after each successful connect.
    Backoff {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

/// Configuration for the connection manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Minimum spacing between connection attempts on one resource
    pub retry_period: Duration,

    /// How long `unavailable()` / replacement waits for a worker to exit
    pub stop_timeout: Duration,

    /// Connected-loop pacing when no callback is installed
    pub idle_interval: Duration,

    /// Background workers or caller-driven `maintain()`
    pub drive: DriveMode,

    /// Retry strategy for new records
    pub retry: RetryPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            retry_period: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            idle_interval: Duration::from_millis(100),
            drive: DriveMode::Background,
            retry: RetryPolicy::Period,
        }
    }
}

impl ManagerConfig {
    pub fn with_retry_period(mut self, period: Duration) -> Self {
        self.retry_period = period;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    pub fn with_drive(mut self, drive: DriveMode) -> Self {
        self.drive = drive;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn new_retry_strategy(&self) -> Box<dyn RetryStrategy> {
        match self.retry {
            RetryPolicy::Period => Box::new(PeriodRetryStrategy::new(self.retry_period)),
            RetryPolicy::Backoff {
                initial,
                max,
                multiplier,
            } => Box::new(BackoffRetryStrategy::new(initial, max, multiplier)),
        }
    }
}

// ============================================================================
// Connection Manager
// ============================================================================

type Listener = Box<dyn FnMut(&ConnectionEvent) + Send>;

/// Registry of resource key to managed connection.
pub struct ConnectionManager {
    config: ManagerConfig,
    connected_loop: Option<ConnectedCallback>,
    records: RwLock<HashMap<ResourceKey, Arc<ConnectionRecord>>>,
    /// Serialises available / unavailable / discard.
    mutation: Mutex<()>,
    events: EventAggregator,
    listeners: Mutex<Vec<Listener>>,
}

impl ConnectionManager {
    /// Manager whose workers only keep connections open.
    pub fn new(config: ManagerConfig) -> Self {
        Self::build(config, None)
    }

    /// Manager running `callback` on each worker while its connection is live.
    pub fn with_connected_loop(config: ManagerConfig, callback: ConnectedCallback) -> Self {
        Self::build(config, Some(callback))
    }

    /// Manager that runs the controller protocol on the workers: each
    /// connected-loop iteration reads one response from the connector's
    /// protocol.
    pub fn controller(config: ManagerConfig) -> Self {
        let read_response: ConnectedCallback =
            Arc::new(|conn: &MaintainedConnection| -> Result<()> {
                match conn.connector().protocol() {
                    Some(protocol) => protocol.read_response(),
                    None => Err(Error::Protocol(format!(
                        "{} connected without a protocol",
                        conn.resource()
                    ))),
                }
            });
        Self::with_connected_loop(config, read_response)
    }

    fn build(config: ManagerConfig, connected_loop: Option<ConnectedCallback>) -> Self {
        Self {
            config,
            connected_loop,
            records: RwLock::new(HashMap::new()),
            mutation: Mutex::new(()),
            events: EventAggregator::new(),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Register a listener for connection events. Listeners run on the
    /// thread calling [`update`](Self::update) and must not call back into
    /// `update()` or `add_listener()`.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: FnMut(&ConnectionEvent) + Send + 'static,
    {
        self.listeners.lock().push(Box::new(listener));
    }

    pub fn events(&self) -> &EventAggregator {
        &self.events
    }

    /// Producer handle into this manager's event queue.
    pub fn event_sink(&self) -> EventSink {
        self.events.sink()
    }

    /// The resource `key` can be reached through `connector`.
    ///
    /// Same connector as the current record: no-op. Different connector: the
    /// old record is stopped first (blocking), then replaced.
    pub fn available(&self, key: ResourceKey, connector: Arc<dyn Connector>) {
        let _guard = self.mutation.lock();

        if let Some(existing) = self.records.read().get(&key) {
            if same_connector(existing.connection().connector(), &connector) {
                return;
            }
        }

        let previous = self.records.write().remove(&key);
        if let Some(previous) = previous {
            log::info!("[MANAGER] connector changed for {}, replacing", key);
            self.retire(&key, &previous);
        }

        let record = Arc::new(self.new_record(key.clone(), connector));
        if self.config.drive == DriveMode::Background {
            if let Err(e) = record.start() {
                log::error!("[MANAGER] cannot start worker for {}: {}", key, e);
                record.connection().close();
                return;
            }
        }
        log::debug!("[MANAGER] resource available: {}", key);
        self.records.write().insert(key, record);
    }

    /// The resource `key` went away. Stops and drops its record; unknown keys
    /// are ignored.
    pub fn unavailable(&self, key: &ResourceKey) {
        let _guard = self.mutation.lock();
        let removed = self.records.write().remove(key);
        if let Some(record) = removed {
            log::debug!("[MANAGER] resource unavailable: {}", key);
            self.retire(key, &record);
        }
    }

    /// Drive every connection once. Used when connections are not run by
    /// background workers; with [`DriveMode::Background`] it only drops
    /// records whose worker failed.
    ///
    /// Iterates over a snapshot. A resource failing with anything other than
    /// a connection error is closed and dropped; the others are unaffected.
    /// Records removed concurrently are skipped.
    pub fn maintain(&self, now: Instant) {
        self.reap_failed();
        if self.config.drive == DriveMode::Background {
            return;
        }
        for (key, record) in self.snapshot() {
            if let Err(e) = record.maintain(now) {
                log::error!("[MANAGER] unexpected error '{}' on {}, closing", e, key);
                record.connection().close();
                self.discard(&key, &record);
            }
        }
    }

    /// Deliver queued connection events to listeners, in arrival order.
    /// Also drops records whose worker died on an unexpected error.
    ///
    /// Returns the number of events delivered.
    pub fn update(&self) -> usize {
        self.reap_failed();
        let mut listeners = self.listeners.lock();
        self.events.drain_and_dispatch(|event| {
            for listener in listeners.iter_mut() {
                listener(event);
            }
        })
    }

    /// Snapshot of resource to maintained connection. Connections may or may
    /// not be connected.
    pub fn connections(&self) -> HashMap<ResourceKey, Arc<MaintainedConnection>> {
        self.records
            .read()
            .iter()
            .map(|(k, r)| (k.clone(), Arc::clone(r.connection())))
            .collect()
    }

    /// Snapshot of resource to record.
    pub fn records(&self) -> HashMap<ResourceKey, Arc<ConnectionRecord>> {
        self.records.read().clone()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.records.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Stop every worker and drop every record.
    pub fn shutdown(&self) {
        let _guard = self.mutation.lock();
        let drained: Vec<_> = self.records.write().drain().collect();
        for (key, record) in drained {
            self.retire(&key, &record);
        }
    }

    fn new_record(&self, key: ResourceKey, connector: Arc<dyn Connector>) -> ConnectionRecord {
        let connection = MaintainedConnection::new(
            key.clone(),
            connector,
            self.config.new_retry_strategy(),
            self.events.sink(),
        );
        let worker = ConnectionLoop::new(
            key,
            self.connected_loop.clone(),
            self.config.idle_interval,
        );
        ConnectionRecord::new(connection, worker)
    }

    fn snapshot(&self) -> Vec<(ResourceKey, Arc<ConnectionRecord>)> {
        self.records
            .read()
            .iter()
            .map(|(k, r)| (k.clone(), Arc::clone(r)))
            .collect()
    }

    /// Stop a record already removed from the map.
    fn retire(&self, key: &ResourceKey, record: &ConnectionRecord) {
        match record.stop(self.config.stop_timeout) {
            Ok(()) => {}
            Err(e @ Error::StopTimeout { .. }) => {
                log::error!("[MANAGER] {}, worker abandoned", e);
            }
            Err(e) => log::error!("[MANAGER] failed to stop {}: {}", key, e),
        }
    }

    /// Remove `record` if it is still the one registered under `key`.
    fn discard(&self, key: &ResourceKey, record: &Arc<ConnectionRecord>) {
        let _guard = self.mutation.lock();
        let removed = {
            let mut records = self.records.write();
            match records.get(key) {
                Some(current) if Arc::ptr_eq(current, record) => records.remove(key),
                _ => None,
            }
        };
        if let Some(record) = removed {
            self.retire(key, &record);
        }
    }

    fn reap_failed(&self) {
        let failed: Vec<_> = self
            .snapshot()
            .into_iter()
            .filter(|(_, r)| r.has_failed())
            .collect();
        for (key, record) in failed {
            log::warn!("[MANAGER] dropping {} after worker failure", key);
            self.discard(&key, &record);
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn same_connector(a: &Arc<dyn Connector>, b: &Arc<dyn Connector>) -> bool {
    // data pointers only; vtables may differ between codegen units
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

// ============================================================================
// Tests
// ============================================================================
