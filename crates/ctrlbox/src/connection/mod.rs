// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Maintained connections and their background workers.
//!
//! A [`ConnectionRecord`] owns both halves: the [`MaintainedConnection`]
//! (strong) and the [`ConnectionLoop`] driving it. The loop only gets a weak
//! reference back into the record, so dropping a record needs no cycle
//! breaking.

mod maintained;
mod worker;

pub use maintained::MaintainedConnection;
pub use worker::{ConnectedCallback, ConnectionLoop};

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::Result;

/// One managed resource: its connection plus the loop driving it.
pub struct ConnectionRecord {
    connection: Arc<MaintainedConnection>,
    worker: ConnectionLoop,
    /// Held by caller-driven `maintain()` and by the close in `stop()`.
    drive: Mutex<()>,
}

impl ConnectionRecord {
    pub fn new(connection: MaintainedConnection, worker: ConnectionLoop) -> Self {
        Self {
            connection: Arc::new(connection),
            worker,
            drive: Mutex::new(()),
        }
    }

    pub fn connection(&self) -> &Arc<MaintainedConnection> {
        &self.connection
    }

    pub fn worker(&self) -> &ConnectionLoop {
        &self.worker
    }

    /// Start the background worker.
    pub fn start(&self) -> Result<()> {
        self.worker.start(Arc::downgrade(&self.connection))
    }

    /// Drive the connection once from the caller's thread.
    ///
    /// Does nothing once a stop was requested. A `maintain` already in
    /// progress finishes before `stop` closes the connector, so a stopped
    /// record never ends up connected.
    pub fn maintain(&self, now: Instant) -> Result<bool> {
        let _drive = self.drive.lock();
        if self.worker.is_stopping() {
            return Ok(false);
        }
        self.connection.maintain(now)
    }

    /// Stop the worker and leave the connector disconnected.
    ///
    /// The disconnect is issued right away, concurrently with whatever the
    /// worker is doing, so a read blocked on the transport returns. After the
    /// join the connection is closed again in case a connect completed in
    /// between. Returns [`Error::StopTimeout`](crate::Error::StopTimeout) if
    /// the worker had to be abandoned.
    pub fn stop(&self, timeout: Duration) -> Result<()> {
        self.worker.request_stop();
        {
            let _drive = self.drive.lock();
            self.connection.close();
        }
        let joined = self.worker.join(timeout);
        self.connection.close();
        joined
    }

    /// Worker exited on an unexpected error and the record should be dropped.
    pub fn has_failed(&self) -> bool {
        self.worker.has_failed()
    }
}
