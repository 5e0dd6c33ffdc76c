// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background worker driving one [`MaintainedConnection`].
//!
//! ```text
//!            ┌─────────────────────────────────────────────┐
//!            ▼                                             │
//!   retry delay > 0 ? ──yes──► interruptible wait ─────────┤
//!            │ no                                          │
//!         open()  ──fatal error──► close, mark failed, exit│
//!            │                                             │
//!   while connected && !stop:                              │
//!       callback(conn) ──err──► close ─────────────────────┘
//! ```
//!
//! Stopping is cooperative: the flag is checked at loop boundaries and the
//! retry wait is woken early. The thread is never killed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::{Condvar, Mutex};

use super::MaintainedConnection;
use crate::error::{Error, Result};
use crate::resource::ResourceKey;

/// Hook invoked repeatedly while a connection is live. May block on I/O.
/// An error marks the connection as failed: it is closed and retried later.
pub type ConnectedCallback = Arc<dyn Fn(&MaintainedConnection) -> Result<()> + Send + Sync>;

/// Stop flag plus the condition variable used for the retry wait.
#[derive(Default)]
struct LoopControl {
    stop: Mutex<bool>,
    wake: Condvar,
    failed: AtomicBool,
}

impl LoopControl {
    fn is_stopped(&self) -> bool {
        *self.stop.lock()
    }

    fn request_stop(&self) {
        *self.stop.lock() = true;
        self.wake.notify_all();
    }

    /// Sleep up to `timeout`, returning early once a stop is requested.
    fn wait(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stop.lock();
        while !*stopped {
            if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
    }
}

/// Marks the loop failed if the worker unwinds.
struct PanicGuard<'a>(&'a LoopControl);

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.failed.store(true, Ordering::Release);
        }
    }
}

struct Worker {
    thread: JoinHandle<()>,
    /// Disconnects when the worker exits; bounds the join.
    done: Receiver<()>,
}

/// Runs the connect/retry/connected-callback cycle of one resource on a
/// dedicated thread.
pub struct ConnectionLoop {
    resource: ResourceKey,
    callback: Option<ConnectedCallback>,
    idle_interval: Duration,
    control: Arc<LoopControl>,
    worker: Mutex<Option<Worker>>,
}

impl ConnectionLoop {
    /// `idle_interval` paces the connected loop when no callback is given.
    pub fn new(
        resource: ResourceKey,
        callback: Option<ConnectedCallback>,
        idle_interval: Duration,
    ) -> Self {
        Self {
            resource,
            callback,
            idle_interval,
            control: Arc::new(LoopControl::default()),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker. The loop only holds a weak reference to the
    /// connection; once the owner drops it the worker exits at its next
    /// loop boundary.
    ///
    /// Starting twice, or after a stop request, does nothing.
    pub fn start(&self, connection: Weak<MaintainedConnection>) -> Result<()> {
        let mut slot = self.worker.lock();
        if slot.is_some() || self.control.is_stopped() {
            return Ok(());
        }

        let (done_tx, done_rx) = bounded::<()>(0);
        let control = Arc::clone(&self.control);
        let callback = self.callback.clone();
        let idle = self.idle_interval;
        let resource = self.resource.clone();

        let thread = thread::Builder::new()
            .name(format!("ctrlbox-{}", self.resource))
            .spawn(move || {
                let _done = done_tx;
                let _guard = PanicGuard(&control);
                run(&resource, &connection, &control, callback.as_ref(), idle);
            })
            .map_err(Error::Spawn)?;

        log::debug!("[CONN] worker started for {}", self.resource);
        *slot = Some(Worker {
            thread,
            done: done_rx,
        });
        Ok(())
    }

    /// Set the cancellation flag and wake the retry wait. Idempotent.
    pub fn request_stop(&self) {
        self.control.request_stop();
    }

    /// Wait up to `timeout` for the worker to exit.
    ///
    /// On timeout the worker is abandoned (detached) and
    /// [`Error::StopTimeout`] returned; it still exits at its next loop
    /// boundary.
    pub fn join(&self, timeout: Duration) -> Result<()> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        if worker.thread.thread().id() == thread::current().id() {
            // stop requested from inside the callback; the loop exits on return
            return Ok(());
        }
        match worker.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => Err(Error::StopTimeout {
                resource: self.resource.clone(),
                timeout,
            }),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.thread.join().is_err() {
                    log::error!("[CONN] worker for {} panicked", self.resource);
                }
                Ok(())
            }
        }
    }

    /// Request a stop and join with a bound.
    pub fn stop(&self, timeout: Duration) -> Result<()> {
        self.request_stop();
        self.join(timeout)
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.thread.is_finished())
    }

    pub fn is_stopping(&self) -> bool {
        self.control.is_stopped()
    }

    /// True once the worker exited on an unexpected error or panic.
    pub fn has_failed(&self) -> bool {
        self.control.failed.load(Ordering::Acquire)
    }
}

impl Drop for ConnectionLoop {
    fn drop(&mut self) {
        self.request_stop();
    }
}

fn run(
    resource: &ResourceKey,
    connection: &Weak<MaintainedConnection>,
    control: &LoopControl,
    callback: Option<&ConnectedCallback>,
    idle: Duration,
) {
    while !control.is_stopped() {
        let Some(conn) = connection.upgrade() else {
            break;
        };

        let delay = conn.retry_delay(Instant::now());
        if !delay.is_zero() {
            drop(conn);
            control.wait(delay);
            continue;
        }

        if let Err(e) = conn.open() {
            log::error!("[CONN] unexpected error on {}, closing: {}", resource, e);
            conn.close();
            control.failed.store(true, Ordering::Release);
            break;
        }

        while conn.is_connected() && !control.is_stopped() {
            let step = match callback {
                Some(cb) => cb(&conn),
                None => {
                    control.wait(idle);
                    Ok(())
                }
            };
            if let Err(e) = step {
                if control.is_stopped() {
                    log::debug!("[CONN] {} closed during stop: {}", resource, e);
                } else {
                    log::warn!("[CONN] connection to {} failed: {}", resource, e);
                }
                conn.close();
                break;
            }
        }
        // the connector may have dropped the link by itself
        conn.sync_state();
    }

    if let Some(conn) = connection.upgrade() {
        conn.close();
    }
    log::debug!("[CONN] worker for {} stopped", resource);
}
