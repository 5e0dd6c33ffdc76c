// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connectors: objects that can open and close a channel to one resource.
//!
//! The lifecycle core only needs the [`Connector`] capability set. The
//! transports in this module (TCP, device node, child process) plus
//! [`ProtocolConnector`] are the glue used by the discovery facade.
//!
//! # Layering
//!
//! ```text
//! ProtocolConnector ── open ──► Transport (tcp | device | process)
//!        │                            │
//!        │                         Conduit (input/output halves)
//!        │                            │
//!        └──────── sniffer(conduit) ──┴──► Arc<dyn Protocol>
//! ```
//!
//! Connector methods take `&self`: a stop request may call
//! [`Connector::disconnect`] from another thread while the owning worker is
//! inside `connect()` or blocked reading the protocol. Implementations
//! synchronise internally. Transports make `close()` unblock pending reads
//! where the OS allows it (socket shutdown, killing the child).

mod device;
mod process;
mod tcp;

pub use device::DeviceTransport;
pub use process::ProcessTransport;
pub use tcp::TcpTransport;

use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{ConnectionError, Error, Result};

/// Capability set the lifecycle core relies on.
pub trait Connector: Send + Sync {
    /// Establish the connection. Transient failures are reported as
    /// [`Error::Connection`].
    fn connect(&self) -> Result<()>;

    /// Tear the connection down. Idempotent.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Whether the underlying resource can currently be opened.
    fn is_available(&self) -> bool;

    /// Protocol spoken over the live connection, if any.
    fn protocol(&self) -> Option<Arc<dyn Protocol>> {
        None
    }
}

/// Protocol running on an open channel.
pub trait Protocol: Send + Sync {
    /// One read/dispatch step. May block on I/O. An error means the
    /// connection is no longer usable.
    fn read_response(&self) -> Result<()>;
}

/// The two byte-stream halves of an open channel.
pub struct Conduit {
    pub input: Box<dyn Read + Send>,
    pub output: Box<dyn Write + Send>,
}

impl std::fmt::Debug for Conduit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conduit").finish_non_exhaustive()
    }
}

impl Conduit {
    pub fn new(input: impl Read + Send + 'static, output: impl Write + Send + 'static) -> Self {
        Self {
            input: Box::new(input),
            output: Box::new(output),
        }
    }
}

/// Raw channel provider wrapped by [`ProtocolConnector`].
pub trait Transport: Send {
    /// Open the channel. Failures to reach the resource should be
    /// [`Error::Connection`].
    fn open(&mut self) -> Result<Conduit>;

    /// Release the channel. Idempotent.
    fn close(&mut self);

    fn is_available(&self) -> bool {
        true
    }

    /// Short description for log lines.
    fn describe(&self) -> String;
}

/// Inspects a freshly opened channel and decides which protocol it speaks.
pub type Sniffer = Arc<dyn Fn(Conduit) -> Result<Arc<dyn Protocol>> + Send + Sync>;

/// Connector that opens a [`Transport`] and runs a [`Sniffer`] on it.
///
/// A failed or rejected sniff closes the transport again and is reported as
/// a connection error, so the attempt is retried later.
pub struct ProtocolConnector<T: Transport> {
    transport: Mutex<T>,
    sniffer: Sniffer,
    protocol: RwLock<Option<Arc<dyn Protocol>>>,
    connected: AtomicBool,
}

impl<T: Transport> ProtocolConnector<T> {
    pub fn new(transport: T, sniffer: Sniffer) -> Self {
        Self {
            transport: Mutex::new(transport),
            sniffer,
            protocol: RwLock::new(None),
            connected: AtomicBool::new(false),
        }
    }
}

impl<T: Transport> Connector for ProtocolConnector<T> {
    fn connect(&self) -> Result<()> {
        let mut transport = self.transport.lock();
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        let conduit = transport.open()?;
        match (self.sniffer)(conduit) {
            Ok(protocol) => {
                *self.protocol.write() = Some(protocol);
                self.connected.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                transport.close();
                let reason = match e {
                    Error::Connection(inner) => inner,
                    other => ConnectionError::new(format!(
                        "{}: unable to determine protocol: {}",
                        transport.describe(),
                        other
                    )),
                };
                Err(Error::Connection(reason))
            }
        }
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        self.protocol.write().take();
        self.transport.lock().close();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn is_available(&self) -> bool {
        self.transport.lock().is_available()
    }

    fn protocol(&self) -> Option<Arc<dyn Protocol>> {
        self.protocol.read().clone()
    }
}

type LineHandler = Box<dyn Fn(&str) + Send + Sync>;

struct LineReader {
    reader: BufReader<Box<dyn Read + Send>>,
    partial: Vec<u8>,
}

/// Newline-delimited text protocol.
///
/// Each [`Protocol::read_response`] reads one line and hands it, without the
/// line terminator, to the handler. Invalid UTF-8 is replaced with U+FFFD.
/// A read timeout is not an error; end of stream is. Bytes of a line cut
/// short by a timeout are kept for the next call.
pub struct LineProtocol {
    input: Mutex<LineReader>,
    output: Mutex<Box<dyn Write + Send>>,
    handler: LineHandler,
}

impl LineProtocol {
    pub fn new(conduit: Conduit, handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            input: Mutex::new(LineReader {
                reader: BufReader::new(conduit.input),
                partial: Vec::new(),
            }),
            output: Mutex::new(conduit.output),
            handler: Box::new(handler),
        }
    }

    /// Sniffer accepting any channel as a line protocol.
    pub fn sniffer(handler: impl Fn(&str) + Send + Sync + Clone + 'static) -> Sniffer {
        Arc::new(move |conduit: Conduit| -> Result<Arc<dyn Protocol>> {
            Ok(Arc::new(LineProtocol::new(conduit, handler.clone())))
        })
    }

    /// Write one line and flush.
    pub fn send(&self, line: &str) -> Result<()> {
        let mut out = self.output.lock();
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

impl Protocol for LineProtocol {
    fn read_response(&self) -> Result<()> {
        let line = {
            let mut input = self.input.lock();
            let LineReader { reader, partial } = &mut *input;
            match reader.read_until(b'\n', partial) {
                Ok(0) => return Err(Error::Protocol("end of stream".into())),
                Ok(_) if partial.last() != Some(&b'\n') => {
                    return Err(Error::Protocol("end of stream inside a line".into()))
                }
                Ok(_) => std::mem::take(partial),
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    return Ok(())
                }
                Err(e) => return Err(e.into()),
            }
        };
        // line noise (e.g. a device powering up) is replaced, not fatal
        let line = String::from_utf8_lossy(&line);
        (self.handler)(line.trim_end_matches(['\r', '\n']));
        Ok(())
    }
}
