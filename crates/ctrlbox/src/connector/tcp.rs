// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP client transport.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::{Conduit, Transport};
use crate::error::{ConnectionError, Result};

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to `host:port`.
///
/// The stream is kept so that [`Transport::close`] can shut the socket down
/// and wake a reader blocked on the other half.
#[derive(Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
            stream: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound each blocking read so the connected loop regains control
    /// periodically.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ConnectionError::io(format!("resolve {}", self.describe()), e))?
            .collect();
        if addrs.is_empty() {
            return Err(ConnectionError::new(format!("{}: no addresses", self.describe())).into());
        }
        Ok(addrs)
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Result<Conduit> {
        self.close();

        let mut last_err = None;
        let mut connected = None;
        for addr in self.resolve()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let stream = match connected {
            Some(s) => s,
            None => {
                let e = last_err
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no address"));
                return Err(ConnectionError::io(format!("connect {}", self.describe()), e).into());
            }
        };

        let _ = stream.set_nodelay(true);
        let describe = self.describe();
        let setup_err = |e: io::Error| ConnectionError::io(format!("configure {}", describe), e);
        stream.set_read_timeout(self.read_timeout).map_err(setup_err)?;
        let input = stream.try_clone().map_err(setup_err)?;
        let output = stream.try_clone().map_err(setup_err)?;
        self.stream = Some(stream);
        log::debug!("[TCP] connected to {}", self.describe());
        Ok(Conduit::new(input, output))
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            // NotConnected when the peer already went away
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}
