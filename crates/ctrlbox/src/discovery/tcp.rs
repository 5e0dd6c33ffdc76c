// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP server discovery.
//!
//! Servers come from two places: a fixed list of known endpoints, reported
//! on the first poll, and announcements pushed through a [`TcpAnnouncer`]
//! by a service browser (mDNS or similar) running on another thread.
//! Announcements are buffered and reported on the next `update()`.

use std::fmt;

use crossbeam::channel::{unbounded, Receiver, Sender};

use super::ResourceDiscovery;
use crate::resource::{ResourceEvent, ResourceKey};

/// Fully qualified service type for a subtype: `_<subtype>._tcp.local.`
///
/// The domain is the plain mDNS `local.` label; an underscored `_local.`
/// is not produced and would not match DNS-SD browsers.
pub fn qualify_service_type(subtype: &str) -> String {
    format!("_{}._tcp.local.", subtype)
}

/// Address of a TCP server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TcpEndpoint {
    pub hostname: String,
    pub port: u16,
}

impl TcpEndpoint {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// Resource key: `host:port`.
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.to_string())
    }
}

impl fmt::Display for TcpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

#[derive(Debug)]
enum Announcement {
    Added(TcpEndpoint),
    Removed(TcpEndpoint),
}

/// Cloneable handle for reporting servers from any thread.
#[derive(Debug, Clone)]
pub struct TcpAnnouncer {
    tx: Sender<Announcement>,
}

impl TcpAnnouncer {
    pub fn add(&self, endpoint: TcpEndpoint) {
        // the discovery side may already be gone
        let _ = self.tx.send(Announcement::Added(endpoint));
    }

    pub fn remove(&self, endpoint: TcpEndpoint) {
        let _ = self.tx.send(Announcement::Removed(endpoint));
    }
}

/// Discovery of TCP servers of one service type.
#[derive(Debug)]
pub struct TcpServerDiscovery {
    service_type: String,
    known: Vec<TcpEndpoint>,
    seeded: bool,
    tx: Sender<Announcement>,
    rx: Receiver<Announcement>,
}

impl TcpServerDiscovery {
    /// `service_type` is the bare subtype (e.g. `ctrlbox`); `known` servers
    /// are reported available on the first poll.
    pub fn new(service_type: &str, known: Vec<TcpEndpoint>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            service_type: qualify_service_type(service_type),
            known,
            seeded: false,
            tx,
            rx,
        }
    }

    /// Qualified service type this discovery browses for.
    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn known(&self) -> &[TcpEndpoint] {
        &self.known
    }

    pub fn announcer(&self) -> TcpAnnouncer {
        TcpAnnouncer {
            tx: self.tx.clone(),
        }
    }
}

impl ResourceDiscovery for TcpServerDiscovery {
    type Descriptor = TcpEndpoint;

    fn update(&mut self) -> Vec<ResourceEvent<TcpEndpoint>> {
        let mut events = Vec::new();
        if !self.seeded {
            self.seeded = true;
            events.extend(self.known.iter().map(|endpoint| ResourceEvent::Available {
                key: endpoint.key(),
                descriptor: endpoint.clone(),
            }));
        }

        for announcement in self.rx.try_iter() {
            match announcement {
                Announcement::Added(endpoint) => {
                    log::info!(
                        "[DISCOVERY] {} server found at {}",
                        self.service_type,
                        endpoint
                    );
                    events.push(ResourceEvent::Available {
                        key: endpoint.key(),
                        descriptor: endpoint,
                    });
                }
                Announcement::Removed(endpoint) => {
                    log::info!("[DISCOVERY] {} server gone: {}", self.service_type, endpoint);
                    events.push(ResourceEvent::Unavailable {
                        key: endpoint.key(),
                    });
                }
            }
        }
        events
    }
}
