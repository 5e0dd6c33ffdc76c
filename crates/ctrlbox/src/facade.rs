// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One entry point over several discoveries sharing a manager.
//!
//! ```text
//!   serial ─┐
//!   tcp    ─┼─► ConnectionManager (controller) ──► listeners
//!   process┘          ▲
//!                     └── facade.update(): poll discoveries, then drain events
//! ```
//!
//! The `build_*` helpers pair each discovery with a connector factory that
//! wraps the discovered resource in a [`ProtocolConnector`] over the matching
//! transport.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::connector::{
    Connector, DeviceTransport, ProcessTransport, ProtocolConnector, Sniffer, TcpTransport,
};
use crate::discovery::{
    ConnectionDiscovery, ConnectorFactory, DeviceDiscovery, ManagedDiscovery, ProcessDiscovery,
    TcpEndpoint, TcpServerDiscovery,
};
use crate::events::ConnectionEvent;
use crate::manager::{ConnectionManager, DriveMode, ManagerConfig};

/// Polls a set of discoveries and the manager they feed.
pub struct DiscoveryFacade {
    manager: Arc<ConnectionManager>,
    discoveries: Vec<Box<dyn ManagedDiscovery>>,
}

impl DiscoveryFacade {
    /// Create a controller manager from `config` and attach it to every
    /// discovery.
    pub fn new(discoveries: Vec<Box<dyn ManagedDiscovery>>, config: ManagerConfig) -> Self {
        Self::with_manager(discoveries, Arc::new(ConnectionManager::controller(config)))
    }

    /// Attach an existing manager to every discovery.
    pub fn with_manager(
        mut discoveries: Vec<Box<dyn ManagedDiscovery>>,
        manager: Arc<ConnectionManager>,
    ) -> Self {
        for discovery in &mut discoveries {
            discovery.attach(Arc::clone(&manager));
        }
        log::debug!(
            "[DISCOVERY] facade over {} discoveries",
            discoveries.len()
        );
        Self {
            manager,
            discoveries,
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn add_listener<F>(&self, listener: F)
    where
        F: FnMut(&ConnectionEvent) + Send + 'static,
    {
        self.manager.add_listener(listener);
    }

    /// Poll every discovery once, then let the manager deliver its events.
    /// With [`DriveMode::External`] the connections are maintained here too.
    ///
    /// Returns the number of events delivered.
    pub fn update(&mut self) -> usize {
        for discovery in &mut self.discoveries {
            discovery.update();
        }
        if self.manager.config().drive == DriveMode::External {
            self.manager.maintain(Instant::now());
        }
        self.manager.update()
    }
}

impl Drop for DiscoveryFacade {
    fn drop(&mut self) {
        for discovery in &mut self.discoveries {
            discovery.detach();
        }
        self.manager.shutdown();
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Serial controllers on the default device prefixes under `/dev`.
pub fn build_serial_discovery(sniffer: Sniffer) -> ConnectionDiscovery<DeviceDiscovery> {
    build_device_discovery(sniffer, DeviceDiscovery::default())
}

/// Serial controllers found by `discovery`.
pub fn build_device_discovery(
    sniffer: Sniffer,
    discovery: DeviceDiscovery,
) -> ConnectionDiscovery<DeviceDiscovery> {
    let factory: ConnectorFactory<PathBuf> = Box::new(move |path: &PathBuf| {
        let connector: Arc<dyn Connector> = Arc::new(ProtocolConnector::new(
            DeviceTransport::new(path.clone()),
            Arc::clone(&sniffer),
        ));
        Some(connector)
    });
    ConnectionDiscovery::new(discovery, factory)
}

/// TCP controllers of `service_type`, starting from `known_addresses`.
/// More servers can be announced through the discovery's
/// [`TcpServerDiscovery::announcer`].
pub fn build_tcp_server_discovery(
    sniffer: Sniffer,
    service_type: &str,
    known_addresses: Vec<TcpEndpoint>,
) -> ConnectionDiscovery<TcpServerDiscovery> {
    let factory: ConnectorFactory<TcpEndpoint> = Box::new(move |endpoint: &TcpEndpoint| {
        if endpoint.hostname.is_empty() || endpoint.port == 0 {
            // announced before its address was resolved
            return None;
        }
        let connector: Arc<dyn Connector> = Arc::new(ProtocolConnector::new(
            TcpTransport::new(endpoint.hostname.clone(), endpoint.port),
            Arc::clone(&sniffer),
        ));
        Some(connector)
    });
    ConnectionDiscovery::new(
        TcpServerDiscovery::new(service_type, known_addresses),
        factory,
    )
}

/// A controller running as a local process, started from `file` while the
/// file exists.
pub fn build_process_discovery(
    sniffer: Sniffer,
    file: impl Into<PathBuf>,
    args: Vec<String>,
    cwd: Option<PathBuf>,
) -> ConnectionDiscovery<ProcessDiscovery> {
    let factory: ConnectorFactory<PathBuf> = Box::new(move |path: &PathBuf| {
        let mut transport = ProcessTransport::new(path.clone()).with_args(args.iter().cloned());
        if let Some(cwd) = &cwd {
            transport = transport.with_cwd(cwd.clone());
        }
        let connector: Arc<dyn Connector> =
            Arc::new(ProtocolConnector::new(transport, Arc::clone(&sniffer)));
        Some(connector)
    });
    ConnectionDiscovery::new(ProcessDiscovery::new(file), factory)
}
