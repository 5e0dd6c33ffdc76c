// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # ctrlbox - controller connection lifecycle
//!
//! Keeps connections to discovered controllers (serial devices, TCP servers,
//! local processes) open, retries them when they fail, and reports
//! connect/disconnect transitions to the owner's thread.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ctrlbox::{
//!     build_serial_discovery, DiscoveryFacade, LineProtocol, ManagedDiscovery, ManagerConfig,
//! };
//!
//! let sniffer = LineProtocol::sniffer(|line: &str| println!("{}", line));
//! let serial: Box<dyn ManagedDiscovery> = Box::new(build_serial_discovery(sniffer));
//! let mut facade = DiscoveryFacade::new(vec![serial], ManagerConfig::default());
//! facade.add_listener(|event| println!("{:?}", event));
//!
//! loop {
//!     facade.update();
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |  DiscoveryFacade::update()  (owner thread)                          |
//! +---------------------------------------------------------------------+
//! |  ConnectionDiscovery  x N   discovery + connector factory           |
//! +---------------------------------------------------------------------+
//! |  ConnectionManager          key -> ConnectionRecord, listeners      |
//! +---------------------------------------------------------------------+
//! |  ConnectionLoop (thread)  ->  MaintainedConnection  ->  Connector   |
//! |        retry wait               RetryStrategy          Transport    |
//! +---------------------------------------------------------------------+
//! |  EventAggregator            worker threads push, update() drains    |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`manager`] - resource registry and event dispatch (start here)
//! - [`connection`] - maintained connections and their workers
//! - [`connector`] - connector, protocol and transport traits
//! - [`discovery`] - discovery mechanisms and the manager bridge
//! - [`retry`] - retry strategies
//! - [`events`] - connection events and the aggregator

pub mod connection;
pub mod connector;
pub mod discovery;
pub mod error;
pub mod events;
pub mod facade;
pub mod manager;
pub mod resource;
pub mod retry;

pub use connection::{ConnectedCallback, ConnectionLoop, ConnectionRecord, MaintainedConnection};
pub use connector::{
    Conduit, Connector, DeviceTransport, LineProtocol, ProcessTransport, Protocol,
    ProtocolConnector, Sniffer, TcpTransport, Transport,
};
pub use discovery::{
    ConnectionDiscovery, ConnectorFactory, DeviceDiscovery, ManagedDiscovery, PolledDiscovery,
    ProcessDiscovery, ResourceDiscovery, TcpAnnouncer, TcpEndpoint, TcpServerDiscovery,
    DEFAULT_PREFIXES,
};
pub use error::{ConnectionError, Error, Result};
pub use events::{ConnectionEvent, EventAggregator, EventSink};
pub use facade::{
    build_device_discovery, build_process_discovery, build_serial_discovery,
    build_tcp_server_discovery, DiscoveryFacade,
};
pub use manager::{ConnectionManager, DriveMode, ManagerConfig, RetryPolicy};
pub use resource::{ResourceEvent, ResourceKey};
pub use retry::{BackoffRetryStrategy, PeriodRetryStrategy, RetryStrategy};
