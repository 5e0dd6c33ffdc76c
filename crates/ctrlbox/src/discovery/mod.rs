// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resource discovery and its bridge to the connection manager.
//!
//! A [`ResourceDiscovery`] is polled with `update()` and returns the
//! availability changes it buffered since the last poll. A
//! [`ConnectionDiscovery`] turns those changes into manager calls, building a
//! connector for each available resource through a factory.
//!
//! ```text
//! discovery.update() ──► Available{key, descriptor} ──► factory(descriptor)
//!                                                        │ Some(connector)
//!                                                        ▼
//!                                            manager.available(key, connector)
//!                   ──► Unavailable{key} ──────► manager.unavailable(key)
//! ```

mod device;
mod process;
mod tcp;

pub use device::{DeviceDiscovery, DEFAULT_PREFIXES};
pub use process::ProcessDiscovery;
pub use tcp::{qualify_service_type, TcpAnnouncer, TcpEndpoint, TcpServerDiscovery};

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::connector::Connector;
use crate::manager::ConnectionManager;
use crate::resource::{ResourceEvent, ResourceKey};

/// Source of availability events, polled from the owning thread.
pub trait ResourceDiscovery: Send {
    /// Information handed to the connector factory.
    type Descriptor;

    /// Poll once and return the events produced since the previous call,
    /// oldest first.
    fn update(&mut self) -> Vec<ResourceEvent<Self::Descriptor>>;
}

/// Turns successive full listings into availability changes.
///
/// Removed or changed resources are reported unavailable first, then new or
/// changed ones available. Output is ordered by key.
#[derive(Debug, Clone)]
pub struct PolledDiscovery<D> {
    known: BTreeMap<ResourceKey, D>,
}

impl<D: Clone + PartialEq> PolledDiscovery<D> {
    pub fn new() -> Self {
        Self {
            known: BTreeMap::new(),
        }
    }

    pub fn known(&self) -> &BTreeMap<ResourceKey, D> {
        &self.known
    }

    /// Replace the known listing with `current` and return the differences.
    pub fn reconcile(&mut self, current: BTreeMap<ResourceKey, D>) -> Vec<ResourceEvent<D>> {
        let mut events = Vec::new();
        for (key, old) in &self.known {
            if current.get(key) != Some(old) {
                events.push(ResourceEvent::Unavailable { key: key.clone() });
            }
        }
        for (key, descriptor) in &current {
            if self.known.get(key) != Some(descriptor) {
                events.push(ResourceEvent::Available {
                    key: key.clone(),
                    descriptor: descriptor.clone(),
                });
            }
        }
        self.known = current;
        events
    }
}

impl<D: Clone + PartialEq> Default for PolledDiscovery<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a connector for a discovered resource. `None` vetoes the resource
/// (for example when its details cannot be resolved yet).
pub type ConnectorFactory<T> = Box<dyn Fn(&T) -> Option<Arc<dyn Connector>> + Send>;

/// A discovery that can be attached to a manager and polled; the
/// object-safe face of [`ConnectionDiscovery`].
pub trait ManagedDiscovery: Send {
    fn attach(&mut self, manager: Arc<ConnectionManager>);

    fn detach(&mut self);

    /// Poll the underlying discovery and forward its events.
    fn update(&mut self);
}

/// Bridges one [`ResourceDiscovery`] to a [`ConnectionManager`].
pub struct ConnectionDiscovery<D: ResourceDiscovery> {
    discovery: D,
    factory: ConnectorFactory<D::Descriptor>,
    manager: Option<Arc<ConnectionManager>>,
}

impl<D: ResourceDiscovery> ConnectionDiscovery<D> {
    /// Create an unattached bridge. Events are dropped until a manager is
    /// attached.
    pub fn new(discovery: D, factory: ConnectorFactory<D::Descriptor>) -> Self {
        Self {
            discovery,
            factory,
            manager: None,
        }
    }

    pub fn with_manager(mut self, manager: Arc<ConnectionManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    pub fn discovery_mut(&mut self) -> &mut D {
        &mut self.discovery
    }

    pub fn manager(&self) -> Option<&Arc<ConnectionManager>> {
        self.manager.as_ref()
    }

    /// Route one availability event to the manager.
    pub fn resource_event(&self, event: ResourceEvent<D::Descriptor>) {
        let Some(manager) = &self.manager else {
            return;
        };
        match event {
            ResourceEvent::Available { key, descriptor } => match (self.factory)(&descriptor) {
                Some(connector) => manager.available(key, connector),
                None => log::debug!("[DISCOVERY] no connector for {}, ignored", key),
            },
            ResourceEvent::Unavailable { key } => manager.unavailable(&key),
        }
    }
}

impl<D: ResourceDiscovery> ManagedDiscovery for ConnectionDiscovery<D> {
    fn attach(&mut self, manager: Arc<ConnectionManager>) {
        self.manager = Some(manager);
    }

    fn detach(&mut self) {
        self.manager = None;
    }

    fn update(&mut self) {
        for event in self.discovery.update() {
            self.resource_event(event);
        }
    }
}
