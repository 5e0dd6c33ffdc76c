// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resource identity and availability events.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Opaque identifier for a discovered resource.
///
/// Device paths, `host:port` pairs and executable paths all end up here.
/// Cloning is cheap (shared string).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(Arc<str>);

impl ResourceKey {
    /// Create a key from any string-like value.
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceKey({:?})", &*self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ResourceKey {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ResourceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Availability change reported by a discovery mechanism.
///
/// `D` is the discovery-specific descriptor handed to the connector factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent<D> {
    /// A resource appeared (or changed).
    Available { key: ResourceKey, descriptor: D },
    /// A resource went away.
    Unavailable { key: ResourceKey },
}

impl<D> ResourceEvent<D> {
    /// Key of the resource the event is about.
    pub fn key(&self) -> &ResourceKey {
        match self {
            ResourceEvent::Available { key, .. } | ResourceEvent::Unavailable { key } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_compare_by_value() {
        let a = ResourceKey::from("/dev/ttyUSB0");
        let b = ResourceKey::from(String::from("/dev/ttyUSB0"));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert_eq!(b.to_string(), "/dev/ttyUSB0");
    }

    #[test]
    fn test_event_key() {
        let ev: ResourceEvent<u16> = ResourceEvent::Available {
            key: "dev1".into(),
            descriptor: 7,
        };
        assert_eq!(ev.key().as_str(), "dev1");
        let ev: ResourceEvent<u16> = ResourceEvent::Unavailable { key: "dev1".into() };
        assert_eq!(ev.key().as_str(), "dev1");
    }
}
