// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Serial device discovery by directory scan.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{PolledDiscovery, ResourceDiscovery};
use crate::resource::{ResourceEvent, ResourceKey};

/// Device name prefixes scanned by default (USB CDC-ACM and USB serial).
pub const DEFAULT_PREFIXES: &[&str] = &["ttyACM", "ttyUSB"];

/// Reports device nodes in a directory whose name starts with one of the
/// configured prefixes. The key and descriptor are both the node path.
#[derive(Debug)]
pub struct DeviceDiscovery {
    dir: PathBuf,
    prefixes: Vec<String>,
    polled: PolledDiscovery<PathBuf>,
}

impl DeviceDiscovery {
    pub fn new(dir: impl Into<PathBuf>, prefixes: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            prefixes,
            polled: PolledDiscovery::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    fn scan(&self) -> BTreeMap<ResourceKey, PathBuf> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!("[DISCOVERY] cannot scan {}: {}", self.dir.display(), e);
                return BTreeMap::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
            })
            .map(|entry| {
                let path = entry.path();
                (ResourceKey::new(path.to_string_lossy()), path)
            })
            .collect()
    }
}

impl Default for DeviceDiscovery {
    fn default() -> Self {
        Self::new(
            "/dev",
            DEFAULT_PREFIXES.iter().map(|p| p.to_string()).collect(),
        )
    }
}

impl ResourceDiscovery for DeviceDiscovery {
    type Descriptor = PathBuf;

    fn update(&mut self) -> Vec<ResourceEvent<PathBuf>> {
        let current = self.scan();
        let events = self.polled.reconcile(current);
        for event in &events {
            match event {
                ResourceEvent::Available { key, .. } => {
                    log::info!("[DISCOVERY] device available: {}", key)
                }
                ResourceEvent::Unavailable { key } => {
                    log::info!("[DISCOVERY] device unavailable: {}", key)
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"").expect("create node");
        path
    }

    #[test]
    fn test_matches_prefixes_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let acm = touch(dir.path(), "ttyACM0");
        let usb = touch(dir.path(), "ttyUSB3");
        touch(dir.path(), "ttyS0");
        touch(dir.path(), "null");

        let mut sut = DeviceDiscovery::new(
            dir.path(),
            DEFAULT_PREFIXES.iter().map(|p| p.to_string()).collect(),
        );
        let events = sut.update();
        let mut keys: Vec<_> = events.iter().map(|e| e.key().to_string()).collect();
        keys.sort();
        let mut expected = vec![
            acm.to_string_lossy().into_owned(),
            usb.to_string_lossy().into_owned(),
        ];
        expected.sort();
        assert_eq!(keys, expected);

        assert!(sut.update().is_empty());
    }

    #[test]
    fn test_unplug_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let acm = touch(dir.path(), "ttyACM0");
        let mut sut = DeviceDiscovery::new(dir.path(), vec!["ttyACM".into()]);
        assert_eq!(sut.update().len(), 1);

        fs::remove_file(&acm).expect("unplug");
        assert_eq!(
            sut.update(),
            vec![ResourceEvent::Unavailable {
                key: ResourceKey::new(acm.to_string_lossy())
            }]
        );
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sut = DeviceDiscovery::new(dir.path().join("absent"), vec!["tty".into()]);
        assert!(sut.update().is_empty());
    }
}
