// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Executable presence discovery.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{PolledDiscovery, ResourceDiscovery};
use crate::resource::{ResourceEvent, ResourceKey};

/// Reports an executable as available while the file exists.
#[derive(Debug)]
pub struct ProcessDiscovery {
    program: PathBuf,
    polled: PolledDiscovery<PathBuf>,
}

impl ProcessDiscovery {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            polled: PolledDiscovery::new(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl ResourceDiscovery for ProcessDiscovery {
    type Descriptor = PathBuf;

    fn update(&mut self) -> Vec<ResourceEvent<PathBuf>> {
        let mut current = BTreeMap::new();
        if self.program.is_file() {
            current.insert(
                ResourceKey::new(self.program.to_string_lossy()),
                self.program.clone(),
            );
        }
        self.polled.reconcile(current)
    }
}
