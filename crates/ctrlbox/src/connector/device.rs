// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Character-device transport (serial ports, USB CDC devices, FIFOs).
//!
//! Line settings are left as configured by the OS; this transport only opens
//! the node for reading and writing. Closing drops the handles but cannot
//! interrupt a read already blocked inside the kernel.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use super::{Conduit, Transport};
use crate::error::{ConnectionError, Result};

#[derive(Debug)]
pub struct DeviceTransport {
    path: PathBuf,
    file: Option<File>,
}

impl DeviceTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for DeviceTransport {
    fn open(&mut self) -> Result<Conduit> {
        self.close();
        let describe = self.describe();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| ConnectionError::io(format!("open {}", describe), e))?;
        let input = file
            .try_clone()
            .map_err(|e| ConnectionError::io(format!("duplicate {}", describe), e))?;
        let output = file
            .try_clone()
            .map_err(|e| ConnectionError::io(format!("duplicate {}", describe), e))?;
        self.file = Some(file);
        Ok(Conduit::new(input, output))
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn is_available(&self) -> bool {
        self.path.exists()
    }

    fn describe(&self) -> String {
        format!("device://{}", self.path.display())
    }
}
