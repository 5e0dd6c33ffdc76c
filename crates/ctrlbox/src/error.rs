// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types shared by connectors, maintained connections and the manager.
//!
//! Two classes matter to the lifecycle code:
//! - [`ConnectionError`] is transient. It is logged at debug level and the
//!   attempt is retried later according to the retry strategy.
//! - Everything else is unexpected for the resource that raised it. The
//!   resource is closed and its record dropped, other resources carry on.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::resource::ResourceKey;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A transient failure to establish a connection.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConnectionError {
    message: String,
    #[source]
    source: Option<io::Error>,
}

impl ConnectionError {
    /// Create a connection error with a message and no underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error caused by an I/O failure.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            message: format!("{}: {}", message.into(), source),
            source: Some(source),
        }
    }

    /// Human-readable description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Crate-wide error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(#[from] ConnectionError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("worker for {resource} did not stop within {timeout:?}")]
    StopTimeout {
        resource: ResourceKey,
        timeout: Duration,
    },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(io::Error),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// True for errors that are retried by policy rather than treated as fatal.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}
