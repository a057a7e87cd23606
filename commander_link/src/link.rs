//! Link trait and error types.
//!
//! A [`Link`] is the byte pipe the transport worker drives. The serial
//! port is the production implementation; the in-memory link stands in
//! for it in simulation and tests.
//!
//! # Lifecycle
//!
//! 1. Opened by a factory from the [`LinkRegistry`](crate::registry::LinkRegistry)
//! 2. `clear_input()` once the line has settled
//! 3. `bytes_to_read()` / `read()` / `write_all()` from the worker loop
//! 4. `close()` exactly once by the worker on exit

use std::time::Duration;

use commander_common::consts::{DEFAULT_DEVICE, READ_TIMEOUT};
use thiserror::Error;

/// Error types for link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The device could not be opened.
    #[error("Failed to open link {device}: {reason}")]
    Open {
        /// Device path.
        device: String,
        /// Driver-reported reason.
        reason: String,
    },

    /// I/O failure on an open link.
    #[error("Link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation on a link that was already closed.
    #[error("Link is closed")]
    Closed,

    /// No factory registered under this name.
    #[error("Link driver not found: {0}")]
    UnknownLink(String),

    /// A factory is already registered under this name.
    #[error("Link driver already registered: {0}")]
    DuplicateLink(String),
}

/// Settings handed to a link factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    /// Device path.
    pub device: String,
    /// Per-read timeout.
    pub read_timeout: Duration,
}

impl LinkSettings {
    /// Settings for `device` with the standard read timeout.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            read_timeout: READ_TIMEOUT,
        }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE)
    }
}

/// Factory function type for opening links.
pub type LinkFactory = fn(&LinkSettings) -> Result<Box<dyn Link>, LinkError>;

/// Byte pipe to the marshaller.
pub trait Link: Send {
    /// Driver identifier (e.g. "serial", "memory").
    fn name(&self) -> &'static str;

    /// Bytes waiting to be read. Never blocks.
    fn bytes_to_read(&mut self) -> Result<usize, LinkError>;

    /// Read into `buf`, waiting at most the read timeout. `Ok(0)` means nothing arrived.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;

    /// Write all of `bytes`. No timeout.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Discard anything received so far.
    fn clear_input(&mut self) -> Result<(), LinkError>;

    /// Release the device. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), LinkError>;
}
