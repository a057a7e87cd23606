//! Link implementations.
//!
//! - [`serial`] - Physical serial port (115200 8N1)
//! - [`memory`] - In-memory link for simulation and tests
//!
//! # Adding New Links
//!
//! 1. Create a new submodule under `links/`
//! 2. Implement the `Link` trait from [`crate::link`]
//! 3. Register its factory in [`register_builtin_links`]

pub mod memory;
pub mod serial;

pub use memory::{MemoryLink, WriteRecord};
pub use serial::SerialLink;

use crate::link::LinkError;
use crate::registry::LinkRegistry;

/// Register all built-in links.
pub fn register_builtin_links(registry: &mut LinkRegistry) -> Result<(), LinkError> {
    registry.register("serial", serial::open_link)?;
    registry.register("memory", memory::open_link)
}
