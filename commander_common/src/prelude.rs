//! Prelude module for common re-exports.
//!
//! ```rust
//! use commander_common::prelude::*;
//! ```

// ─── Messaging ──────────────────────────────────────────────────────
pub use crate::bus::{BusError, Deliver, MessageBus};
pub use crate::envelope::{Envelope, LowLevelCommand, Payload, SubscriberId};

// ─── Commands ───────────────────────────────────────────────────────
pub use crate::catalog::{CatalogCell, CatalogError, CatalogKind, CommandCatalog, CommandDefinition};
pub use crate::component::{ComponentDirectory, ComponentKeyword, JsonComponentStore};

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{Backpressure, CommanderConfig, ConfigError, ConfigLoader, LogLevel};

// ─── Fixed ids ──────────────────────────────────────────────────────
pub use crate::consts::{COMMANDER_ID, INTERPRETER_ID, TRANSPORT_ID};
