//! # Commander Link Library
//!
//! Serial transport worker with pluggable link drivers.
//!
//! The transport owns the single physical link to the marshaller. It is
//! registered on the message bus under a fixed id, queues every command
//! envelope it receives, and drains that queue from a dedicated thread,
//! spacing physical writes by the minimum interval the marshaller needs.
//!
//! # Module Structure
//!
//! - [`link`] - `Link` trait, link settings and error types
//! - [`links`] - Link implementations (serial port, in-memory)
//! - [`registry`] - Named link factories
//! - [`framing`] - Wire encoding and inbound frame assembly
//! - [`transport`] - Transport worker state machine and run loop
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         commander_link                           │
//! │  ┌─────────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │ MessageBus  │───►│ bounded queue│───►│  worker thread      │  │
//! │  │ (handler)   │    │ (crossbeam)  │    │  rate-limited write │  │
//! │  └─────────────┘    └──────────────┘    └──────────┬──────────┘  │
//! │                                                    ▼             │
//! │                                           ┌────────────────┐     │
//! │                                           │  Link          │     │
//! │                                           │  (trait object)│     │
//! │                                           └────────────────┘     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod framing;
pub mod link;
pub mod links;
pub mod registry;
pub mod transport;

pub use crate::link::{Link, LinkError, LinkSettings};
pub use crate::registry::LinkRegistry;
pub use crate::transport::{
    ForwardToBus, InboundSink, LinkState, LogInbound, SerialTransport, StatsSnapshot,
    TransportConfig, TransportError,
};
