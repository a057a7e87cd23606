//! Addressed message units routed by the [`MessageBus`](crate::bus::MessageBus).
//!
//! An [`Envelope`] is immutable once built: it carries a destination id,
//! a return address and an opaque [`Payload`]. The only payload the
//! transport understands is a [`LowLevelCommand`], which travels on the
//! wire as the JSON array `[name, axis, params, blocking]`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bus::BusError;
use crate::component::ComponentKeyword;

/// Identifier a component registers under on the bus.
///
/// Cheap to clone; never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Arc<str>);

impl SubscriberId {
    /// Create an id, rejecting empty or whitespace-only strings.
    pub fn new(id: impl AsRef<str>) -> Result<Self, BusError> {
        let id = id.as_ref();
        if id.trim().is_empty() {
            return Err(BusError::InvalidSubscriberId);
        }
        Ok(Self(Arc::from(id)))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SubscriberId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single-axis, fully parameterised command for the marshaller.
///
/// Serialises as a 4-element JSON array so the firmware can destructure it
/// positionally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CommandTuple", into = "CommandTuple")]
pub struct LowLevelCommand {
    /// Catalog name of the command.
    pub name: String,
    /// Target component.
    pub axis: ComponentKeyword,
    /// Parameter values, passed through verbatim.
    pub params: Vec<String>,
    /// Whether the controller should acknowledge before taking the next command.
    pub blocking: bool,
}

#[derive(Serialize, Deserialize)]
struct CommandTuple(String, ComponentKeyword, Vec<String>, bool);

impl From<CommandTuple> for LowLevelCommand {
    fn from(CommandTuple(name, axis, params, blocking): CommandTuple) -> Self {
        Self {
            name,
            axis,
            params,
            blocking,
        }
    }
}

impl From<LowLevelCommand> for CommandTuple {
    fn from(cmd: LowLevelCommand) -> Self {
        CommandTuple(cmd.name, cmd.axis, cmd.params, cmd.blocking)
    }
}

impl LowLevelCommand {
    /// Build a command.
    pub fn new(
        name: impl Into<String>,
        axis: ComponentKeyword,
        params: Vec<String>,
        blocking: bool,
    ) -> Self {
        Self {
            name: name.into(),
            axis,
            params,
            blocking,
        }
    }
}

impl fmt::Display for LowLevelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}> to {} with {:?} (blocking={})",
            self.name, self.axis, self.params, self.blocking
        )
    }
}

/// Envelope content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Command destined for the marshaller.
    Command(LowLevelCommand),
    /// Free-form text (status, inbound frames).
    Text(String),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(cmd) => write!(f, "{cmd}"),
            Self::Text(text) => write!(f, "{text:?}"),
        }
    }
}

impl From<LowLevelCommand> for Payload {
    fn from(cmd: LowLevelCommand) -> Self {
        Self::Command(cmd)
    }
}

/// Immutable addressed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    destination: SubscriberId,
    source: SubscriberId,
    content: Payload,
}

impl Envelope {
    /// Seal a new envelope.
    pub fn new(destination: SubscriberId, source: SubscriberId, content: impl Into<Payload>) -> Self {
        Self {
            destination,
            source,
            content: content.into(),
        }
    }

    /// Recipient id.
    pub fn destination(&self) -> &SubscriberId {
        &self.destination
    }

    /// Return address.
    pub fn source(&self) -> &SubscriberId {
        &self.source
    }

    /// Payload.
    pub fn content(&self) -> &Payload {
        &self.content
    }

    /// Consume the envelope, keeping only its payload.
    pub fn into_content(self) -> Payload {
        self.content
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "To: {}, from: {}, content: {}",
            self.destination, self.source, self.content
        )
    }
}
