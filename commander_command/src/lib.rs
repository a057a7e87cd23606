//! Command interpretation.
//!
//! Expands one logical command (`name`, axis group, parameters) into one
//! single-axis [`LowLevelCommand`](commander_common::envelope::LowLevelCommand)
//! per axis and posts each to the transport over the bus.
//!
//! - [`interpreter`] - `CommandInterpreter` and its error type
//! - [`expansion`] - Pre-processing stages run on every expansion (interlocks)
//! - [`bootstrap`] - Address table pushed to the marshaller at startup

pub mod bootstrap;
pub mod expansion;
pub mod interpreter;

pub use crate::bootstrap::{BOOTSTRAP_AXIS, BOOTSTRAP_COMMAND, bootstrap_params, send_bootstrap};
pub use crate::expansion::{ExpansionStage, PrefixInterlock};
pub use crate::interpreter::{CommandError, CommandInterpreter};
