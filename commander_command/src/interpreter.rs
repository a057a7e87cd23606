//! Command interpreter.
//!
//! Looks commands up in the shared catalog, splits the axis group on `&`,
//! builds one low-level command per axis carrying the full parameter list,
//! runs the configured expansion stages, and posts the result to the
//! transport in order.

use std::sync::Arc;

use commander_common::bus::{BusError, MessageBus};
use commander_common::catalog::{CatalogKind, CommandCatalog, CommandDefinition};
use commander_common::component::ComponentKeyword;
use commander_common::consts::{AXIS_SEPARATOR, INTERPRETER_ID, TRANSPORT_ID};
use commander_common::envelope::{Envelope, LowLevelCommand, SubscriberId};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::expansion::ExpansionStage;

/// Error types for command expansion and posting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The name is not in the catalog consulted.
    #[error("Unknown {kind} command '{name}'")]
    UnknownCommand {
        /// Catalog that was searched.
        kind: CatalogKind,
        /// Requested name.
        name: String,
    },

    /// The axis group is valid but not one the command applies to.
    #[error("Command '{name}' does not apply to axis group '{group}'")]
    AxisNotApplicable {
        /// Command name.
        name: String,
        /// Requested axis group.
        group: String,
    },

    /// An axis token is not a component keyword.
    #[error("Invalid axis '{token}'")]
    InvalidAxis {
        /// Offending token.
        token: String,
    },

    /// Posting to the bus failed.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Expands logical commands and posts them to the transport.
pub struct CommandInterpreter {
    bus: Arc<MessageBus>,
    catalog: Arc<CommandCatalog>,
    id: SubscriberId,
    transport: SubscriberId,
    stages: Vec<Box<dyn ExpansionStage>>,
}

impl CommandInterpreter {
    /// Create an interpreter and register its inbox on `bus`.
    pub fn new(bus: Arc<MessageBus>, catalog: Arc<CommandCatalog>) -> Result<Self, CommandError> {
        let id = SubscriberId::new(INTERPRETER_ID)?;
        let transport = SubscriberId::new(TRANSPORT_ID)?;

        bus.register(id.clone(), |envelope: Envelope| -> Result<(), BusError> {
            info!("{}", envelope);
            Ok(())
        });

        Ok(Self {
            bus,
            catalog,
            id,
            transport,
            stages: Vec::new(),
        })
    }

    /// Append an expansion stage. Stages run in the order they were added.
    pub fn with_stage(mut self, stage: impl ExpansionStage + 'static) -> Self {
        info!("Expansion stage '{}' enabled", stage.name());
        self.stages.push(Box::new(stage));
        self
    }

    /// Bus id the interpreter posts from.
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Catalog handle the interpreter resolves names against.
    pub fn catalog(&self) -> &Arc<CommandCatalog> {
        &self.catalog
    }

    /// Send a public command. Returns the number of envelopes posted.
    ///
    /// # Errors
    /// - [`CommandError::UnknownCommand`] if `name` is not a public command.
    /// - [`CommandError::InvalidAxis`] / [`CommandError::AxisNotApplicable`]
    ///   if `axis_group` is malformed or not one of the command's groups.
    /// - [`CommandError::Bus`] on the first failed post; envelopes already
    ///   posted are not recalled.
    pub fn send(
        &self,
        name: &str,
        axis_group: &str,
        params: &[String],
        blocking: bool,
    ) -> Result<usize, CommandError> {
        self.send_from(CatalogKind::Public, name, axis_group, params, blocking)
    }

    /// Send a system command from the private catalog.
    pub fn send_system(
        &self,
        name: &str,
        axis_group: &str,
        params: &[String],
        blocking: bool,
    ) -> Result<usize, CommandError> {
        self.send_from(CatalogKind::Private, name, axis_group, params, blocking)
    }

    fn send_from(
        &self,
        kind: CatalogKind,
        name: &str,
        axis_group: &str,
        params: &[String],
        blocking: bool,
    ) -> Result<usize, CommandError> {
        let commands = self.expand(kind, name, axis_group, params, blocking)?;
        let count = commands.len();
        for cmd in commands {
            debug!("Posting {}", cmd);
            self.bus
                .post(Envelope::new(self.transport.clone(), self.id.clone(), cmd))?;
        }
        Ok(count)
    }

    /// Expand without posting.
    pub fn expand(
        &self,
        kind: CatalogKind,
        name: &str,
        axis_group: &str,
        params: &[String],
        blocking: bool,
    ) -> Result<Vec<LowLevelCommand>, CommandError> {
        let definition = self
            .catalog
            .get(kind, name)
            .ok_or_else(|| CommandError::UnknownCommand {
                kind,
                name: name.to_string(),
            })?;

        let axes = split_axes(axis_group)?;
        if !definition.applies_to(axis_group) {
            return Err(CommandError::AxisNotApplicable {
                name: definition.name.clone(),
                group: axis_group.to_string(),
            });
        }
        if params.len() != definition.param_names.len() {
            warn!(
                "'{}' expects {:?}, got {} value(s)",
                definition.name,
                definition.param_names,
                params.len()
            );
        }

        let commands = axes
            .into_iter()
            .map(|axis| LowLevelCommand::new(&definition.name, axis, params.to_vec(), blocking))
            .collect();
        Ok(self.run_stages(definition, commands))
    }

    fn run_stages(
        &self,
        definition: &CommandDefinition,
        mut commands: Vec<LowLevelCommand>,
    ) -> Vec<LowLevelCommand> {
        for stage in &self.stages {
            commands = stage.expand(definition, commands);
        }
        commands
    }
}

/// Split an axis group on `&` into keywords, preserving order.
fn split_axes(group: &str) -> Result<Vec<ComponentKeyword>, CommandError> {
    group
        .split(AXIS_SEPARATOR)
        .map(|token| {
            let token = token.trim();
            token
                .parse::<ComponentKeyword>()
                .map_err(|_| CommandError::InvalidAxis {
                    token: token.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter() -> CommandInterpreter {
        let bus = Arc::new(MessageBus::new());
        let catalog = Arc::new(CommandCatalog::standard().unwrap());
        CommandInterpreter::new(bus, catalog).unwrap()
    }

    #[test]
    fn test_split_axes() {
        assert_eq!(
            split_axes("x & y").unwrap(),
            vec![ComponentKeyword::X, ComponentKeyword::Y]
        );
        assert_eq!(
            split_axes("x&&y"),
            Err(CommandError::InvalidAxis {
                token: String::new()
            })
        );
        assert!(matches!(split_axes("q"), Err(CommandError::InvalidAxis { .. })));
    }

    #[test]
    fn test_expand_multi_axis_shares_params() {
        let interp = interpreter();
        let params = vec!["10".to_string(), "20".to_string()];
        let cmds = interp
            .expand(CatalogKind::Public, "to_point", "x&y", &params, true)
            .unwrap();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].axis, ComponentKeyword::X);
        assert_eq!(cmds[1].axis, ComponentKeyword::Y);
        assert!(cmds.iter().all(|c| c.params == params && c.name == "to_point"));
    }

    #[test]
    fn test_expand_rejects_wrong_group() {
        let interp = interpreter();
        let err = interp
            .expand(CatalogKind::Public, "z_up", "x", &[], true)
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::AxisNotApplicable {
                name: "z_up".to_string(),
                group: "x".to_string()
            }
        );
    }

    #[test]
    fn test_private_command_not_public() {
        let interp = interpreter();
        let err = interp
            .expand(CatalogKind::Public, "set_axis_mac_ids", "m", &[], false)
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::UnknownCommand {
                kind: CatalogKind::Public,
                ..
            }
        ));
        assert!(
            interp
                .expand(CatalogKind::Private, "set_axis_mac_ids", "m", &[], false)
                .is_ok()
        );
    }

    #[test]
    fn test_inbox_registered() {
        let interp = interpreter();
        assert!(interp.bus.is_registered(interp.id()));
    }
}
