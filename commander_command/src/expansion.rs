//! Expansion stages.
//!
//! A stage sees every expansion after the per-axis split and may insert,
//! reorder or drop commands before anything is posted. Stages never touch
//! the bus or the transport.

use std::collections::HashSet;

use commander_common::catalog::CommandDefinition;
use commander_common::config::InterlockSection;
use commander_common::envelope::LowLevelCommand;
use tracing::debug;

/// Pre-processing applied to the per-axis commands of one `send`.
pub trait ExpansionStage: Send + Sync {
    /// Stage name for logs.
    fn name(&self) -> &str;

    /// Rewrite `commands`, the expansion of `definition`.
    fn expand(
        &self,
        definition: &CommandDefinition,
        commands: Vec<LowLevelCommand>,
    ) -> Vec<LowLevelCommand>;
}

/// Inserts a fixed command sequence ahead of guarded commands.
///
/// Typical use: raise Z before any horizontal move.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixInterlock {
    guarded: HashSet<String>,
    prefix: Vec<LowLevelCommand>,
}

impl PrefixInterlock {
    /// Build from explicit parts.
    pub fn new<I, S>(guarded: I, prefix: Vec<LowLevelCommand>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            guarded: guarded.into_iter().map(Into::into).collect(),
            prefix,
        }
    }

    /// Build from the `[interlock]` config section.
    pub fn from_section(section: &InterlockSection) -> Self {
        let prefix = section
            .prefix
            .iter()
            .map(|step| {
                LowLevelCommand::new(&step.name, step.axis, step.params.clone(), step.blocking)
            })
            .collect();
        Self::new(section.guarded.iter().cloned(), prefix)
    }

    /// True when the stage would never insert anything.
    pub fn is_empty(&self) -> bool {
        self.guarded.is_empty() || self.prefix.is_empty()
    }
}

impl ExpansionStage for PrefixInterlock {
    fn name(&self) -> &str {
        "prefix-interlock"
    }

    fn expand(
        &self,
        definition: &CommandDefinition,
        commands: Vec<LowLevelCommand>,
    ) -> Vec<LowLevelCommand> {
        if self.prefix.is_empty() || !self.guarded.contains(&definition.name) {
            return commands;
        }
        debug!(
            "Interlock: {} command(s) ahead of '{}'",
            self.prefix.len(),
            definition.name
        );
        self.prefix.iter().cloned().chain(commands).collect()
    }
}
