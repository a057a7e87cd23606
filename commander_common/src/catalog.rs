//! Command catalogs.
//!
//! Two immutable tables describe every command the marshaller accepts:
//! the public catalog offered to the operator, and the private catalog
//! used by the system itself (e.g. pushing the address table). Each entry
//! names the axis groups it applies to, its parameter names, and whether
//! the controller should treat it as blocking.
//!
//! Tables are written as compact strings (see [`CommandEntry`]) and
//! parsed once by [`CommandCatalog::from_tables`]. A malformed entry is a
//! configuration error and fails the whole build.
//!
//! The composition root owns a [`CatalogCell`]; every component receives
//! an `Arc<CommandCatalog>` handle from it instead of reaching for a
//! global.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;

use crate::component::ComponentKeyword;
use crate::consts::AXIS_SEPARATOR;

/// Raw catalog row.
///
/// `axes` lists the applicable axis groups separated by `,`; a group that
/// fans out to several axes joins them with `&` (`"x&y"`). `params` is a
/// `,`-separated list of parameter names, or `""` for none.
#[derive(Debug, Clone, Copy)]
pub struct CommandEntry {
    /// Unique command name.
    pub name: &'static str,
    /// Applicable axis groups.
    pub axes: &'static str,
    /// Parameter names.
    pub params: &'static str,
    /// Blocking hint for the controller.
    pub blocking: bool,
}

const fn entry(name: &'static str, axes: &'static str, params: &'static str, blocking: bool) -> CommandEntry {
    CommandEntry {
        name,
        axes,
        params,
        blocking,
    }
}

/// Commands offered to the operator.
pub const PUBLIC_COMMANDS: &[CommandEntry] = &[
    entry("get_axis_name", "x,y,z,t", "", true),
    // move_rel: negative distance moves backwards
    entry("move_rel", "x,y", "distance", true),
    entry("move_abs", "x,y", "location", true),
    entry("z_down", "z", "", true),
    entry("z_up", "z", "", true),
    entry("to_point", "x&y", "x_location,y_location", true),
    entry("set_inc", "x&y", "distance", true),
    entry("inc_left", "x", "", true),
    entry("inc_right", "x", "", true),
    entry("inc_away", "y", "", true),
    entry("inc_towards", "y", "", true),
];

/// Commands only the system issues.
pub const PRIVATE_COMMANDS: &[CommandEntry] = &[entry("set_axis_mac_ids", "m", "mac_ids", false)];

/// Which table a lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
    /// Operator-facing commands.
    Public,
    /// System-only commands.
    Private,
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
        }
    }
}

/// Catalog build errors. All of them are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Entry has an empty name.
    #[error("{kind} catalog entry #{index} has an empty name")]
    EmptyName {
        /// Table the entry belongs to.
        kind: CatalogKind,
        /// Row index.
        index: usize,
    },

    /// Entry has no axis group, or an empty group between separators.
    #[error("command '{name}' has an empty axis group")]
    EmptyAxisGroup {
        /// Command name.
        name: String,
    },

    /// Axis token is not a component keyword.
    #[error("command '{name}' names unknown axis '{token}'")]
    InvalidAxis {
        /// Command name.
        name: String,
        /// Offending token.
        token: String,
    },

    /// Parameter list contains an empty name.
    #[error("command '{name}' has an empty parameter name")]
    EmptyParameter {
        /// Command name.
        name: String,
    },

    /// Two entries in one table share a name.
    #[error("duplicate command '{name}' in {kind} catalog")]
    DuplicateName {
        /// Table with the duplicate.
        kind: CatalogKind,
        /// Command name.
        name: String,
    },
}

/// Parsed, validated command definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDefinition {
    /// Unique command name.
    pub name: String,
    /// Canonical axis groups (`"x"`, `"x&y"`), in table order.
    pub axis_groups: Vec<String>,
    /// Parameter names, possibly empty.
    pub param_names: Vec<String>,
    /// Blocking hint for the controller.
    pub blocking: bool,
}

impl CommandDefinition {
    fn parse(kind: CatalogKind, index: usize, raw: &CommandEntry) -> Result<Self, CatalogError> {
        let name = raw.name.trim();
        if name.is_empty() {
            return Err(CatalogError::EmptyName { kind, index });
        }

        if raw.axes.trim().is_empty() {
            return Err(CatalogError::EmptyAxisGroup {
                name: name.to_string(),
            });
        }
        let axis_groups = raw
            .axes
            .split(',')
            .map(|group| canonical_group(name, group))
            .collect::<Result<Vec<_>, _>>()?;

        let param_names = if raw.params.trim().is_empty() {
            Vec::new()
        } else {
            raw.params
                .split(',')
                .map(|p| {
                    let p = p.trim();
                    if p.is_empty() {
                        Err(CatalogError::EmptyParameter {
                            name: name.to_string(),
                        })
                    } else {
                        Ok(p.to_string())
                    }
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self {
            name: name.to_string(),
            axis_groups,
            param_names,
            blocking: raw.blocking,
        })
    }

    /// Whether `group` is one of this command's axis groups.
    ///
    /// Whitespace around member axes is ignored.
    pub fn applies_to(&self, group: &str) -> bool {
        let wanted: String = group.chars().filter(|c| !c.is_whitespace()).collect();
        self.axis_groups.iter().any(|g| *g == wanted)
    }
}

/// Validate one group and return it without whitespace.
fn canonical_group(name: &str, group: &str) -> Result<String, CatalogError> {
    let mut members = Vec::new();
    for token in group.split(AXIS_SEPARATOR) {
        let token = token.trim();
        if token.is_empty() {
            return Err(CatalogError::EmptyAxisGroup {
                name: name.to_string(),
            });
        }
        token
            .parse::<ComponentKeyword>()
            .map_err(|_| CatalogError::InvalidAxis {
                name: name.to_string(),
                token: token.to_string(),
            })?;
        members.push(token);
    }
    Ok(members.join(&AXIS_SEPARATOR.to_string()))
}

/// One table of definitions with name lookup, preserving table order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Table {
    definitions: Vec<CommandDefinition>,
    index: HashMap<String, usize>,
}

impl Table {
    fn build(kind: CatalogKind, rows: &[CommandEntry]) -> Result<Self, CatalogError> {
        let mut table = Table::default();
        for (i, row) in rows.iter().enumerate() {
            let def = CommandDefinition::parse(kind, i, row)?;
            if table.index.contains_key(&def.name) {
                return Err(CatalogError::DuplicateName {
                    kind,
                    name: def.name,
                });
            }
            table.index.insert(def.name.clone(), table.definitions.len());
            table.definitions.push(def);
        }
        Ok(table)
    }

    fn get(&self, name: &str) -> Option<&CommandDefinition> {
        self.index.get(name).map(|&i| &self.definitions[i])
    }
}

/// The public and private command tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCatalog {
    public: Table,
    private: Table,
}

impl CommandCatalog {
    /// Build from the built-in tables.
    pub fn standard() -> Result<Self, CatalogError> {
        Self::from_tables(PUBLIC_COMMANDS, PRIVATE_COMMANDS)
    }

    /// Parse and validate both tables.
    pub fn from_tables(
        public: &[CommandEntry],
        private: &[CommandEntry],
    ) -> Result<Self, CatalogError> {
        Ok(Self {
            public: Table::build(CatalogKind::Public, public)?,
            private: Table::build(CatalogKind::Private, private)?,
        })
    }

    /// Look up `name` in the given table.
    pub fn get(&self, kind: CatalogKind, name: &str) -> Option<&CommandDefinition> {
        self.table(kind).get(name)
    }

    /// All definitions of a table in table order.
    pub fn definitions(&self, kind: CatalogKind) -> &[CommandDefinition] {
        &self.table(kind).definitions
    }

    /// Command names of a table in table order.
    pub fn names(&self, kind: CatalogKind) -> impl Iterator<Item = &str> {
        self.table(kind).definitions.iter().map(|d| d.name.as_str())
    }

    fn table(&self, kind: CatalogKind) -> &Table {
        match kind {
            CatalogKind::Public => &self.public,
            CatalogKind::Private => &self.private,
        }
    }
}

/// Builds the catalog at most once and hands out shared handles.
///
/// Owned by the composition root. A failed build is not cached, so the
/// caller sees the same error on retry.
#[derive(Debug, Default)]
pub struct CatalogCell {
    catalog: OnceLock<Arc<CommandCatalog>>,
    build_lock: Mutex<()>,
    builds: AtomicUsize,
}

impl CatalogCell {
    /// Create an empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the standard catalog, building it on first call.
    pub fn get_or_build(&self) -> Result<Arc<CommandCatalog>, CatalogError> {
        self.get_or_try_build(CommandCatalog::standard)
    }

    /// Return the catalog, building it with `build` on first call.
    pub fn get_or_try_build<F>(&self, build: F) -> Result<Arc<CommandCatalog>, CatalogError>
    where
        F: FnOnce() -> Result<CommandCatalog, CatalogError>,
    {
        if let Some(catalog) = self.catalog.get() {
            return Ok(Arc::clone(catalog));
        }

        let _lock = self.build_lock.lock();
        if let Some(catalog) = self.catalog.get() {
            return Ok(Arc::clone(catalog));
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        let catalog = Arc::new(build()?);
        info!(
            "Command catalog built: {} public, {} private",
            catalog.definitions(CatalogKind::Public).len(),
            catalog.definitions(CatalogKind::Private).len()
        );
        let _ = self.catalog.set(Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Number of build attempts made so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}
