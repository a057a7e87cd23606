//! Component keywords and the read-only component directory.
//!
//! The system knows five components: the marshaller (`m`) and the four
//! axis controllers (`x`, `y`, `z`, `t`). Each has a display label and,
//! once paired, a transport-level address (an ESP-NOW MAC today). The
//! directory file is owned and edited by the operator UI; this module only
//! reads it.
//!
//! # File format
//!
//! ```json
//! [
//!     { "m": "marshaller", "x": "x_axis", "y": "y_axis", "z": "z_axis", "t": "t_axis" },
//!     { "m": "c4:dd:57:b8:e8:01", "x": "c4:dd:57:b8:e8:02" }
//! ]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Short token identifying the marshaller or an axis controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKeyword {
    /// Marshaller attached to the host.
    #[serde(rename = "m")]
    M,
    /// X axis controller.
    #[serde(rename = "x")]
    X,
    /// Y axis controller.
    #[serde(rename = "y")]
    Y,
    /// Z axis controller.
    #[serde(rename = "z")]
    Z,
    /// Tool axis controller.
    #[serde(rename = "t")]
    T,
}

impl ComponentKeyword {
    /// All keywords in canonical order.
    pub const ALL: [ComponentKeyword; 5] = [Self::M, Self::X, Self::Y, Self::Z, Self::T];

    /// Single-letter wire token.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::M => "m",
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::T => "t",
        }
    }

    /// True for the four motion axes.
    pub const fn is_axis(self) -> bool {
        !matches!(self, Self::M)
    }
}

impl fmt::Display for ComponentKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a token is not one of `m`, `x`, `y`, `z`, `t`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown component keyword '{0}'")]
pub struct UnknownKeyword(pub String);

impl FromStr for ComponentKeyword {
    type Err = UnknownKeyword;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "m" => Ok(Self::M),
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "z" => Ok(Self::Z),
            "t" => Ok(Self::T),
            other => Err(UnknownKeyword(other.to_string())),
        }
    }
}

/// Error type for directory loading.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The directory file could not be read.
    #[error("Failed to read component directory {path}: {source}")]
    Io {
        /// File that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The directory file is not in the expected `[labels, addresses]` shape.
    #[error("Failed to parse component directory: {0}")]
    Parse(#[from] serde_json::Error),

    /// An address is not a `hh:hh:hh:hh:hh:hh` MAC string.
    #[error("Invalid MAC address '{0}'")]
    InvalidMac(String),
}

/// Read access to component labels and addresses.
///
/// The core only ever asks for resolved addresses; the address format is
/// opaque to it.
pub trait ComponentDirectory: Send + Sync {
    /// Transport address of `keyword`, if the component is paired.
    fn address(&self, keyword: ComponentKeyword) -> Option<&str>;

    /// Display label of `keyword`.
    fn label(&self, keyword: ComponentKeyword) -> Option<&str>;

    /// Keywords that currently have an address, in canonical order.
    fn keywords(&self) -> Vec<ComponentKeyword>;
}

/// Directory backed by the JSON file maintained by the operator UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonComponentStore {
    labels: BTreeMap<ComponentKeyword, String>,
    addresses: BTreeMap<ComponentKeyword, String>,
}

#[derive(Deserialize)]
struct StoreFile(BTreeMap<String, String>, BTreeMap<String, String>);

impl JsonComponentStore {
    /// Load the directory from `path`.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let content = std::fs::read_to_string(path).map_err(|source| DirectoryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let store = Self::from_json(&content)?;
        debug!(
            "Loaded component directory {:?}: {} paired of {} labelled",
            path,
            store.addresses.len(),
            store.labels.len()
        );
        Ok(store)
    }

    /// Parse the directory from its JSON text. Unknown keywords are skipped.
    pub fn from_json(content: &str) -> Result<Self, DirectoryError> {
        let StoreFile(labels, addresses) = serde_json::from_str(content)?;
        Ok(Self {
            labels: keyed(labels),
            addresses: keyed(addresses),
        })
    }

    /// Build a directory from in-memory pairs.
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = (ComponentKeyword, S)>,
        S: Into<String>,
    {
        Self {
            labels: BTreeMap::new(),
            addresses: addresses.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }

    /// Address converted to raw bytes, for components addressed by MAC.
    pub fn address_bytes(&self, keyword: ComponentKeyword) -> Option<Result<[u8; 6], DirectoryError>> {
        self.address(keyword).map(mac_to_bytes)
    }
}

fn keyed(raw: BTreeMap<String, String>) -> BTreeMap<ComponentKeyword, String> {
    raw.into_iter()
        .filter_map(|(key, value)| match key.parse::<ComponentKeyword>() {
            Ok(keyword) => Some((keyword, value)),
            Err(e) => {
                warn!("Skipping directory entry: {}", e);
                None
            }
        })
        .collect()
}

impl ComponentDirectory for JsonComponentStore {
    fn address(&self, keyword: ComponentKeyword) -> Option<&str> {
        self.addresses.get(&keyword).map(String::as_str)
    }

    fn label(&self, keyword: ComponentKeyword) -> Option<&str> {
        self.labels.get(&keyword).map(String::as_str)
    }

    fn keywords(&self) -> Vec<ComponentKeyword> {
        self.addresses.keys().copied().collect()
    }
}

/// Convert `hh:hh:hh:hh:hh:hh` to six bytes.
pub fn mac_to_bytes(mac: &str) -> Result<[u8; 6], DirectoryError> {
    let invalid = || DirectoryError::InvalidMac(mac.to_string());
    let mut bytes = [0u8; 6];
    let mut parts = mac.split(':');
    for byte in bytes.iter_mut() {
        let part = parts.next().ok_or_else(invalid)?;
        if part.is_empty() || part.len() > 2 {
            return Err(invalid());
        }
        *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(bytes)
}

/// Convert six bytes to lowercase `hh:hh:hh:hh:hh:hh`.
pub fn bytes_to_mac(bytes: &[u8; 6]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"[
        {"m": "marshaller", "x": "x_axis", "y": "y_axis", "z": "z_axis", "t": "t_axis"},
        {"m": "c4:dd:57:b8:e8:e8", "z": "c4:dd:57:b8:e8:0a", "x": "24:6f:28:01:02:03"}
    ]"#;

    #[test]
    fn test_keyword_round_trips_through_str() {
        for keyword in ComponentKeyword::ALL {
            assert_eq!(keyword.as_str().parse::<ComponentKeyword>(), Ok(keyword));
        }
        assert!("q".parse::<ComponentKeyword>().is_err());
        assert!(!ComponentKeyword::M.is_axis());
        assert!(ComponentKeyword::T.is_axis());
    }

    #[test]
    fn test_store_parses_labels_and_addresses() {
        let store = JsonComponentStore::from_json(SAMPLE).unwrap();
        assert_eq!(store.label(ComponentKeyword::Y), Some("y_axis"));
        assert_eq!(store.address(ComponentKeyword::Y), None);
        assert_eq!(store.address(ComponentKeyword::Z), Some("c4:dd:57:b8:e8:0a"));
        assert_eq!(
            store.keywords(),
            vec![ComponentKeyword::M, ComponentKeyword::X, ComponentKeyword::Z]
        );
    }

    #[test]
    fn test_store_skips_unknown_keywords() {
        let store = JsonComponentStore::from_json(r#"[{"q": "nope"}, {"q": "00:00:00:00:00:00"}]"#)
            .unwrap();
        assert!(store.keywords().is_empty());
    }

    #[test]
    fn test_store_rejects_wrong_shape() {
        assert!(matches!(
            JsonComponentStore::from_json(r#"{"m": "x"}"#),
            Err(DirectoryError::Parse(_))
        ));
    }

    #[test]
    fn test_store_loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{SAMPLE}").unwrap();
        file.flush().unwrap();

        let store = JsonComponentStore::load(file.path()).unwrap();
        assert_eq!(store.address(ComponentKeyword::M), Some("c4:dd:57:b8:e8:e8"));
    }

    #[test]
    fn test_store_missing_file_is_io_error() {
        let result = JsonComponentStore::load(Path::new("/nonexistent/componentIds.json"));
        assert!(matches!(result, Err(DirectoryError::Io { .. })));
    }

    #[test]
    fn test_mac_conversion() {
        let bytes = mac_to_bytes("c4:dd:57:b8:e8:0a").unwrap();
        assert_eq!(bytes, [0xc4, 0xdd, 0x57, 0xb8, 0xe8, 0x0a]);
        assert_eq!(bytes_to_mac(&bytes), "c4:dd:57:b8:e8:0a");

        assert!(mac_to_bytes("c4:dd:57:b8:e8").is_err());
        assert!(mac_to_bytes("c4:dd:57:b8:e8:0a:ff").is_err());
        assert!(mac_to_bytes("zz:dd:57:b8:e8:0a").is_err());
        assert!(mac_to_bytes("c4::57:b8:e8:0a").is_err());
    }

    #[test]
    fn test_address_bytes_for_paired_component() {
        let store = JsonComponentStore::from_json(SAMPLE).unwrap();
        let bytes = store.address_bytes(ComponentKeyword::X).unwrap().unwrap();
        assert_eq!(bytes, [0x24, 0x6f, 0x28, 0x01, 0x02, 0x03]);
        assert!(store.address_bytes(ComponentKeyword::T).is_none());
    }
}
