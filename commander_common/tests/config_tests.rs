//! Shipped sample configuration files.

use std::path::Path;

use commander_common::prelude::*;

fn sample(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../config").join(name)
}

#[test]
fn sample_config_loads_and_validates() {
    let config = CommanderConfig::load(&sample("commander.toml")).unwrap();
    config.validate().unwrap();
    assert_eq!(config.link.driver, "serial");
    assert_eq!(config.transport.backpressure, Backpressure::Block);
    assert!(config.interlock.guarded.is_empty());
    assert!(config.interlock.prefix.is_empty());
}

#[test]
fn sample_directory_pairs_four_components() {
    let store = JsonComponentStore::load(&sample("componentIds.json")).unwrap();
    assert_eq!(
        store.keywords(),
        vec![
            ComponentKeyword::M,
            ComponentKeyword::X,
            ComponentKeyword::Y,
            ComponentKeyword::Z
        ]
    );
    assert_eq!(store.label(ComponentKeyword::T), Some("Tool"));
}
