//! Round-trips a `RouterConfiguration` through an actual file on disk, the
//! way `--config` loading does at startup.

use midi_router_core::config::{ChannelConfig, DeviceConfig, MappingConfig, RouterConfiguration};
use std::collections::BTreeMap;

#[test]
fn save_then_load_preserves_devices_and_mappings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let mut cfg = RouterConfiguration::default();
    cfg.devices.insert(
        "kbd".to_string(),
        DeviceConfig {
            name: "Keystation".to_string(),
            port: 0,
        },
    );
    cfg.devices.insert(
        "synth".to_string(),
        DeviceConfig {
            name: "Synth".to_string(),
            port: 0,
        },
    );
    cfg.mappings.insert(
        "main".to_string(),
        MappingConfig {
            inputs: vec!["kbd".to_string()],
            outputs: vec!["synth".to_string()],
            channels: Some(ChannelConfig {
                whitelist: vec![1, 6],
                blacklist: vec![],
                map: BTreeMap::from([("6".to_string(), 1u8)]),
                toggle_controller: None,
            }),
            ..Default::default()
        },
    );

    cfg.save_to_path(&path).unwrap();
    let loaded = RouterConfiguration::load_from_path(&path).unwrap();

    assert_eq!(loaded.devices.len(), 2);
    assert_eq!(loaded.devices["kbd"].name, "Keystation");
    let mapping = &loaded.mappings["main"];
    assert_eq!(mapping.inputs, vec!["kbd".to_string()]);
    let channels = mapping.channels.as_ref().unwrap();
    assert_eq!(channels.whitelist, vec![1, 6]);
    assert_eq!(channels.map.get("6"), Some(&1));
}

#[test]
fn loading_a_mapping_with_an_undeclared_device_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(
        &path,
        r#"{"devices":{},"mappings":{"m":{"inputs":["ghost"],"outputs":[]}}}"#,
    )
    .unwrap();

    let err = RouterConfiguration::load_from_path(&path).unwrap_err();
    assert!(matches!(err, midi_router_core::error::RouterError::Config { .. }));
}

#[test]
fn loading_a_missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.json");
    let err = RouterConfiguration::load_from_path(&path).unwrap_err();
    assert!(matches!(err, midi_router_core::error::RouterError::Config { .. }));
}
