use assertables::assert_contains;
use chainsense_common::{
    role::{ConfigError, RoleConfigFile},
    PeripheralKind, RoleConfig,
};

/// Exercise loading a complete role config
#[test]
fn test_full_config() {
    const ROLECFG: &str = r#"
        peripheral = "pro-trinket"
        bus_address = 9
        max_nodes = 4
    "#;

    let cfg = RoleConfig::load_from_str(ROLECFG).expect("Failed to parse role config");
    assert_eq!(
        RoleConfig {
            default_mask: 0xFF,
            bus_address: 9,
            max_nodes: 4
        },
        cfg
    );
}

/// Omitted keys fall back to the defaults of the selected peripheral
#[test]
fn test_defaults_and_mask_override() {
    let cfg = RoleConfig::load_from_str("default_mask = 0x0F").unwrap();
    assert_eq!(0x0F, cfg.default_mask);
    assert_eq!(RoleConfig::default().bus_address, cfg.bus_address);
    assert_eq!(RoleConfig::default().max_nodes, cfg.max_nodes);

    let file: RoleConfigFile = toml::from_str("peripheral = \"arduino-uno\"").unwrap();
    assert_eq!(PeripheralKind::ArduinoUno, file.peripheral);
    assert_eq!(0x3F, file.resolve().unwrap().default_mask);

    let cfg = RoleConfig::load_from_str("").unwrap();
    assert_eq!(RoleConfig::default(), cfg);
}

#[test]
fn test_rejects_bad_values() {
    let err = RoleConfig::load_from_str("max_nodes = 17").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMaxNodes { max_nodes: 17 }));

    let err = RoleConfig::load_from_str("max_nodes = 0").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMaxNodes { max_nodes: 0 }));

    let err = RoleConfig::load_from_str("peripheral = \"arduino-mega\"").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));

    let err = RoleConfig::load_from_str("unknown_key = 1").unwrap_err();
    assert_contains!(err.to_string(), "Failed to parse role config");
}

#[test]
fn test_missing_file() {
    let err = RoleConfig::load("/nonexistent/chainsense.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert_contains!(err.to_string(), "/nonexistent/chainsense.toml");
}
