//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error
//! handling through the public loading path, not TOML parsing details.

use std::io::Write;
use std::path::{Path, PathBuf};

use edgelink::config::{ConfigError, DeviceConfig};
use tempfile::NamedTempFile;

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[device]
serial_path = "/etc/edgelink/serial"
greeting = "hello from the bench"
status_lines = 24

[broker]
host = "a1b2c3d4e5f6g7-ats.iot.us-west-2.amazonaws.com"
port = 8883

[broker.tls]
root_ca_path = "/etc/edgelink/AmazonRootCA1.pem"
certificate_path = "/etc/edgelink/device.pem.crt"
private_key_path = "/etc/edgelink/private.pem.key"
"#
    )
    .unwrap();

    let config = DeviceConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.device.greeting, "hello from the bench");
    assert_eq!(config.device.status_lines, 24);
    assert_eq!(
        config.broker.host,
        "a1b2c3d4e5f6g7-ats.iot.us-west-2.amazonaws.com"
    );
    assert_eq!(config.broker.port, 8883);
    let tls = config.broker.tls.expect("tls section parses");
    assert_eq!(
        tls.private_key_path,
        PathBuf::from("/etc/edgelink/private.pem.key")
    );
}

#[test]
fn test_config_applies_defaults_when_device_section_missing() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[broker]
host = "localhost"
"#
    )
    .unwrap();

    let config = DeviceConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.broker.port, 8883);
    assert!(config.broker.tls.is_none());
    assert_eq!(config.device.greeting, "hello from SDK");
    assert_eq!(config.device.status_lines, 40);
    assert_eq!(
        config.device.serial_path,
        PathBuf::from("/var/lib/edgelink/serial")
    );
}

#[test]
fn test_config_partial_device_section_keeps_other_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[device]
greeting = "bench rig 3"

[broker]
host = "localhost"
port = 1883
"#
    )
    .unwrap();

    let config = DeviceConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.device.greeting, "bench rig 3");
    assert_eq!(config.device.status_lines, 40);
    assert_eq!(config.broker.port, 1883);
}

#[test]
fn test_config_returns_error_when_broker_section_missing() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[device]
greeting = "hello"
"#
    )
    .unwrap();

    let result = DeviceConfig::load_from_file(temp_file.path());

    assert!(result.is_err());
    match result {
        Err(ConfigError::TomlParse(_)) => {}
        _ => panic!("Expected TomlParse error for missing broker section"),
    }
}

#[test]
fn test_config_returns_error_for_invalid_toml_syntax() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[broker
host = "localhost"
"#
    )
    .unwrap();

    let result = DeviceConfig::load_from_file(temp_file.path());

    assert!(result.is_err());
    match result {
        Err(ConfigError::TomlParse(_)) => {}
        _ => panic!("Expected TomlParse error for invalid TOML syntax"),
    }
}

#[test]
fn test_config_returns_error_for_empty_file() {
    let temp_file = NamedTempFile::new().unwrap();

    let result = DeviceConfig::load_from_file(temp_file.path());

    assert!(result.is_err());
}

#[test]
fn test_config_rejects_blank_host() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[broker]
host = "   "
"#
    )
    .unwrap();

    let result = DeviceConfig::load_from_file(temp_file.path());

    match result {
        Err(ConfigError::InvalidConfig(message)) => {
            assert!(message.contains("host"));
        }
        _ => panic!("Expected InvalidConfig error for blank host"),
    }
}

#[test]
fn test_config_rejects_zero_port() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[broker]
host = "localhost"
port = 0
"#
    )
    .unwrap();

    let result = DeviceConfig::load_from_file(temp_file.path());

    match result {
        Err(ConfigError::InvalidConfig(message)) => {
            assert!(message.contains("port"));
        }
        _ => panic!("Expected InvalidConfig error for zero port"),
    }
}

#[test]
fn test_config_returns_error_when_file_not_found() {
    let result = DeviceConfig::load_from_file(Path::new("/nonexistent/edgelink.toml"));

    assert!(result.is_err());
    match result {
        Err(ConfigError::FileRead(_)) => {}
        _ => panic!("Expected FileRead error for nonexistent file"),
    }
}

#[test]
fn test_config_round_trips_through_pretty_toml() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[device]
greeting = "round trip"

[broker]
host = "broker.example.com"
port = 8883

[broker.tls]
root_ca_path = "/creds/ca.pem"
certificate_path = "/creds/cert.pem"
private_key_path = "/creds/key.pem"
"#
    )
    .unwrap();

    let config = DeviceConfig::load_from_file(temp_file.path()).unwrap();

    // The `config --show` path renders and must parse back identically.
    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed: DeviceConfig = toml::from_str(&rendered).unwrap();
    assert_eq!(reparsed, config);
}
