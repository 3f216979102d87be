//! Configuration loading

use anyhow::{Context, Result};
use can_gateway::GatewayConfig;
use std::fs;
use std::path::Path;

/// Load a gateway configuration from a TOML file
pub fn load_config(path: &Path) -> Result<GatewayConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    parse_config(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
}

/// Parse and validate a TOML configuration
pub fn parse_config(content: &str) -> Result<GatewayConfig> {
    let config: GatewayConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_gateway::ValueType;
    use std::io::Write;

    const SAMPLE: &str = r#"
        can_interface = "vcan0"
        throttle_ms = 2000
        filter_id = "0x100"
        filter_mask = "0x700"

        [[inputs]]
        id = "0x123"
        type = "float"
        path = "environment.depth.belowTransducer"

        [[inputs]]
        id = "0x124"
        type = "xyz-float"
        realtime = true
        path = "navigation.attitude"

        [[outputs]]
        id = "0x400"
        type = "uint"
        realtime = true
        path = "electrical.switches.bank0"
    "#;

    #[test]
    fn test_config_deserialization() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.can_interface, "vcan0");
        assert_eq!(config.throttle_ms, 2000);
        assert_eq!(config.inputs.len(), 2);
        assert_eq!(config.inputs[1].value_type, ValueType::XyzFloat);
        assert!(config.inputs[1].realtime);
        assert!(!config.inputs[0].realtime);
        assert_eq!(config.outputs[0].id, "0x400");
    }

    #[test]
    fn test_defaults_apply() {
        let config = parse_config("").unwrap();
        assert_eq!(config.can_interface, "can0");
        assert_eq!(config.throttle_ms, 5000);
        assert_eq!(config.filter_id, "0x400");
        assert_eq!(config.filter_mask, "0x400");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let content = r#"
            [[inputs]]
            id = "0x123"
            type = "double"
            path = "a.b"
        "#;
        assert!(parse_config(content).is_err());
    }

    #[test]
    fn test_malformed_identifier_rejected() {
        let content = r#"
            [[outputs]]
            id = "0xNOPE"
            type = "int"
            path = "a.b"
        "#;
        let err = parse_config(content).unwrap_err();
        assert!(err.to_string().contains("0xNOPE"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.outputs.len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("does-not-exist.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
