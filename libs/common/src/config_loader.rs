//! Configuration loading helper functions
//! Picks the figment provider from the file extension and layers `BRIDGE_*`
//! environment overrides on top.

use std::path::Path;

use errors::{BridgeError, BridgeResult};
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Prefix for environment overrides, e.g. `BRIDGE_PORT_NAME=COM4`
pub const ENV_PREFIX: &str = "BRIDGE_";

/// Extensions understood by [`load_config_from_file`]
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["yaml", "yml", "toml", "json"];

/// Load a configuration file, choosing the format by extension
pub fn load_config_from_file<T, P>(path: P) -> BridgeResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Err(BridgeError::ConfigurationLoad(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let figment = match extension.as_str() {
        "toml" => Figment::new().merge(Toml::file(path)),
        "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
        "json" => Figment::new().merge(Json::file(path)),
        _ => {
            return Err(BridgeError::ConfigurationLoad(format!(
                "Unsupported config file format: {}",
                path.display()
            )))
        },
    };

    debug!("Loading configuration from {}", path.display());

    figment
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()
        .map_err(|e| {
            BridgeError::ConfigurationLoad(format!(
                "Failed to load configuration from file: {}",
                e
            ))
        })
}

/// Find the first `<stem>.<ext>` that exists in any of `dirs`
pub fn find_config_file(stem: &str, dirs: &[&Path]) -> Option<std::path::PathBuf> {
    dirs.iter()
        .flat_map(|dir| {
            SUPPORTED_EXTENSIONS
                .iter()
                .map(move |ext| dir.join(format!("{}.{}", stem, ext)))
        })
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;

    #[derive(Debug, Deserialize)]
    struct PortOnly {
        port_name: String,
        baud_rate: u32,
    }

    #[test]
    fn test_load_yaml_and_toml() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("settings.yaml");
        fs::write(&yaml, "port_name: COM3\nbaud_rate: 9600\n").unwrap();
        let cfg: PortOnly = load_config_from_file(&yaml).unwrap();
        assert_eq!(cfg.port_name, "COM3");
        assert_eq!(cfg.baud_rate, 9600);

        let toml = dir.path().join("settings.toml");
        fs::write(&toml, "port_name = \"/dev/ttyUSB0\"\nbaud_rate = 115200\n").unwrap();
        let cfg: PortOnly = load_config_from_file(&toml).unwrap();
        assert_eq!(cfg.port_name, "/dev/ttyUSB0");
        assert_eq!(cfg.baud_rate, 115200);
    }

    #[test]
    fn test_missing_and_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_config_from_file::<PortOnly, _>(dir.path().join("nope.yaml"));
        assert!(matches!(missing, Err(BridgeError::ConfigurationLoad(_))));

        let xml = dir.path().join("settings.xml");
        fs::write(&xml, "<Settings/>").unwrap();
        let err = load_config_from_file::<PortOnly, _>(&xml).unwrap_err();
        assert!(err.to_string().contains("Unsupported config file format"));
    }

    #[test]
    fn test_find_config_file_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(second.path().join("settings.json"), "{}").unwrap();

        let found = find_config_file("settings", &[first.path(), second.path()]).unwrap();
        assert_eq!(found, second.path().join("settings.json"));

        fs::write(first.path().join("settings.toml"), "").unwrap();
        let found = find_config_file("settings", &[first.path(), second.path()]).unwrap();
        assert_eq!(found, first.path().join("settings.toml"));
    }
}
