//! Bridge settings: port parameters, macro names, converter options and the axis table

use std::path::{Path, PathBuf};

use common::{find_config_file, load_config_from_file};
use errors::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::axis::AxisTable;
use crate::serde_defaults::{self, deserialize_bool_flexible, deserialize_semicolon_list};

/// Settings file stem looked up when no explicit path is given
pub const SETTINGS_FILE_STEM: &str = "settings";

/// Sub-folder searched after the working directory
pub const SETTINGS_SUBFOLDER: &str = "GCConverter";

/// Data-bits/stop-bits/parity combinations accepted by the device
pub const ALLOWED_LINE_SETTINGS: [&str; 5] = ["8-1-O", "8-1-E", "8-2-N", "8-1-N", "7-1-E"];

/// Names of the three host macros
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroNames {
    /// Opens the port and initialises the device axes
    #[serde(default = "serde_defaults::init_macro")]
    pub init: String,
    #[serde(default = "serde_defaults::close_port_macro")]
    pub close_port: String,
    /// Performs one axis move from the shared registers
    #[serde(default = "serde_defaults::move_macro")]
    pub move_axis: String,
}

impl Default for MacroNames {
    fn default() -> Self {
        Self {
            init: serde_defaults::init_macro(),
            close_port: serde_defaults::close_port_macro(),
            move_axis: serde_defaults::move_macro(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Parsed `<data>-<stop>-<parity>` line settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSettings {
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
}

impl LineSettings {
    /// Parse one of [`ALLOWED_LINE_SETTINGS`] (case-insensitive)
    pub fn parse(value: &str) -> BridgeResult<Self> {
        let upper = value.trim().to_ascii_uppercase();
        if !ALLOWED_LINE_SETTINGS.contains(&upper.as_str()) {
            return Err(BridgeError::invalid_config(
                "line_settings",
                format!(
                    "'{}' is not one of {}",
                    value,
                    ALLOWED_LINE_SETTINGS.join(", ")
                ),
            ));
        }

        let mut parts = upper.split('-');
        let data_bits = parts.next().and_then(|p| p.parse().ok()).unwrap_or(8);
        let stop_bits = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1);
        let parity = match parts.next() {
            Some("E") => Parity::Even,
            Some("O") => Parity::Odd,
            _ => Parity::None,
        };

        Ok(Self {
            data_bits,
            stop_bits,
            parity,
        })
    }
}

/// Serial command engine parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "serde_defaults::line_settings")]
    pub line_settings: String,
    /// Default wait for a response, ms
    #[serde(default = "serde_defaults::read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "serde_defaults::write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Wait for axis commands (SETAXIS, GETPOS, STOP, SETJS), ms
    #[serde(default = "serde_defaults::command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Maximum pending queued commands; 0 disables the queue
    #[serde(default)]
    pub queue_max_len: usize,
    #[serde(default = "serde_defaults::input_buffer_size")]
    pub input_buffer_size: usize,
    #[serde(default = "serde_defaults::queue_poll_interval_ms")]
    pub queue_poll_interval_ms: u64,
    #[serde(default = "serde_defaults::min_move_notify_timeout_ms")]
    pub min_move_notify_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            line_settings: serde_defaults::line_settings(),
            read_timeout_ms: serde_defaults::read_timeout_ms(),
            write_timeout_ms: serde_defaults::write_timeout_ms(),
            command_timeout_ms: serde_defaults::command_timeout_ms(),
            queue_max_len: 0,
            input_buffer_size: serde_defaults::input_buffer_size(),
            queue_poll_interval_ms: serde_defaults::queue_poll_interval_ms(),
            min_move_notify_timeout_ms: serde_defaults::min_move_notify_timeout_ms(),
        }
    }
}

impl EngineSettings {
    /// Reception buffer size, rounded up to an even number of bytes
    pub fn input_buffer_capacity(&self) -> usize {
        let size = self.input_buffer_size.max(2);
        size + size % 2
    }

    pub fn line(&self) -> BridgeResult<LineSettings> {
        LineSettings::parse(&self.line_settings)
    }
}

/// Complete configuration snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "serde_defaults::port_name")]
    pub port_name: String,
    #[serde(default = "serde_defaults::baud_rate")]
    pub baud_rate: u32,

    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub enable_log: bool,
    #[serde(default = "serde_defaults::log_folder")]
    pub log_folder: PathBuf,

    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub enable_joystick: bool,
    /// Device command that configures the joystick, e.g. `SETJS;true;X;...`
    #[serde(default)]
    pub joystick_command: String,

    /// Substrings that suspend motion delegation for the line they appear in
    #[serde(default, deserialize_with = "deserialize_semicolon_list")]
    pub disable_macros: Vec<String>,

    #[serde(default = "serde_defaults::axis_alphabet")]
    pub axis_alphabet: String,
    #[serde(default = "serde_defaults::line_terminator")]
    pub line_terminator: String,

    #[serde(default)]
    pub macros: MacroNames,
    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub axes: AxisTable,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            port_name: serde_defaults::port_name(),
            baud_rate: serde_defaults::baud_rate(),
            enable_log: false,
            log_folder: serde_defaults::log_folder(),
            enable_joystick: false,
            joystick_command: String::new(),
            disable_macros: Vec::new(),
            axis_alphabet: serde_defaults::axis_alphabet(),
            line_terminator: serde_defaults::line_terminator(),
            macros: MacroNames::default(),
            engine: EngineSettings::default(),
            axes: AxisTable::default(),
        }
    }
}

impl BridgeSettings {
    /// Load settings
    ///
    /// An explicit path must exist. Without one, `settings.{yaml,yml,toml,json}`
    /// is looked up in the working directory, then in its `GCConverter` sub-folder.
    pub fn load(path: Option<&Path>) -> BridgeResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let cwd = std::env::current_dir()?;
                let sub = cwd.join(SETTINGS_SUBFOLDER);
                find_config_file(SETTINGS_FILE_STEM, &[cwd.as_path(), sub.as_path()]).ok_or_else(
                    || {
                        BridgeError::ConfigurationLoad(format!(
                            "{}.yaml must be located in the current folder or sub-folder {}, allowed locations: {}, {}",
                            SETTINGS_FILE_STEM,
                            SETTINGS_SUBFOLDER,
                            cwd.display(),
                            sub.display()
                        ))
                    },
                )?
            },
        };

        let settings: Self = load_config_from_file(&path)?;
        info!(
            "Loaded settings from {}: {} axes, port {}",
            path.display(),
            settings.axes.len(),
            settings.port_name
        );
        Ok(settings)
    }

    /// Write settings back; the format follows the extension (yaml/yml, toml, json)
    pub fn save(&self, path: &Path) -> BridgeResult<()> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let content = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::to_string(self)?,
            "json" => serde_json::to_string_pretty(self)?,
            "toml" => toml::to_string_pretty(self).map_err(|e| {
                BridgeError::ConfigurationLoad(format!("Failed to serialize settings: {}", e))
            })?,
            _ => {
                return Err(BridgeError::ConfigurationLoad(format!(
                    "Unsupported config file format: {}",
                    path.display()
                )))
            },
        };

        std::fs::write(path, content)?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Letters of the full axis alphabet
    pub fn axis_alphabet_letters(&self) -> Vec<char> {
        self.axis_alphabet
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .collect()
    }
}
