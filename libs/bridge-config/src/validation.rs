//! Settings validation
//!
//! Errors are collected rather than returned on the first failure so a
//! hand-edited settings file can be fixed in one pass.

use errors::{BridgeError, BridgeResult};

use crate::settings::{BridgeSettings, LineSettings};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
        self.is_valid = false;
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Collapse into a single `InvalidConfig` error when anything failed
    pub fn into_result(self) -> BridgeResult<()> {
        if self.is_valid {
            Ok(())
        } else {
            Err(BridgeError::invalid_config("settings", self.errors.join("; ")))
        }
    }
}

impl BridgeSettings {
    /// Check the axis table and port parameters
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if !self.axes.has_enabled_axis() {
            result.add_error("No axis selected.".to_string());
        }

        for axis in self.axes.iter() {
            if !axis.letter.is_ascii_uppercase() {
                result.add_error(format!("Axis name '{}' must be 'A'-'Z'", axis.letter));
            }
            if axis.min_distance_to_move < 0.0 {
                result.add_error(format!(
                    "Axis {}: minimal distance must be greater or equal to zero",
                    axis.letter
                ));
            }
            if axis.axis_min_value > axis.axis_max_value {
                result.add_error(format!(
                    "Axis {}: min value {} is greater than max value {}",
                    axis.letter, axis.axis_min_value, axis.axis_max_value
                ));
            }
            if axis.steps_per_mm == 0 {
                result.add_error(format!("Axis {}: steps per mm must be positive", axis.letter));
            }
            if axis.max_speed > 0 && axis.speed > axis.max_speed {
                result.add_warning(format!(
                    "Axis {}: speed {} exceeds max speed {}",
                    axis.letter, axis.speed, axis.max_speed
                ));
            }
        }

        if let Err(e) = LineSettings::parse(&self.engine.line_settings) {
            result.add_error(e.to_string());
        }

        if self.baud_rate == 0 {
            result.add_error("Baud rate must be greater than zero".to_string());
        }

        if self.port_name.trim().is_empty() {
            result.add_warning("Port name is empty".to_string());
        }

        result
    }
}
