//! Axis settings and the ordered axis table
//!
//! Axes are identified by a single letter `A`-`Z` (case-insensitive, stored
//! upper case). The table is kept sorted by letter and an axis's index is its
//! ordinal among *all* configured axes, so disabled axes still occupy an index.

use std::collections::BTreeSet;

use errors::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};

use crate::registers::AXIS_INIT_VARIABLES_COUNT;
use crate::serde_defaults::{self, deserialize_bool_flexible};

/// Motor driving an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisKind {
    #[default]
    StepMotor,
    ServoMotor,
    ServoContinuousMotor,
}

/// Device steps to millimetres, `None` without a step scale
pub fn steps_to_mm(steps: f64, steps_per_mm: u32) -> Option<f64> {
    (steps_per_mm != 0).then(|| steps / f64::from(steps_per_mm))
}

/// One logical axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSettings {
    /// Axis letter, `A`-`Z`
    #[serde(alias = "axis_name")]
    pub letter: char,

    #[serde(default)]
    pub kind: AxisKind,

    /// Excluded from conversion and motion delegation
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub disabled: bool,

    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub inverse: bool,

    pub steps_per_mm: u32,

    /// Moves shorter than this (mm) are no-ops
    #[serde(default)]
    pub min_distance_to_move: f64,

    /// Default feed, mm/min
    #[serde(default)]
    pub speed: u32,

    /// Feed for rapid (G0) moves, mm/min
    #[serde(default)]
    pub rapid_speed: u32,

    /// Ceiling applied to program feed values, mm/min
    #[serde(default)]
    pub max_speed: u32,

    /// One-time start position written by the program header
    #[serde(default)]
    pub start_pos: i32,

    /// Device position notification period in ms, 0 = no notifications
    #[serde(default)]
    pub position_notify_period: u32,

    #[serde(default = "serde_defaults::axis_min_value")]
    pub axis_min_value: f64,

    #[serde(default = "serde_defaults::axis_max_value")]
    pub axis_max_value: f64,

    /// Extra time in ms a host-side move waits on top of the computed travel time
    #[serde(default)]
    pub move_response_timeout: u32,

    /// Host display label that mirrors this axis while it moves
    #[serde(default = "serde_defaults::display_label")]
    pub display_label: u32,

    #[serde(default = "serde_defaults::display_multiplier")]
    pub display_multiplier: u32,

    /// Press the host's emergency stop when the device reports an error
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub estop_on_error: bool,

    /// Delete the axis word from the converted line instead of keeping it next to the macro call
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub replace_in_source: bool,

    /// Last known position, mm
    #[serde(skip)]
    pub current_position: f64,

    /// Ordinal among all axes of the owning table
    #[serde(skip)]
    pub index: usize,
}

impl AxisSettings {
    pub fn new(letter: char, steps_per_mm: u32) -> Self {
        Self {
            letter: letter.to_ascii_uppercase(),
            kind: AxisKind::default(),
            disabled: false,
            inverse: false,
            steps_per_mm,
            min_distance_to_move: 0.0,
            speed: 0,
            rapid_speed: 0,
            max_speed: 0,
            start_pos: 0,
            position_notify_period: 0,
            axis_min_value: serde_defaults::axis_min_value(),
            axis_max_value: serde_defaults::axis_max_value(),
            move_response_timeout: 0,
            display_label: serde_defaults::display_label(),
            display_multiplier: serde_defaults::display_multiplier(),
            estop_on_error: false,
            replace_in_source: false,
            current_position: 0.0,
            index: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    /// Staleness check period for position notifications, ms
    pub fn position_check_period(&self) -> u32 {
        position_check_period(self.position_notify_period)
    }

    /// Millimetres to device steps, truncated toward zero
    pub fn to_steps(&self, mm: f64) -> i64 {
        (mm * f64::from(self.steps_per_mm)) as i64
    }

    /// Apply the speed ceiling; a ceiling of 0 means none is configured
    pub fn limit_speed(&self, speed: u32) -> u32 {
        if self.max_speed == 0 {
            speed
        } else {
            speed.min(self.max_speed)
        }
    }

    pub fn in_range(&self, position: f64) -> bool {
        position >= self.axis_min_value && position <= self.axis_max_value
    }

    /// The initialisation macro's per-axis value row
    ///
    /// Order: index, steps/mm, speed, check period, estop flag, move timeout,
    /// display label, display multiplier, start position, notify period,
    /// inverse flag, rapid speed, min value, max value.
    pub fn parameter_row(&self) -> [String; AXIS_INIT_VARIABLES_COUNT as usize] {
        let flag = |b: bool| if b { "1" } else { "0" }.to_string();
        [
            self.index.to_string(),
            self.steps_per_mm.to_string(),
            self.speed.to_string(),
            self.position_check_period().to_string(),
            flag(self.estop_on_error),
            self.move_response_timeout.to_string(),
            self.display_label.to_string(),
            self.display_multiplier.to_string(),
            self.start_pos.to_string(),
            self.position_notify_period.to_string(),
            flag(self.inverse),
            self.rapid_speed.to_string(),
            self.axis_min_value.to_string(),
            self.axis_max_value.to_string(),
        ]
    }
}

/// Staleness check period for a notification period: 1.4x the period, plus
/// 150 ms when the period is under 200 ms; 0 when notifications are off.
pub fn position_check_period(notify_period_ms: u32) -> u32 {
    if notify_period_ms == 0 {
        return 0;
    }
    let mut period = (f64::from(notify_period_ms) * 1.4) as u32;
    if notify_period_ms < 200 {
        period += 150;
    }
    period
}

/// Axis table ordered by letter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<AxisSettings>", into = "Vec<AxisSettings>")]
pub struct AxisTable {
    axes: Vec<AxisSettings>,
}

impl AxisTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table, normalising letters to upper case
    ///
    /// Fails on a letter outside `A`-`Z` or a duplicate letter.
    pub fn from_axes(axes: Vec<AxisSettings>) -> BridgeResult<Self> {
        let mut seen = BTreeSet::new();
        let mut normalized = Vec::with_capacity(axes.len());
        for mut axis in axes {
            axis.letter = normalize_letter(axis.letter)?;
            if !seen.insert(axis.letter) {
                return Err(BridgeError::invalid_config(
                    "axes",
                    format!("duplicate axis letter '{}'", axis.letter),
                ));
            }
            normalized.push(axis);
        }

        let mut table = Self { axes: normalized };
        table.reindex();
        Ok(table)
    }

    fn reindex(&mut self) {
        self.axes.sort_by_key(|axis| axis.letter);
        for (index, axis) in self.axes.iter_mut().enumerate() {
            axis.index = index;
        }
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AxisSettings> {
        self.axes.iter()
    }

    /// Enabled axes in letter order
    pub fn enabled(&self) -> impl Iterator<Item = &AxisSettings> {
        self.axes.iter().filter(|axis| axis.is_enabled())
    }

    pub fn has_enabled_axis(&self) -> bool {
        self.enabled().next().is_some()
    }

    pub fn get(&self, letter: char) -> Option<&AxisSettings> {
        let letter = letter.to_ascii_uppercase();
        self.axes.iter().find(|axis| axis.letter == letter)
    }

    pub fn get_mut(&mut self, letter: char) -> Option<&mut AxisSettings> {
        let letter = letter.to_ascii_uppercase();
        self.axes.iter_mut().find(|axis| axis.letter == letter)
    }

    pub fn contains(&self, letter: char) -> bool {
        self.get(letter).is_some()
    }

    /// Axis at ordinal `index`
    pub fn by_index(&self, index: usize) -> Option<&AxisSettings> {
        self.axes.get(index)
    }

    /// Insert a new axis; indices of the following axes shift by one
    pub fn insert(&mut self, mut axis: AxisSettings) -> BridgeResult<&mut AxisSettings> {
        axis.letter = normalize_letter(axis.letter)?;
        if self.contains(axis.letter) {
            return Err(BridgeError::invalid_config(
                "axes",
                format!("duplicate axis letter '{}'", axis.letter),
            ));
        }
        let letter = axis.letter;
        self.axes.push(axis);
        self.reindex();
        self.get_mut(letter)
            .ok_or(BridgeError::AxisNotFound(letter))
    }

    /// The 14-value parameter rows of every axis, in index order
    pub fn parameter_table(&self) -> Vec<[String; AXIS_INIT_VARIABLES_COUNT as usize]> {
        self.axes.iter().map(AxisSettings::parameter_row).collect()
    }
}

impl TryFrom<Vec<AxisSettings>> for AxisTable {
    type Error = BridgeError;

    fn try_from(axes: Vec<AxisSettings>) -> Result<Self, Self::Error> {
        Self::from_axes(axes)
    }
}

impl From<AxisTable> for Vec<AxisSettings> {
    fn from(table: AxisTable) -> Self {
        table.axes
    }
}

fn normalize_letter(letter: char) -> BridgeResult<char> {
    let upper = letter.to_ascii_uppercase();
    if upper.is_ascii_uppercase() {
        Ok(upper)
    } else {
        Err(BridgeError::invalid_config(
            "axes",
            format!("axis name '{}' must be 'A'-'Z'", letter),
        ))
    }
}
