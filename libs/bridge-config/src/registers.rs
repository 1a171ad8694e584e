//! Host macro variable layout
//!
//! The host program addresses numeric variables as `#<address>=<value>`. The
//! generated macros hard-code these offsets, so the converter and the macro
//! generator must agree on them:
//!
//! | Addresses | Use |
//! |---|---|
//! | `1..=N` | one-time start position per enabled axis |
//! | `15..=22` | shared registers, see [`CommonRegister`] |
//! | `23..` | persistent per-axis variables used by the macros |

use std::fmt::Display;

/// Per-axis values consumed by the initialisation macro
pub const AXIS_INIT_VARIABLES_COUNT: u32 = 14;

/// Per-axis values consumed by the motion macro
pub const AXIS_MOVE_VARIABLES_COUNT: u32 = 9;

/// First one-time start position address
pub const AXIS_START_POSITION_BASE: u32 = 1;

/// First shared register address
pub const COMMON_VARIABLES_BASE: u32 = 15;

/// First persistent per-axis variable address
pub const AXIS_VARIABLES_BASE: u32 = 23;

/// Shared registers, as offsets from [`COMMON_VARIABLES_BASE`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonRegister {
    /// Index of the axis the next motion call applies to
    AxisSelect = 0,
    /// Destination of the next motion call, millimetres
    Destination = 1,
    /// One-time speed override for the next motion call
    SpeedOverride = 2,
    /// One-time trigger to show the current position window
    ShowPosition = 3,
    JoystickEnable = 4,
    JoystickAxis = 5,
    /// One-time spindle on/off trigger
    SpindleTrigger = 6,
    /// 1 while motion delegation is active, 0 while it is suspended
    PluginEnable = 7,
}

impl CommonRegister {
    pub const fn address(self) -> u32 {
        COMMON_VARIABLES_BASE + self as u32
    }

    /// `#<address>=<value>`
    pub fn assign(self, value: impl Display) -> String {
        format!("#{}={}", self.address(), value)
    }
}

/// Address of the one-time start position for the `position`-th enabled axis (0-based)
pub const fn start_position_address(position: usize) -> u32 {
    AXIS_START_POSITION_BASE + position as u32
}
