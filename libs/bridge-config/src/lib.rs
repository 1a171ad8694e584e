//! Configuration model shared by the serial command engine and the GCode converter
//!
//! - [`AxisTable`] / [`AxisSettings`]: ordered axis table, index = ordinal among all axes
//! - [`BridgeSettings`]: port parameters, macro names, converter options
//! - [`registers`]: the host variable layout both sides must agree on

pub mod axis;
pub mod registers;
pub mod serde_defaults;
pub mod settings;
pub mod validation;

pub use axis::{position_check_period, steps_to_mm, AxisKind, AxisSettings, AxisTable};
pub use registers::CommonRegister;
pub use settings::{BridgeSettings, EngineSettings, LineSettings, MacroNames, Parity};
pub use validation::ValidationResult;
