//! GCode Stream Converter
//!
//! Rewrites a CNC program so that the motions of externally driven axes are
//! handed to the host macros, and generates those macros from the axis table.
//!
//! - **`transform`**: per-line rewriting
//! - **`converter`**: chunked file conversion with bounded memory
//! - **`macros`**: init / move / close-port macro generation
//! - **`cli`**: the `gcconv` command line

pub mod cli;
pub mod converter;
pub mod macros;
pub mod transform;

pub use converter::{convert_file, convert_str, ConversionStats, StreamConverter};
pub use macros::{write_macros, MacroExport, MacroTemplates};
pub use transform::{AxisMotion, LineTransformer, MotionKind};
