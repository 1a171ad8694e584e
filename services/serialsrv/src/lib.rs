//! Serial Command Engine
//!
//! Bridges the CNC host to the motor controller over one serial line.
//!
//! # Architecture
//!
//! ```text
//! host binding ──► SerialEngine ──► Transport (serial / in-memory)
//!                    │   ▲
//!          queue worker  reader task ──► motion tracking
//! ```
//!
//! - **`engine`**: single-flight dispatch, command queue, response reassembly, axis commands
//! - **`modbus`**: 8-byte RTU request frames and response decoding
//! - **`transport`**: device stream abstraction
//! - **`registry`**: engines keyed by an opaque host key
//! - **`cli`**: the `serialsrv` command line

pub mod cli;
pub mod engine;
pub mod modbus;
pub mod registry;
pub mod transport;

pub use engine::{
    AxisDefinition, Command, MotionProgress, ResponseCode, SendMode, SerialEngine, SerialResponse,
};
pub use registry::EngineRegistry;
