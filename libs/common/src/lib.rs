//! Shared plumbing for the bridge crates
//!
//! - logging bootstrap (console + rolling info/error files)
//! - configuration file loading
//! - hex formatting for binary command logs

pub mod config_loader;
pub mod hex;
pub mod logging;

pub use config_loader::{find_config_file, load_config_from_file};
pub use logging::LogConfig;
