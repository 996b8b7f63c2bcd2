//! CLI command implementations for the monitor binary.
//!
//! This module provides implementations for all CLI subcommands:
//! - `start`: Daemon startup
//! - `stop`: Graceful shutdown of a running daemon
//! - `reload`: Configuration reload of a running daemon
//! - `check`: Configuration and counter source validation
//! - `once`: Foreground sampling
//! - `config`: Configuration file generation

pub mod check;
pub mod config;
pub mod once;
pub mod reload;
pub mod start;
pub mod stop;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use once::command_once;
pub use reload::command_reload;
pub use start::command_start;
pub use stop::command_stop;
