//! CLI arguments and subcommands for the monitor binary.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use sysmon::config::ConfigOverrides;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "monitor",
    about = "Background daemon recording CPU, memory, disk and network metrics",
    long_about = "Background daemon recording CPU, memory, disk and network metrics.\n\n\
                  Samples kernel counters at a fixed interval, derives utilization and \
                  per-second rates from consecutive samples and appends one JSON record \
                  per interval to a log file.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (defaults to the configured log_level)
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long, global = true)]
    pub no_config: bool,
}

impl Args {
    /// Overrides shared by every subcommand.
    pub fn base_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config.clone(),
            no_config: self.no_config,
            log_level: self.log_level.map(|l| l.as_str().to_string()),
            ..Default::default()
        }
    }
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the monitor daemon
    Start {
        /// Sampling interval in seconds
        #[arg(short = 'i', long)]
        interval: Option<u64>,

        /// Metrics log path ("-" for stdout)
        #[arg(short = 'l', long)]
        log: Option<PathBuf>,

        /// PID file path
        #[arg(short = 'p', long)]
        pidfile: Option<PathBuf>,

        /// Stay attached to the terminal
        #[arg(short = 'f', long)]
        foreground: bool,
    },

    /// Stop a running daemon
    Stop {
        /// PID file path
        #[arg(short = 'p', long)]
        pidfile: Option<PathBuf>,

        /// Seconds to wait for the daemon to exit (0 = don't wait)
        #[arg(short = 'w', long, default_value_t = 10)]
        wait: u64,
    },

    /// Ask a running daemon to reload its configuration
    Reload {
        /// PID file path
        #[arg(short = 'p', long)]
        pidfile: Option<PathBuf>,
    },

    /// Validate configuration and counter sources
    Check {
        /// Sampling interval in seconds
        #[arg(short = 'i', long)]
        interval: Option<u64>,

        /// Metrics log path ("-" for stdout)
        #[arg(short = 'l', long)]
        log: Option<PathBuf>,

        /// PID file path
        #[arg(short = 'p', long)]
        pidfile: Option<PathBuf>,
    },

    /// Sample in the foreground without daemonizing
    Once {
        /// Number of samples to take (records = samples - 1)
        #[arg(short = 'n', long, default_value_t = 2)]
        samples: usize,

        /// Seconds between samples
        #[arg(short = 'i', long)]
        interval: Option<u64>,

        /// Metrics output path
        #[arg(short = 'l', long, default_value = "-")]
        log: PathBuf,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },
}
