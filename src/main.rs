//! monitor - system metrics daemon
//!
//! Entry point: parses the command line, initializes tracing and dispatches
//! to a subcommand. The exit code follows [`sysmon::error::ExitStatus`].

mod cli;
mod commands;

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing::debug;

use cli::{Args, Commands, LogLevel};
use commands::{
    command_check, command_config, command_once, command_reload, command_start, command_stop,
};
use sysmon::config::resolve_config;

/// Initializes tracing logging subsystem with the configured log level.
///
/// Diagnostics go to standard error, which a detached daemon redirects to
/// its daemon log.
fn setup_logging(level: LogLevel, ansi: bool) {
    let max_level = match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    debug!("Logging initialized with level: {:?}", level);
}

/// CLI flag first, then the configured `log_level`, then info.
fn effective_log_level(args: &Args) -> LogLevel {
    if let Some(level) = args.log_level {
        return level;
    }
    resolve_config(&args.base_overrides())
        .ok()
        .and_then(|cfg| LogLevel::from_str(&cfg.log_level, true).ok())
        .unwrap_or(LogLevel::Info)
}

fn main() -> ExitCode {
    let args = Args::parse();

    // A detached daemon writes diagnostics to a file; keep escape codes out of it
    let detaching = matches!(
        args.command,
        Commands::Start {
            foreground: false,
            ..
        }
    );
    setup_logging(effective_log_level(&args), !detaching);

    let base = args.base_overrides();
    let status = match args.command {
        Commands::Start {
            interval,
            log,
            pidfile,
            foreground,
        } => command_start(base, interval, log, pidfile, foreground),
        Commands::Stop { pidfile, wait } => command_stop(base, pidfile, wait),
        Commands::Reload { pidfile } => command_reload(base, pidfile),
        Commands::Check {
            interval,
            log,
            pidfile,
        } => command_check(base, interval, log, pidfile),
        Commands::Once {
            samples,
            interval,
            log,
        } => command_once(base, samples, interval, log),
        Commands::Config {
            output,
            format,
            commented,
        } => command_config(output, format, commented),
    };

    status.into()
}
