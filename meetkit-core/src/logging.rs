//! `tracing` subscriber bootstrap
//!
//! The SDK only emits events. Hosts with their own subscriber never call
//! into this module; [`init_logging`] is for hosts that want the SDK to set
//! one up from [`LoggingConfig`].

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{LogFormat, LoggingConfig};

/// Crates whose events follow [`LoggingConfig::level`]
pub const SDK_TARGETS: [&str; 2] = ["meetkit_core", "meetkit_rtc"];

/// Filter scoped to the SDK
///
/// `RUST_LOG` takes over when set. Otherwise the configured level applies
/// to [`SDK_TARGETS`] and every other target is held at warn.
pub fn sdk_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let level = parse_level(&config.level)?;
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::new("warn");
    for target in SDK_TARGETS {
        filter = filter.add_directive(format!("{target}={level}").parse()?);
    }
    Ok(filter)
}

/// Install a global subscriber for the SDK's events
///
/// Fails if the level is invalid, the log file cannot be opened, or a
/// global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = sdk_filter(config)?;
    let writer = match &config.file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_writer(writer),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(config.file_path.is_none())
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(false)
                    .with_writer(writer),
            )
            .try_init()?,
    }

    Ok(())
}

fn parse_level(level: &str) -> anyhow::Result<LevelFilter> {
    match level.to_ascii_lowercase().as_str() {
        "off" => Ok(LevelFilter::OFF),
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}
