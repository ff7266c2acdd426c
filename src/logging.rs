//! Logging System
//!
//! Structured logging via the `tracing` crate. Level, format, and output
//! destination come from [`LoggingConfig`], normally embedded in
//! [`DriveConfig`](crate::config::DriveConfig).

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Whether logging is enabled (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file, file+stderr
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path when output includes file; None means use runtime default
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Enable colored output (text format only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: None,
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

/// Resolve the log file path with precedence: VDRIVE_LOG_FILE env, config
/// file entry, platform state directory default.
pub fn resolve_log_file_path(config_file: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var("VDRIVE_LOG_FILE") {
        if !env_path.is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }
    if let Some(p) = config_file {
        if !p.as_os_str().is_empty() {
            return Ok(p);
        }
    }
    let project_dirs = directories::ProjectDirs::from("", "vdrive", "vdrive")
        .context("could not determine platform state directory for log file")?;
    let dir = project_dirs
        .state_dir()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
    Ok(dir.join("vdrive.log"))
}

/// Initialize the global tracing subscriber from config.
///
/// Safe to call once per process; a second call fails with the subscriber
/// library's init error.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("invalid log level '{}'", config.level))?;
    for (module, level) in &config.modules {
        let directive = format!("{}={}", module, level)
            .parse()
            .with_context(|| format!("invalid module log level '{}={}'", module, level))?;
        filter = filter.add_directive(directive);
    }

    let writer = make_writer(config)?;
    let registry = Registry::default().with(filter);

    if config.format == "json" {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init()
            .context("failed to initialize logging")?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(config.color && config.output != "file")
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init()
            .context("failed to initialize logging")?;
    }
    Ok(())
}

fn make_writer(config: &LoggingConfig) -> anyhow::Result<BoxMakeWriter> {
    match config.output.as_str() {
        "stdout" => Ok(BoxMakeWriter::new(std::io::stdout)),
        "stderr" => Ok(BoxMakeWriter::new(std::io::stderr)),
        "file" | "file+stderr" => {
            let path = resolve_log_file_path(config.file.clone())?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create log directory {}", parent.display())
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let file = Arc::new(file);
            if config.output == "file+stderr" {
                Ok(BoxMakeWriter::new(
                    (move || Arc::clone(&file)).and(std::io::stderr),
                ))
            } else {
                Ok(BoxMakeWriter::new(move || Arc::clone(&file)))
            }
        }
        other => anyhow::bail!("unknown log output '{}'", other),
    }
}
