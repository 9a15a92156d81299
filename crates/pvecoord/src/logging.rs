//! Logging setup.
//!
//! `RUST_LOG` wins when set. Otherwise the filter is built from
//! `LogConfig::levels`, where the `_default` key sets the base level and every
//! other key is a tracing target. With logging disabled all output is squashed.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ConfigError;

const DEFAULT_LOGGER: &str = "_default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub enable: bool,
    pub file: PathBuf,
    /// Logger (tracing target) to level, e.g. `{"_default": "info", "pvecoord::gate": "trace"}`.
    pub levels: BTreeMap<String, String>,
}

impl LogConfig {
    /// Check every configured level, whether or not logging is enabled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (logger, level) in &self.levels {
            normalize_level(logger, level)?;
        }
        Ok(())
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enable: false,
            file: PathBuf::from("pvecoord.log"),
            levels: BTreeMap::new(),
        }
    }
}

fn normalize_level(logger: &str, level: &str) -> Result<&'static str, ConfigError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        "off" | "none" => Ok("off"),
        _ => Err(ConfigError::InvalidLogLevel {
            logger: logger.to_string(),
            level: level.to_string(),
        }),
    }
}

/// Filter directives for `config`, e.g. `debug,pvecoord::gate=trace`.
pub fn directives(config: &LogConfig) -> Result<String, ConfigError> {
    config.validate()?;
    if !config.enable {
        return Ok("off".to_string());
    }

    let mut base = "info";
    let mut targets = Vec::new();
    for (logger, level) in &config.levels {
        let level = normalize_level(logger, level)?;
        if logger == DEFAULT_LOGGER {
            base = level;
        } else {
            targets.push(format!("{logger}={level}"));
        }
    }

    let mut out = base.to_string();
    for target in targets {
        out.push(',');
        out.push_str(&target);
    }
    Ok(out)
}

pub(crate) fn open_log_file(path: &Path) -> Result<File, ConfigError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ConfigError::LogFile {
            path: path.display().to_string(),
            source,
        })
}

/// Install the global subscriber. A subscriber that is already installed is kept.
pub fn init_logging(config: &LogConfig) -> Result<(), ConfigError> {
    config.validate()?;
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(directives(config)?)
    };

    let (writer, ansi) = if config.enable {
        let file = open_log_file(&config.file)?;
        (BoxMakeWriter::new(Mutex::new(file)), false)
    } else {
        (BoxMakeWriter::new(std::io::stderr), true)
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(writer));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(ansi).with_writer(writer));
        let _ = subscriber.try_init();
    }

    Ok(())
}
