use super::Component;
use crate::config::{
    descriptors::{Descriptor, Postprocessor},
    processors::normalize_path,
};
use serde::Deserialize;
use serde_yaml::Value;
use std::{
    fs::OpenOptions,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use thiserror::Error;
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

const STDOUT: &str = "@stdout";
const STDERR: &str = "@stderr";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to open log file {path:?}")]
    Sink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to install the log subscriber: {0}")]
    Init(String),
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl Level {
    fn directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// where log events are written
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sink {
    Stdout,
    Stderr,
    File(PathBuf),
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LoggerConfig {
    #[serde(default)]
    pub level: Level,
    #[serde(default = "enabled")]
    pub ansi: bool,
    #[serde(default)]
    pub target: bool,
    #[serde(default = "default_sink")]
    pub sink: String,
}

fn enabled() -> bool {
    true
}

fn default_sink() -> String {
    STDERR.to_string()
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: Level::default(),
            ansi: enabled(),
            target: false,
            sink: default_sink(),
        }
    }
}

impl LoggerConfig {
    pub fn sink(&self) -> Sink {
        match self.sink.as_str() {
            STDOUT => Sink::Stdout,
            "" | STDERR => Sink::Stderr,
            path => Sink::File(PathBuf::from(path)),
        }
    }
}

/// Global `tracing` subscriber set up from the `logger` section
pub struct Logger;

impl Component for Logger {
    const KEY: &'static str = "logger";

    fn config_schema() -> Descriptor {
        Descriptor::dictionary([
            (
                "level",
                Descriptor::string()
                    .one_of(["TRACE", "DEBUG", "INFO", "WARN", "ERROR"])
                    .with_default("INFO")
                    .with_description("Lowest level of logged events, overridden by RUST_LOG"),
            ),
            (
                "ansi",
                Descriptor::boolean()
                    .with_default(true)
                    .with_description("Whether to color the output"),
            ),
            (
                "target",
                Descriptor::boolean()
                    .with_default(false)
                    .with_description("Whether to print the module an event originates from"),
            ),
            (
                "sink",
                Descriptor::string()
                    .with_default(STDERR)
                    .with_description("@stdout, @stderr or a path to a log file")
                    .with_postprocessor(sink_postprocessor()),
            ),
        ])
        .with_description("Logging setup")
    }
}

/// like `Descriptor::path` but `@stdout` and `@stderr` are kept as they are
pub fn sink_postprocessor() -> Postprocessor {
    Arc::new(|value: Value, source: &Path, _: Option<&Value>| {
        Ok(match value {
            Value::String(sink) if !sink.starts_with('@') => Value::String(
                normalize_path(&sink, source)
                    .to_string_lossy()
                    .into_owned(),
            ),
            other => other,
        })
    })
}

impl Logger {
    /// Install the global subscriber, fails if one is installed already
    pub fn init(config: &LoggerConfig) -> Result<(), LoggingError> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.directive()));

        let (writer, ansi) = match config.sink() {
            Sink::Stdout => (BoxMakeWriter::new(io::stdout), config.ansi),
            Sink::Stderr => (BoxMakeWriter::new(io::stderr), config.ansi),
            Sink::File(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|source| LoggingError::Sink { path, source })?;
                (BoxMakeWriter::new(Mutex::new(file)), false)
            }
        };

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(config.target)
            .try_init()
            .map_err(|err| LoggingError::Init(err.to_string()))
    }
}
