//! The `[logging]` section of the harness configuration
//!
//! Every field has a default, so a config file may set only what it needs,
//! for example `HARNESS__LOGGING__LEVEL=debug` to watch pushes arrive.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Name used in `EnvFilter` directives
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Where events are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
}

/// How often the log file rolls over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Falls back to the per-user data directory when file output is on
    #[serde(default)]
    pub log_directory: Option<PathBuf>,

    /// Overrides keyed by target, e.g. `harness_sync::sync` or `tower_http`
    #[serde(default)]
    pub module_levels: HashMap<String, LogLevel>,

    #[serde(default = "default_true")]
    pub include_target: bool,

    #[serde(default)]
    pub include_thread_id: bool,

    /// Source file and line of each event
    #[serde(default)]
    pub include_file_info: bool,

    #[serde(default)]
    pub rotation: RotationStrategy,
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
            output: LogOutput::Console,
            log_directory: None,
            module_levels: HashMap::new(),
            include_target: true,
            include_thread_id: false,
            include_file_info: false,
            rotation: RotationStrategy::Daily,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_log_directory(mut self, dir: PathBuf) -> Self {
        self.log_directory = Some(dir);
        self
    }

    pub fn with_module_level(mut self, target: impl Into<String>, level: LogLevel) -> Self {
        self.module_levels.insert(target.into(), level);
        self
    }

    pub fn with_rotation(mut self, rotation: RotationStrategy) -> Self {
        self.rotation = rotation;
        self
    }

    /// Console output that traces every chunk and commit of a push
    ///
    /// Request spans from `tower_http` stay at debug so they don't drown
    /// the per-chunk events.
    pub fn push_debugging() -> Self {
        Self::new()
            .with_level(LogLevel::Debug)
            .with_module_level("harness_sync::sync", LogLevel::Trace)
            .with_module_level("tower_http", LogLevel::Debug)
            .with_rotation(RotationStrategy::Never)
            .with_file_info()
    }

    /// JSON on the console plus daily files, for a harness left running on a device
    pub fn unattended() -> Self {
        Self::new()
            .with_format(LogFormat::Json)
            .with_output(LogOutput::Both)
            .with_log_directory(default_log_directory())
    }

    fn with_file_info(mut self) -> Self {
        self.include_file_info = true;
        self.include_thread_id = true;
        self
    }
}

pub(crate) fn default_log_directory() -> PathBuf {
    directories::ProjectDirs::from("org", "harness", "harness-sync")
        .map(|dirs| dirs.data_local_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}
