use crate::paths::AppDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const CURRENT_CONFIG_VERSION: u32 = 1;

pub const DEFAULT_HANDSHAKE_EVENT: &str = "server.connected";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            logging: LoggingConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
    #[serde(default = "default_stderr_enabled")]
    pub stderr: bool,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_log_files: default_max_log_files(),
            stderr: default_stderr_enabled(),
            file_name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
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
    pub fn as_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// What to do with the first line the worker prints after it starts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeMode {
    /// Require `{"event": <handshake_event>}`; fail startup otherwise.
    #[default]
    Validate,
    /// Read and discard the line without looking at it.
    Discard,
    /// Do not pre-read anything.
    None,
}

/// What to do when a response reaches its consumer but its result cannot be
/// decoded into the shape the consumer expects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Hand the consumer a decode error.
    #[default]
    Report,
    /// Log and drop the response; the consumer is never invoked.
    Drop,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Interpreter or runtime that hosts the worker script.
    #[serde(default)]
    pub runtime_path: Option<PathBuf>,
    #[serde(default)]
    pub script_path: Option<PathBuf>,
    /// Extra arguments appended after the script path.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub handshake: HandshakeMode,
    #[serde(default = "default_handshake_event")]
    pub handshake_event: String,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Per-request deadline. Absent means requests wait forever.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub mismatch_policy: MismatchPolicy,
    #[serde(default)]
    pub kill_on_drop: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            runtime_path: None,
            script_path: None,
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            handshake: HandshakeMode::default(),
            handshake_event: default_handshake_event(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            request_timeout_ms: None,
            poll_interval_ms: default_poll_interval_ms(),
            mismatch_policy: MismatchPolicy::default(),
            kill_on_drop: false,
        }
    }
}

impl WorkerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Both paths, or the first one that is missing.
    pub fn command_paths(&self) -> Result<(PathBuf, PathBuf), ValidationError> {
        let runtime = self
            .runtime_path
            .clone()
            .ok_or(ValidationError::MissingWorkerPath { field: "runtime_path" })?;
        let script = self
            .script_path
            .clone()
            .ok_or(ValidationError::MissingWorkerPath { field: "script_path" })?;
        Ok((runtime, script))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("config validation failed: {0}")]
    Validation(ValidationError),
    #[error("failed to prepare configuration directories: {0}")]
    Directories(#[from] crate::paths::DirsError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported config_version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("worker.{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("worker.handshake_event must not be empty when handshake = \"validate\"")]
    EmptyHandshakeEvent,
    #[error("worker.{field} is not set (configure it or pass it on the command line)")]
    MissingWorkerPath { field: &'static str },
}

impl Config {
    pub fn load_or_default(dirs: &AppDirs) -> Result<Self, ConfigError> {
        dirs.ensure_exists()?;
        let path = Self::config_path(dirs);
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    pub fn config_path(dirs: &AppDirs) -> PathBuf {
        dirs.config_dir().join("config.toml")
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.config_version != CURRENT_CONFIG_VERSION {
            return Err(ValidationError::UnsupportedVersion {
                found: self.config_version,
                expected: CURRENT_CONFIG_VERSION,
            });
        }
        if self.worker.poll_interval_ms == 0 {
            return Err(ValidationError::ZeroDuration {
                field: "poll_interval_ms",
            });
        }
        if self.worker.handshake_timeout_ms == 0 {
            return Err(ValidationError::ZeroDuration {
                field: "handshake_timeout_ms",
            });
        }
        if self.worker.request_timeout_ms == Some(0) {
            return Err(ValidationError::ZeroDuration {
                field: "request_timeout_ms",
            });
        }
        if self.worker.handshake == HandshakeMode::Validate
            && self.worker.handshake_event.trim().is_empty()
        {
            return Err(ValidationError::EmptyHandshakeEvent);
        }
        Ok(())
    }
}

fn default_config_version() -> u32 {
    CURRENT_CONFIG_VERSION
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_max_log_files() -> usize {
    7
}

fn default_stderr_enabled() -> bool {
    true
}

fn default_handshake_event() -> String {
    DEFAULT_HANDSHAKE_EVENT.to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.logging.max_log_files, 7);
        assert!(config.logging.stderr);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.worker.handshake, HandshakeMode::Validate);
        assert_eq!(config.worker.handshake_event, "server.connected");
        assert_eq!(config.worker.mismatch_policy, MismatchPolicy::Report);
        assert!(config.worker.request_timeout().is_none());
    }

    #[test]
    fn invalid_version_rejected() {
        let mut config = Config::default();
        config.config_version = CURRENT_CONFIG_VERSION + 1;
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ValidationError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let mut config = Config::default();
        config.worker.poll_interval_ms = 0;
        assert_eq!(
            config.validate(),
            Err(ValidationError::ZeroDuration {
                field: "poll_interval_ms"
            })
        );
    }

    #[test]
    fn empty_handshake_event_only_matters_when_validating() {
        let mut config = Config::default();
        config.worker.handshake_event = " ".into();
        assert_eq!(
            config.validate(),
            Err(ValidationError::EmptyHandshakeEvent)
        );

        config.worker.handshake = HandshakeMode::Discard;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn worker_section_parses_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [worker]
            runtime_path = "/usr/bin/dart"
            script_path = "server.dart"
            args = ["--no-error-notification"]
            handshake = "discard"
            request_timeout_ms = 2500
            mismatch_policy = "drop"

            [worker.env]
            ANALYZER_LOG = "1"
            "#,
        )
        .expect("config should parse");

        assert!(config.validate().is_ok());
        let (runtime, script) = config.worker.command_paths().unwrap();
        assert_eq!(runtime, PathBuf::from("/usr/bin/dart"));
        assert_eq!(script, PathBuf::from("server.dart"));
        assert_eq!(config.worker.handshake, HandshakeMode::Discard);
        assert_eq!(
            config.worker.request_timeout(),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(config.worker.mismatch_policy, MismatchPolicy::Drop);
        assert_eq!(config.worker.env.get("ANALYZER_LOG").map(String::as_str), Some("1"));
        assert_eq!(config.worker.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn missing_script_path_is_reported() {
        let worker = WorkerConfig {
            runtime_path: Some("dart".into()),
            ..WorkerConfig::default()
        };
        assert_eq!(
            worker.command_paths(),
            Err(ValidationError::MissingWorkerPath {
                field: "script_path"
            })
        );
    }

    #[test]
    fn load_reads_file_from_config_dir() {
        let root = tempfile::tempdir().unwrap();
        let dirs = AppDirs::under(root.path());
        dirs.ensure_exists().unwrap();
        fs::write(
            Config::config_path(&dirs),
            "[logging]\nlevel = \"debug\"\n[worker]\npoll_interval_ms = 5\n",
        )
        .unwrap();

        let config = Config::load_or_default(&dirs).expect("config should load");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.worker.poll_interval_ms, 5);
    }

    #[test]
    fn load_without_file_returns_defaults() {
        let root = tempfile::tempdir().unwrap();
        let dirs = AppDirs::under(root.path());
        let config = Config::load_or_default(&dirs).expect("defaults");
        assert_eq!(config.config_version, CURRENT_CONFIG_VERSION);
        assert!(dirs.config_dir().is_dir());
    }
}
