pub mod config;
pub mod logging;
pub mod paths;

pub use config::{
    Config, ConfigError, HandshakeMode, LogLevel, LoggingConfig, MismatchPolicy,
    ValidationError, WorkerConfig,
};
pub use logging::{init_logging, LoggingError, LoggingGuard};
pub use paths::{AppDirs, DirsError};

pub const APP_NAME: &str = "courier";
pub const APP_AUTHOR: &str = "Courier";
pub const APP_QUALIFIER: &str = "io";
