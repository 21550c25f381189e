//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - Pretty or JSON console output on stderr
//! - Optional rotating JSON log files

pub mod config;
pub mod logger;

pub use config::{LogFormat, LoggingConfig, RotationPolicy};
pub use logger::LoggerImpl;
