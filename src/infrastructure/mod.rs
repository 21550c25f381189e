//! Infrastructure layer
//!
//! Configuration loading, logging setup and attempt history persistence.

pub mod config;
pub mod history;
pub mod logging;

pub use config::{ConfigError, ConfigLoader};
pub use history::HistoryWriter;
pub use logging::LoggerImpl;
