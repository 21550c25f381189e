//! CLI command implementations.

pub mod classify;
pub mod config;
pub mod run;

use std::path::Path;

use anyhow::Result;

use crate::domain::models::Config;
use crate::infrastructure::ConfigLoader;

/// Load configuration, from `path` if given, else from the project hierarchy.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}
