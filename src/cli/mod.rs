//! Command-line interface.

pub mod commands;
pub mod output;
pub mod table;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use commands::{classify::ClassifyArgs, run::RunArgs};

#[derive(Parser, Debug)]
#[command(name = "udpqa")]
#[command(about = "Supervise UDP mocks, run their test suites, and repair until they agree", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file, replacing .udpqa/config.yaml and .udpqa/local.yaml
    #[arg(short, long, global = true, env = "UDPQA_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every service in a spec file to a verdict
    Run(RunArgs),

    /// Show the effective configuration
    Config,

    /// Classify a recorded test run offline
    Classify(ClassifyArgs),
}

/// Report a command error on stderr, as JSON when requested.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) {
    if json_mode {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": chain,
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err}", style("error:").red().bold());
        for cause in err.chain().skip(1) {
            eprintln!("  {} {cause}", style("caused by:").dim());
        }
    }
}
