//! udpqa CLI entry point.

use clap::Parser;

use udpqa::cli::commands::{self, load_config};
use udpqa::cli::{handle_error, Cli, Commands};
use udpqa::infrastructure::LoggerImpl;
use udpqa::RunExitCode;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            handle_error(&err, cli.json);
            std::process::exit(RunExitCode::Usage.code());
        }
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("warning: logging disabled: {err}");
            None
        }
    };

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, config, cli.json).await,
        Commands::Config => commands::config::execute(config, cli.json),
        Commands::Classify(args) => commands::classify::execute(args, cli.json),
    };

    let code = match result {
        Ok(code) => code,
        Err(err) => {
            handle_error(&err, cli.json);
            // Runtime failures land in the report; errors here are bad input.
            RunExitCode::Usage
        }
    };
    std::process::exit(code.code());
}
