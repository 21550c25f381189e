use std::path::PathBuf;

use clap::Parser;
use udpqa::cli::{Cli, Commands};

#[test]
fn test_parse_run_with_overrides() {
    let cli = Cli::try_parse_from(vec![
        "udpqa",
        "run",
        "--services",
        "services.yaml",
        "--max-retries",
        "5",
        "--concurrency",
        "2",
        "--deadline-secs",
        "600",
        "--edge-cases",
    ])
    .unwrap();

    assert!(!cli.json);
    match cli.command {
        Commands::Run(args) => {
            assert_eq!(args.services, PathBuf::from("services.yaml"));
            assert_eq!(args.max_retries, Some(5));
            assert_eq!(args.concurrency, Some(2));
            assert_eq!(args.deadline_secs, Some(600));
            assert!(args.edge_cases);
        }
        _ => panic!("Wrong command"),
    }
}

#[test]
fn test_parse_run_requires_services() {
    assert!(Cli::try_parse_from(vec!["udpqa", "run"]).is_err());
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(vec![
        "udpqa",
        "config",
        "--json",
        "--config",
        "ci/udpqa.yaml",
    ])
    .unwrap();

    assert!(cli.json);
    assert_eq!(cli.config, Some(PathBuf::from("ci/udpqa.yaml")));
    assert!(matches!(cli.command, Commands::Config));
}

#[test]
fn test_parse_classify_with_negative_exit_code() {
    let cli = Cli::try_parse_from(vec![
        "udpqa",
        "classify",
        "--exit-code",
        "-1",
        "--stderr",
        "stderr.txt",
        "--mock-crashed",
    ])
    .unwrap();

    match cli.command {
        Commands::Classify(args) => {
            assert_eq!(args.exit_code, Some(-1));
            assert_eq!(args.stderr, Some(PathBuf::from("stderr.txt")));
            assert_eq!(args.stdout, None);
            assert!(args.mock_crashed);
            assert!(!args.timed_out);
        }
        _ => panic!("Wrong command"),
    }
}

#[test]
fn test_unknown_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(vec!["udpqa", "swarm", "start"]).is_err());
}
