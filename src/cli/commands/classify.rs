//! `udpqa classify`: run the classifier on a recorded test run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Verdict;
use crate::services::{classify, ClassifierInput, RunExitCode};

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Exit code of the test process; omit if it was killed
    #[arg(long, allow_hyphen_values = true)]
    pub exit_code: Option<i32>,

    /// File holding the captured stdout
    #[arg(long)]
    pub stdout: Option<PathBuf>,

    /// File holding the captured stderr
    #[arg(long)]
    pub stderr: Option<PathBuf>,

    /// File holding the mock log
    #[arg(long)]
    pub mock_log: Option<PathBuf>,

    /// The runner killed the test at its timeout
    #[arg(long)]
    pub timed_out: bool,

    /// The mock exited while the test was running
    #[arg(long)]
    pub mock_crashed: bool,
}

#[derive(Debug, Serialize)]
struct ClassifyOutput {
    verdict: Verdict,
}

impl CommandOutput for ClassifyOutput {
    fn to_human(&self) -> String {
        match self.verdict {
            Verdict::AssertionFailure { ref failing_cases } if !failing_cases.is_empty() => {
                let mut lines = vec!["assertion_failure".to_string()];
                lines.extend(failing_cases.iter().map(|case| format!("  {case}")));
                lines.join("\n")
            }
            ref verdict => verdict.to_string(),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn read_optional(path: Option<&Path>) -> Result<String> {
    path.map_or_else(
        || Ok(String::new()),
        |path| {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
        },
    )
}

pub fn execute(args: ClassifyArgs, json_mode: bool) -> Result<RunExitCode> {
    let stdout = read_optional(args.stdout.as_deref())?;
    let stderr = read_optional(args.stderr.as_deref())?;
    let mock_log = read_optional(args.mock_log.as_deref())?;

    let input = ClassifierInput {
        exit_code: args.exit_code,
        timed_out: args.timed_out,
        stdout: &stdout,
        stderr: &stderr,
        mock_crashed: args.mock_crashed,
    };
    output(
        &ClassifyOutput {
            verdict: classify(&input, &mock_log),
        },
        json_mode,
    );
    Ok(RunExitCode::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_output_lists_failing_cases() {
        let output = ClassifyOutput {
            verdict: Verdict::AssertionFailure {
                failing_cases: vec!["a.B.test_c".to_string()],
            },
        };
        assert_eq!(output.to_human(), "assertion_failure\n  a.B.test_c");
        assert_eq!(output.to_json()["verdict"]["kind"], "assertion_failure");
    }

    #[test]
    fn test_missing_input_file_is_an_error() {
        assert!(read_optional(Some(Path::new("/nonexistent/stderr.txt"))).is_err());
        assert_eq!(read_optional(None).unwrap(), "");
    }
}
