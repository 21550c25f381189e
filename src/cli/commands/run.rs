//! `udpqa run`: drive every service in a spec file to a verdict.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::adapters::{build_oracle, FsArtifactStore};
use crate::cli::output::{output, truncate, CommandOutput};
use crate::cli::table::{list_table, styled_verdict};
use crate::domain::models::{Config, ServiceSpec, SessionVerdict};
use crate::infrastructure::ConfigLoader;
use crate::services::{cancellation, Engine, EngineReport, RunExitCode};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML or JSON file listing the services to run
    #[arg(short, long)]
    pub services: PathBuf,

    /// Override refinement.max_retries
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Override engine.max_concurrency
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Cancel all sessions after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Run oracle-suggested edge cases after convergence
    #[arg(long)]
    pub edge_cases: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SpecFile {
    List(Vec<ServiceSpec>),
    Wrapped { services: Vec<ServiceSpec> },
}

/// Read service specs from YAML (JSON is accepted as a YAML subset).
pub fn load_specs(path: &Path) -> Result<Vec<ServiceSpec>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read service specs from {}", path.display()))?;
    let parsed: SpecFile = serde_yaml::from_str(&body)
        .with_context(|| format!("Failed to parse service specs in {}", path.display()))?;
    Ok(match parsed {
        SpecFile::List(specs) | SpecFile::Wrapped { services: specs } => specs,
    })
}

fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(max_retries) = args.max_retries {
        config.refinement.max_retries = max_retries;
    }
    if let Some(concurrency) = args.concurrency {
        config.engine.max_concurrency = concurrency;
    }
    if let Some(deadline) = args.deadline_secs {
        config.engine.global_deadline_secs = Some(deadline);
    }
    if args.edge_cases {
        config.edge_cases.enabled = true;
    }
}

pub async fn execute(args: RunArgs, mut config: Config, json_mode: bool) -> Result<RunExitCode> {
    apply_overrides(&mut config, &args);
    ConfigLoader::validate(&config)?;
    let specs = load_specs(&args.services)?;

    let oracle = build_oracle(&config.oracle).context("Failed to build patch oracle")?;
    let engine = Engine::from_config(&config, oracle, Arc::new(FsArtifactStore::new()))?;

    let (handle, signal) = cancellation();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling sessions");
            handle.cancel();
        }
    });
    let report = engine.run(specs, signal).await;
    interrupt.abort();
    let report = report?;

    let exit_code = report.exit_code(config.edge_cases.gate_exit_code);
    output(&RunOutput::new(&report, exit_code), json_mode);
    Ok(exit_code)
}

#[derive(Debug, Serialize)]
struct ServiceRow {
    service: String,
    verdict: Option<SessionVerdict>,
    attempts: usize,
    port: Option<u16>,
    substituted: bool,
    edge_cases_converged: usize,
    edge_cases_total: usize,
    abort_reason: Option<String>,
    history_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RunOutput {
    services: Vec<ServiceRow>,
    exit_code: i32,
}

impl RunOutput {
    fn new(report: &EngineReport, exit_code: RunExitCode) -> Self {
        let services = report
            .services
            .iter()
            .map(|service| {
                let result = &service.result;
                ServiceRow {
                    service: result.service_id().to_string(),
                    verdict: result.verdict(),
                    attempts: result.attempt_count(),
                    port: result.last_attempt().map(|attempt| attempt.port),
                    substituted: !result.port_substitutions().is_empty(),
                    edge_cases_converged: result
                        .edge_cases()
                        .iter()
                        .filter(|edge| edge.verdict() == Some(SessionVerdict::Converged))
                        .count(),
                    edge_cases_total: result.edge_cases().len(),
                    abort_reason: result.abort_reason().map(str::to_string),
                    history_path: service.history_path.clone(),
                }
            })
            .collect();
        Self {
            services,
            exit_code: exit_code.code(),
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        if self.services.is_empty() {
            return "No services found.".to_string();
        }

        let mut table = list_table(&["Service", "Verdict", "Attempts", "Port", "Edge cases", "History"]);
        for row in &self.services {
            let port = row.port.map_or_else(
                || "-".to_string(),
                |port| if row.substituted { format!("{port}*") } else { port.to_string() },
            );
            let edge = if row.edge_cases_total == 0 {
                "-".to_string()
            } else {
                format!("{}/{}", row.edge_cases_converged, row.edge_cases_total)
            };
            let history = row
                .history_path
                .as_ref()
                .map_or_else(|| "-".to_string(), |path| path.display().to_string());
            table.add_row(vec![
                row.service.clone(),
                styled_verdict(row.verdict).to_string(),
                row.attempts.to_string(),
                port,
                edge,
                history,
            ]);
        }

        let mut lines = vec![table.to_string()];
        for row in &self.services {
            if let Some(ref reason) = row.abort_reason {
                lines.push(format!("{}: aborted: {}", row.service, truncate(reason, 120)));
            }
        }
        if self.services.iter().any(|row| row.substituted) {
            lines.push("* port substituted; see history for details".to_string());
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
