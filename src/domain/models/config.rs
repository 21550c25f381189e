use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure for udpqa
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Worker pool configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Retry budget and reservation retry policy
    #[serde(default)]
    pub refinement: RefinementConfig,

    /// Mock process supervision
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Test artifact execution
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Port reservation
    #[serde(default)]
    pub ports: PortsConfig,

    /// Patch oracle selection
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Post-convergence edge-case phase
    #[serde(default)]
    pub edge_cases: EdgeCaseConfig,

    /// Attempt history persistence
    #[serde(default)]
    pub history: HistoryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Maximum number of sessions running at once (1-64)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Global deadline after which all sessions are cancelled
    #[serde(default)]
    pub global_deadline_secs: Option<u64>,
}

const fn default_max_concurrency() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            global_deadline_secs: None,
        }
    }
}

impl EngineConfig {
    pub fn global_deadline(&self) -> Option<Duration> {
        self.global_deadline_secs.map(Duration::from_secs)
    }
}

/// Refinement loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RefinementConfig {
    /// Repair attempts after the first run; total attempts <= max_retries + 1
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Reservation attempts before a session aborts with `PortUnavailable`
    #[serde(default = "default_port_reserve_attempts")]
    pub port_reserve_attempts: u32,

    /// Initial backoff between reservation attempts
    #[serde(default = "default_port_retry_backoff_ms")]
    pub port_retry_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_port_reserve_attempts() -> u32 {
    3
}

const fn default_port_retry_backoff_ms() -> u64 {
    100
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            port_reserve_attempts: default_port_reserve_attempts(),
            port_retry_backoff_ms: default_port_retry_backoff_ms(),
        }
    }
}

/// How mock readiness is observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessProbe {
    /// Wait for the ready marker in the mock log
    Marker,
    /// Wait until the leased UDP port can no longer be bound.
    /// The probe briefly binds the port itself, which can race a slow mock.
    PortBound,
    /// Either signal
    Any,
}

/// Mock supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SupervisorConfig {
    /// Host passed to mocks as their bind address and to tests as their target
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Log line substring that marks a mock as ready
    #[serde(default = "default_ready_marker")]
    pub ready_marker: String,

    #[serde(default = "default_readiness")]
    pub readiness: ReadinessProbe,

    #[serde(default = "default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,

    /// Readiness poll interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Grace period between SIGTERM and SIGKILL
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// Interpreter used to launch mock artifacts, e.g. `python3`
    #[serde(default)]
    pub interpreter: Option<String>,
}

fn default_bind_host() -> String {
    "127.0.0.1".to_string()
}

fn default_ready_marker() -> String {
    "READY".to_string()
}

const fn default_readiness() -> ReadinessProbe {
    ReadinessProbe::Marker
}

const fn default_readiness_timeout_ms() -> u64 {
    5000
}

const fn default_poll_interval_ms() -> u64 {
    25
}

const fn default_stop_grace_ms() -> u64 {
    2000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            ready_marker: default_ready_marker(),
            readiness: default_readiness(),
            readiness_timeout_ms: default_readiness_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            interpreter: None,
        }
    }
}

impl SupervisorConfig {
    pub const fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Test runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    /// Hard wall-clock timeout per test run
    #[serde(default = "default_runner_timeout_ms")]
    pub timeout_ms: u64,

    /// Interpreter used to launch test artifacts
    #[serde(default)]
    pub interpreter: Option<String>,
}

const fn default_runner_timeout_ms() -> u64 {
    60_000
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_runner_timeout_ms(),
            interpreter: None,
        }
    }
}

impl RunnerConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Port allocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PortsConfig {
    /// First port of the deterministic fallback range
    #[serde(default = "default_fallback_start")]
    pub fallback_start: u16,

    /// Last port of the fallback range (inclusive)
    #[serde(default = "default_fallback_end")]
    pub fallback_end: u16,

    /// How long a released port is skipped before being handed out again
    #[serde(default = "default_release_cooldown_ms")]
    pub release_cooldown_ms: u64,
}

const fn default_fallback_start() -> u16 {
    40000
}

const fn default_fallback_end() -> u16 {
    40999
}

const fn default_release_cooldown_ms() -> u64 {
    250
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            fallback_start: default_fallback_start(),
            fallback_end: default_fallback_end(),
            release_cooldown_ms: default_release_cooldown_ms(),
        }
    }
}

/// Which patch oracle implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleKind {
    /// Never proposes changes
    None,
    /// External command speaking JSON on stdin/stdout
    Command,
    /// Ollama-style HTTP generate endpoint
    Http,
}

/// Patch oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OracleConfig {
    #[serde(default = "default_oracle_kind")]
    pub kind: OracleKind,

    /// Per-call timeout
    #[serde(default = "default_oracle_timeout_ms")]
    pub timeout_ms: u64,

    /// Program for the command oracle
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Endpoint for the HTTP oracle
    #[serde(default)]
    pub url: Option<String>,

    /// Model name forwarded to the HTTP oracle
    #[serde(default = "default_oracle_model")]
    pub model: String,

    /// Calls allowed per minute across all sessions
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

const fn default_oracle_kind() -> OracleKind {
    OracleKind::None
}

const fn default_oracle_timeout_ms() -> u64 {
    120_000
}

fn default_oracle_model() -> String {
    "llama3:latest".to_string()
}

const fn default_requests_per_minute() -> u32 {
    30
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            kind: default_oracle_kind(),
            timeout_ms: default_oracle_timeout_ms(),
            command: None,
            args: vec![],
            url: None,
            model: default_oracle_model(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

impl OracleConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Post-convergence edge-case phase configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EdgeCaseConfig {
    /// Ask the oracle for edge-case sub-sessions after convergence
    #[serde(default)]
    pub enabled: bool,

    /// Whether failing edge cases make the process exit non-zero
    #[serde(default)]
    pub gate_exit_code: bool,

    /// Where sub-session artifact copies are written; defaults next to the mock
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

/// Attempt history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HistoryConfig {
    #[serde(default = "default_history_dir")]
    pub dir: PathBuf,
}

fn default_history_dir() -> PathBuf {
    PathBuf::from(".udpqa/history")
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: default_history_dir(),
        }
    }
}

pub use crate::infrastructure::logging::config::{LogFormat, LoggingConfig};
