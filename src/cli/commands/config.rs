//! `udpqa config`: print the effective configuration.

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::services::RunExitCode;

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct ConfigOutput(Config);

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.0).unwrap_or_default()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or_default()
    }
}

pub fn execute(config: Config, json_mode: bool) -> Result<RunExitCode> {
    output(&ConfigOutput(config), json_mode);
    Ok(RunExitCode::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_output_is_loadable_yaml() {
        let human = ConfigOutput(Config::default()).to_human();
        let parsed: Config = serde_yaml::from_str(&human).unwrap();
        assert_eq!(parsed.supervisor.ready_marker, "READY");
    }
}
