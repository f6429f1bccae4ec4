// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use common_config::Configurable;
use common_telemetry::tracing_appender::non_blocking::WorkerGuard;
use common_telemetry::{info, warn};
use segment_rebuild::driver::RunSummary;
use segment_rebuild::options::ENV_PREFIX;
use segment_rebuild::{PhaseDriver, PhaseSelector, RebuildContext, RebuildOptions};
use snafu::ResultExt;

use crate::error::{BuildContextSnafu, LoadOptionsSnafu, ParsePhaseSnafu, RebuildSnafu, Result};
use crate::options::GlobalOptions;
use crate::{App, EXIT_SUCCESS, EXIT_VALIDATION_FAILURE};

pub const APP_NAME: &str = "segment-rebuild";

/// Runs phases of the segment index rebuild.
#[derive(Debug, Parser)]
pub struct Command {
    /// Path of a TOML config file.
    #[clap(short, long)]
    pub config_file: Option<String>,

    /// Prefix of environment variables overriding options.
    #[clap(long, default_value = ENV_PREFIX)]
    pub env_prefix: String,

    /// Phases to run: a number in 1-6, a comma separated list, or `all`.
    /// Nothing runs if blank.
    #[clap(long, env = "PHASE")]
    pub phase: Option<String>,

    /// Alias of `--phase`, read when `--phase` is absent.
    #[clap(long, env = "PHASES", hide = true)]
    pub phases: Option<String>,
}

impl Command {
    /// The phase selector input, `--phase` first then `--phases`.
    pub fn phase_input(&self) -> &str {
        self.phase
            .as_deref()
            .or(self.phases.as_deref())
            .unwrap_or_default()
    }

    pub fn load_options(&self, global_options: &GlobalOptions) -> Result<RebuildOptions> {
        let mut opts = RebuildOptions::load_layered_options(
            self.config_file.as_deref(),
            self.env_prefix.as_str(),
        )
        .context(LoadOptionsSnafu)?;

        if let Some(dir) = &global_options.log_dir {
            opts.logging.dir.clone_from(dir);
        }
        if global_options.log_level.is_some() {
            opts.logging.level.clone_from(&global_options.log_level);
        }

        Ok(opts)
    }

    pub fn build(&self, opts: RebuildOptions) -> Result<Instance> {
        let guard = common_telemetry::init_global_logging(APP_NAME, &opts.logging);
        crate::log_versions(APP_NAME);

        let selector = PhaseSelector::parse(self.phase_input()).context(ParsePhaseSnafu)?;
        info!(
            "Segment rebuild options: table: {}, family: {}, staging: {}, phases: {:?}",
            opts.store.table,
            opts.store.column_family,
            opts.staging.root,
            selector.phases()
        );

        let ctx = RebuildContext::from_options(opts).context(BuildContextSnafu)?;
        let driver = PhaseDriver::new(Arc::new(ctx));
        Ok(Instance::new(driver, selector, guard))
    }
}

pub struct Instance {
    driver: PhaseDriver,
    selector: PhaseSelector,
    summary: Option<RunSummary>,

    // Keep the logging guard to prevent the worker from being dropped.
    _guard: Vec<WorkerGuard>,
}

impl Instance {
    fn new(driver: PhaseDriver, selector: PhaseSelector, guard: Vec<WorkerGuard>) -> Self {
        Self {
            driver,
            selector,
            summary: None,
            _guard: guard,
        }
    }

    /// Summary of the last completed run.
    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    /// Exit code of the last completed run, signaling verification mismatches.
    pub fn exit_code(&self) -> u8 {
        let failure = self
            .summary
            .as_ref()
            .and_then(|s| s.validation.as_ref())
            .map(|v| v.failure)
            .unwrap_or(0);
        if failure > 0 {
            warn!("Verification found {} mismatched users", failure);
            EXIT_VALIDATION_FAILURE
        } else {
            EXIT_SUCCESS
        }
    }
}

#[async_trait]
impl App for Instance {
    fn name(&self) -> &str {
        APP_NAME
    }

    async fn start(&mut self) -> Result<()> {
        let summary = self
            .driver
            .run(&self.selector)
            .await
            .context(RebuildSnafu)?;
        self.summary = Some(summary);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        warn!("Segment rebuild stopped, rerun the interrupted phase");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        let cmd = Command::parse_from([
            APP_NAME,
            "--config-file",
            "/tmp/rebuild.toml",
            "--phase",
            "1,2",
        ]);
        assert_eq!(Some("/tmp/rebuild.toml"), cmd.config_file.as_deref());
        assert_eq!(ENV_PREFIX, cmd.env_prefix);
        assert_eq!("1,2", cmd.phase_input());
    }

    #[test]
    fn test_phase_from_env() {
        temp_env::with_vars([("PHASE", Some("all")), ("PHASES", None)], || {
            let cmd = Command::parse_from([APP_NAME]);
            assert_eq!("all", cmd.phase_input());
        });
        temp_env::with_vars_unset(["PHASE", "PHASES"], || {
            let cmd = Command::parse_from([APP_NAME]);
            assert_eq!("", cmd.phase_input());
        });
    }

    #[test]
    fn test_phases_alias() {
        temp_env::with_vars([("PHASE", None), ("PHASES", Some("3,5"))], || {
            let cmd = Command::parse_from([APP_NAME]);
            assert_eq!("3,5", cmd.phase_input());

            // The primary variable wins.
            let cmd = Command::parse_from([APP_NAME, "--phase", "6"]);
            assert_eq!("6", cmd.phase_input());
        });
        temp_env::with_vars([("PHASE", Some("1")), ("PHASES", Some("2"))], || {
            let cmd = Command::parse_from([APP_NAME]);
            assert_eq!("1", cmd.phase_input());
        });
    }

    #[test]
    fn test_global_options_override_logging() {
        temp_env::with_vars_unset(["PHASE", "PHASES"], || {
            let cmd = Command::parse_from([APP_NAME, "--env-prefix", "SEGMENT_REBUILD_TEST_CMD"]);
            let opts = cmd
                .load_options(&GlobalOptions {
                    log_dir: Some("/tmp/segment_rebuild/logs".to_string()),
                    log_level: Some("debug".to_string()),
                })
                .unwrap();
            assert_eq!("/tmp/segment_rebuild/logs", opts.logging.dir);
            assert_eq!(Some("debug".to_string()), opts.logging.level);
        });
    }
}
