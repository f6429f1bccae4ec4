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

use std::process::ExitCode;

use clap::Parser;
use common_telemetry::error;
use common_telemetry::logging::LoggingOptions;
use segment_rebuild_cmd::options::GlobalOptions;
use segment_rebuild_cmd::rebuild::{self, APP_NAME};
use segment_rebuild_cmd::{start_app, EXIT_FAILURE};

#[derive(Parser)]
#[command(name = APP_NAME, version)]
struct Cli {
    #[clap(flatten)]
    global_options: GlobalOptions,

    #[clap(flatten)]
    command: rebuild::Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let opts = match cli.command.load_options(&cli.global_options) {
        Ok(opts) => opts,
        Err(e) => {
            let _guard = common_telemetry::init_global_logging(APP_NAME, &LoggingOptions::default());
            error!(e; "Failed to load options");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let mut instance = match cli.command.build(opts) {
        Ok(instance) => instance,
        Err(e) => {
            error!(e; "Failed to build {}", APP_NAME);
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    match start_app(&mut instance).await {
        Ok(()) => ExitCode::from(instance.exit_code()),
        Err(_) => ExitCode::from(EXIT_FAILURE),
    }
}
