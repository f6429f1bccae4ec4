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

use async_trait::async_trait;
use common_telemetry::{error, info};

pub mod error;
pub mod options;
pub mod rebuild;

/// Exit code of a run that completed and passed verification.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code of a run whose options or phases failed.
pub const EXIT_FAILURE: u8 = 1;
/// Exit code of a run that completed with verification mismatches.
pub const EXIT_VALIDATION_FAILURE: u8 = 2;

#[async_trait]
pub trait App: Send {
    fn name(&self) -> &str;

    async fn start(&mut self) -> error::Result<()>;

    async fn stop(&self) -> error::Result<()>;
}

/// Runs `app` until it finishes or the process receives ctrl-c.
pub async fn start_app(app: &mut dyn App) -> error::Result<()> {
    let name = app.name().to_string();

    tokio::select! {
        result = app.start() => {
            if let Err(err) = &result {
                error!(err; "Failed to run app {name}!");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            if let Err(err) = app.stop().await {
                error!(err; "Failed to stop app {name}!");
            }
            info!("Goodbye!");
            error::InterruptedSnafu.fail()
        }
    }
}

pub fn log_versions(app_name: &str) {
    info!("{} version: {}", app_name, env!("CARGO_PKG_VERSION"));

    log_env_flags();
}

fn log_env_flags() {
    info!("command line arguments");
    for argument in std::env::args() {
        info!("argument: {}", argument);
    }
}
