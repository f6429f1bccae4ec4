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

use std::any::Any;

use common_error::ext::ErrorExt;
use common_error::status_code::StatusCode;
use common_macro::stack_trace_debug;
use snafu::{Location, Snafu};

#[derive(Snafu)]
#[snafu(visibility(pub))]
#[stack_trace_debug]
pub enum Error {
    #[snafu(display("Failed to load options"))]
    LoadOptions {
        #[snafu(implicit)]
        location: Location,
        source: common_config::error::Error,
    },

    #[snafu(display("Invalid phase selector"))]
    ParsePhase {
        #[snafu(implicit)]
        location: Location,
        source: segment_rebuild::error::Error,
    },

    #[snafu(display("Failed to build rebuild context"))]
    BuildContext {
        #[snafu(implicit)]
        location: Location,
        source: segment_rebuild::error::Error,
    },

    #[snafu(display("Segment rebuild failed"))]
    Rebuild {
        #[snafu(implicit)]
        location: Location,
        source: segment_rebuild::error::Error,
    },

    #[snafu(display("Interrupted by signal"))]
    Interrupted {
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl ErrorExt for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::LoadOptions { source, .. } => source.status_code(),
            Error::ParsePhase { source, .. }
            | Error::BuildContext { source, .. }
            | Error::Rebuild { source, .. } => source.status_code(),
            Error::Interrupted { .. } => StatusCode::Cancelled,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
