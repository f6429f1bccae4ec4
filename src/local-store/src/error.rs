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
use std::path::PathBuf;

use common_error::ext::ErrorExt;
use common_error::status_code::StatusCode;
use common_macro::stack_trace_debug;
use snafu::{Location, Snafu};

#[derive(Snafu)]
#[snafu(visibility(pub))]
#[stack_trace_debug]
pub enum Error {
    #[snafu(display("Table not found: {}", table))]
    TableNotFound {
        table: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Column family {} not found in table {}", family, table))]
    FamilyNotFound {
        family: String,
        table: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid table descriptor of {}", table))]
    InvalidTable {
        table: String,
        #[snafu(implicit)]
        location: Location,
        source: store_api::error::Error,
    },

    #[snafu(display("Table {} has no column family", table))]
    NoFamily {
        table: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to access path {}", path.display()))]
    Io {
        path: PathBuf,
        #[snafu(source)]
        error: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to decode manifest {}", path.display()))]
    DecodeManifest {
        path: PathBuf,
        #[snafu(source)]
        error: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to encode manifest"))]
    EncodeManifest {
        #[snafu(source)]
        error: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to read region file {}", path.display()))]
    ReadSst {
        path: PathBuf,
        #[snafu(implicit)]
        location: Location,
        source: store_api::error::Error,
    },

    #[snafu(display("Failed to join blocking task"))]
    JoinTask {
        #[snafu(source)]
        error: tokio::task::JoinError,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl ErrorExt for Error {
    fn status_code(&self) -> StatusCode {
        use Error::*;

        match self {
            TableNotFound { .. } => StatusCode::TableNotFound,
            FamilyNotFound { .. } => StatusCode::TableColumnNotFound,
            InvalidTable { .. } | NoFamily { .. } => StatusCode::InvalidArguments,
            Io { .. } | ReadSst { .. } => StatusCode::StorageUnavailable,
            DecodeManifest { .. } => StatusCode::Unexpected,
            EncodeManifest { .. } | JoinTask { .. } => StatusCode::Internal,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
