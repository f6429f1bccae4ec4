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

use common_error::ext::{BoxedError, ErrorExt};
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

    #[snafu(display("Invalid options: {}", msg))]
    InvalidOptions {
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid table name"))]
    InvalidTableName {
        #[snafu(implicit)]
        location: Location,
        source: store_api::error::Error,
    },

    #[snafu(display("Failed to build blob store"))]
    BuildBlobStore {
        #[snafu(implicit)]
        location: Location,
        source: object_store::error::Error,
    },

    #[snafu(display("Failed to open region store"))]
    OpenRegionStore {
        #[snafu(implicit)]
        location: Location,
        source: local_store::error::Error,
    },

    #[snafu(display("Segment blob not found: {}", path))]
    BlobNotFound {
        path: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to access blob {}", path))]
    Blob {
        path: String,
        #[snafu(source)]
        error: object_store::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to decode segment bitmap {}", path))]
    DecodeBitmap {
        path: String,
        #[snafu(source)]
        error: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to encode segment bitmap"))]
    EncodeBitmap {
        #[snafu(source)]
        error: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Region store failed to {}", operation))]
    RegionStore {
        operation: String,
        #[snafu(implicit)]
        location: Location,
        source: BoxedError,
    },

    #[snafu(display("Failed to write region file {}", path.display()))]
    WriteRegionFile {
        path: PathBuf,
        #[snafu(implicit)]
        location: Location,
        source: store_api::error::Error,
    },

    #[snafu(display("Failed to access path {}", path.display()))]
    Io {
        path: PathBuf,
        #[snafu(source)]
        error: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("No artifact with tag {} under {}", tag, root.display()))]
    ArtifactNotFound {
        tag: String,
        root: PathBuf,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Artifact {} is incomplete, manifest is missing", dir.display()))]
    IncompleteArtifact {
        dir: PathBuf,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to decode artifact manifest {}", path.display()))]
    DecodeArtifactManifest {
        path: PathBuf,
        #[snafu(source)]
        error: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to encode artifact manifest"))]
    EncodeArtifactManifest {
        #[snafu(source)]
        error: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Column family directory not found: {}", dir.display()))]
    FamilyDirNotFound {
        dir: PathBuf,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "Missing region files under {}, expect at least {}, found {}",
        dir.display(),
        expected,
        actual
    ))]
    MissingRegionFiles {
        dir: PathBuf,
        expected: usize,
        actual: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Bulk load of {} failed with exit code: {}", dir.display(), exit_code))]
    IngestFailed {
        dir: PathBuf,
        exit_code: i32,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid phase: {}, valid: 1-6, all", input))]
    InvalidPhase {
        input: String,
        #[snafu(implicit)]
        location: Location,
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
            LoadOptions { source, .. } => source.status_code(),
            InvalidTableName { source, .. } | WriteRegionFile { source, .. } => {
                source.status_code()
            }
            BuildBlobStore { source, .. } => source.status_code(),
            OpenRegionStore { source, .. } => source.status_code(),
            RegionStore { source, .. } => source.status_code(),

            InvalidOptions { .. }
            | BlobNotFound { .. }
            | DecodeBitmap { .. }
            | ArtifactNotFound { .. }
            | IncompleteArtifact { .. }
            | DecodeArtifactManifest { .. }
            | FamilyDirNotFound { .. }
            | MissingRegionFiles { .. }
            | InvalidPhase { .. } => StatusCode::InvalidArguments,

            Blob { .. } | Io { .. } | IngestFailed { .. } => StatusCode::StorageUnavailable,

            EncodeBitmap { .. } | EncodeArtifactManifest { .. } | JoinTask { .. } => {
                StatusCode::Internal
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
