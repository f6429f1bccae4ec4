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
    #[snafu(display("Region boundary list is empty"))]
    EmptyBoundaries {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Region boundaries are not sorted at index {}", index))]
    UnsortedBoundaries {
        index: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid table name: {}", name))]
    InvalidTableName {
        name: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Cell out of order, previous: {}, current: {}", prev, current))]
    OutOfOrder {
        prev: String,
        current: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Family mismatch, expect: {}, actual: {}", expected, actual))]
    FamilyMismatch {
        expected: String,
        actual: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Field {} is too long, len: {}, max: {}", field, len, max))]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Unexpected magic: {:?}", magic))]
    UnexpectedMagic {
        magic: [u8; 4],
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("File is too small to hold a footer, size: {}", size))]
    FileTooSmall {
        size: u64,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "Unexpected offset {} and size {} in a file of {} bytes",
        offset,
        size,
        file_size
    ))]
    UnexpectedOffsetSize {
        offset: u64,
        size: u64,
        file_size: u64,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Corrupted data: {}", reason))]
    Corrupted {
        reason: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to encode metadata"))]
    EncodeMeta {
        #[snafu(source)]
        error: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to decode metadata"))]
    DecodeMeta {
        #[snafu(source)]
        error: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("IO error"))]
    Io {
        #[snafu(source)]
        error: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl ErrorExt for Error {
    fn status_code(&self) -> StatusCode {
        use Error::*;

        match self {
            EmptyBoundaries { .. }
            | UnsortedBoundaries { .. }
            | InvalidTableName { .. }
            | OutOfOrder { .. }
            | FamilyMismatch { .. }
            | FieldTooLong { .. } => StatusCode::InvalidArguments,

            UnexpectedMagic { .. }
            | FileTooSmall { .. }
            | UnexpectedOffsetSize { .. }
            | Corrupted { .. }
            | DecodeMeta { .. } => StatusCode::Unexpected,

            EncodeMeta { .. } => StatusCode::Internal,

            Io { .. } => StatusCode::StorageUnavailable,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
