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

use std::fmt;

use strum::{AsRefStr, EnumString};

/// Status code shared by every crate of the rebuild job, grouped by range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
pub enum StatusCode {
    Success = 0,

    // ====== Common: 1000 - 1999 ======
    Unknown = 1000,
    Unsupported = 1001,
    /// Probably a bug.
    Unexpected = 1002,
    Internal = 1003,
    /// Bad options, phase selectors, blobs or artifacts.
    InvalidArguments = 1004,
    Cancelled = 1005,

    // ====== Table: 4000 - 4999 ======
    TableAlreadyExists = 4000,
    TableNotFound = 4001,
    /// The column family does not exist.
    TableColumnNotFound = 4002,

    // ====== Storage: 5000 - 5999 ======
    /// The blob store, the staging directory or the region store failed.
    StorageUnavailable = 5000,
    /// The table changed under a request.
    RequestOutdated = 5001,
}

impl StatusCode {
    /// Whether rerunning the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StatusCode::StorageUnavailable | StatusCode::Internal)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
