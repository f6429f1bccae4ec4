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

pub use tempfile::{NamedTempFile, TempDir};

/// Creates a temp dir whose name starts with `prefix`. The dir is removed on drop.
pub fn create_temp_dir(prefix: &str) -> TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .unwrap()
}

/// Creates a named temp file. The file is removed on drop.
pub fn create_named_temp_file() -> NamedTempFile {
    tempfile::Builder::new().tempfile().unwrap()
}
