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

use opendal::{ErrorKind, Operator};

/// Returns whether `path` exists, mapping `NotFound` to `false`.
pub async fn exists(store: &Operator, path: &str) -> Result<bool, opendal::Error> {
    match store.stat(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Creates the directory `dir` if it is absent. Idempotent.
pub async fn ensure_dir(store: &Operator, dir: &str) -> Result<(), opendal::Error> {
    let dir = normalize_dir(dir);
    if exists(store, &dir).await? {
        return Ok(());
    }
    store.create_dir(&dir).await
}

/// Appends a trailing `/` unless present.
pub fn normalize_dir(dir: &str) -> String {
    if dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{dir}/")
    }
}

/// Joins `name` under `prefix` into a normalized relative key, e.g.
/// `segments` and `segment_v1.bin` give `segments/segment_v1.bin`.
///
/// Duplicated and leading `/` are removed. A trailing `/` is kept.
pub fn join_path(prefix: &str, name: &str) -> String {
    opendal::raw::normalize_path(&format!("{prefix}/{name}"))
}
