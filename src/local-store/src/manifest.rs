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

//! Per table catalog persisted as `manifest.json` under the table directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use store_api::region_store::TableName;

use crate::error::{DecodeManifestSnafu, EncodeManifestSnafu, IoSnafu, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_TMP_FILE: &str = "manifest.json.tmp";

/// An ingested region file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub family: String,
    /// Path relative to the table directory.
    pub file_name: String,
    /// Sequence of the ingest that added the file. Later ingests win ties.
    pub sequence: u64,
    pub cell_count: u64,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableManifest {
    pub name: TableName,
    pub families: Vec<String>,
    pub split_keys: Vec<Vec<u8>>,
    pub files: Vec<FileEntry>,
    pub next_sequence: u64,
}

impl TableManifest {
    pub fn new(name: TableName, families: Vec<String>, split_keys: Vec<Vec<u8>>) -> Self {
        Self {
            name,
            families,
            split_keys,
            files: Vec::new(),
            next_sequence: 1,
        }
    }

    pub fn has_family(&self, family: &str) -> bool {
        self.families.iter().any(|f| f == family)
    }

    /// Files of `family` in ingest order.
    pub fn family_files(&self, family: &str) -> impl Iterator<Item = &FileEntry> {
        let family = family.to_string();
        self.files.iter().filter(move |f| f.family == family)
    }
}

/// Loads the manifest under `table_dir`, `None` if the table doesn't exist.
pub fn load_manifest(table_dir: &Path) -> Result<Option<TableManifest>> {
    let path = table_dir.join(MANIFEST_FILE);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).context(IoSnafu { path }),
    };
    let manifest = serde_json::from_slice(&bytes).context(DecodeManifestSnafu { path })?;
    Ok(Some(manifest))
}

/// Replaces the manifest under `table_dir`. Readers observe either the old
/// or the new manifest.
pub fn save_manifest(table_dir: &Path, manifest: &TableManifest) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(manifest).context(EncodeManifestSnafu)?;
    let tmp_path: PathBuf = table_dir.join(MANIFEST_TMP_FILE);
    fs::write(&tmp_path, bytes).context(IoSnafu { path: &tmp_path })?;
    let path = table_dir.join(MANIFEST_FILE);
    fs::rename(&tmp_path, &path).context(IoSnafu { path })?;
    Ok(())
}
