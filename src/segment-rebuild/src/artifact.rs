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

//! Layout of rebuild artifacts in the staging root:
//!
//! ```text
//! <root>/<tag>_<ms>/_ARTIFACT.json
//! <root>/<tag>_<ms>/<family>/region_<i>.hfile
//! ```
//!
//! The manifest is written after every region file is closed. A directory
//! without a manifest is an incomplete artifact and is never loaded.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use strum::{AsRefStr, Display};

use crate::error::{
    ArtifactNotFoundSnafu, DecodeArtifactManifestSnafu, EncodeArtifactManifestSnafu,
    IncompleteArtifactSnafu, IoSnafu, Result,
};

pub const ARTIFACT_MANIFEST: &str = "_ARTIFACT.json";
const ARTIFACT_MANIFEST_TMP: &str = "_ARTIFACT.json.tmp";

/// Extension of region files.
pub const REGION_FILE_EXT: &str = "hfile";

/// Kind of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum ArtifactTag {
    /// Puts of the old segment.
    #[strum(serialize = "v1")]
    V1,
    /// Retirement of the old segment and puts of the new one.
    #[strum(serialize = "v2")]
    V2,
}

impl ArtifactTag {
    fn dir_prefix(&self) -> String {
        format!("{}_", self.as_ref())
    }
}

pub fn region_file_name(region: usize) -> String {
    format!("region_{region}.{REGION_FILE_EXT}")
}

/// Summary of an artifact, written once all region files are closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub tag: String,
    pub family: String,
    pub region_count: usize,
    pub region_start_keys: Vec<String>,
    pub region_cells: Vec<u64>,
    pub puts: u64,
    pub deletes: u64,
    pub created_at_ms: i64,
}

/// Creates a fresh `<tag>_<ms>/<family>` directory under `root` and returns
/// the artifact directory.
pub fn create_artifact_dir(root: &Path, tag: ArtifactTag, family: &str) -> Result<PathBuf> {
    fs::create_dir_all(root).context(IoSnafu { path: root })?;

    let mut ts = chrono::Utc::now().timestamp_millis();
    let dir = loop {
        let dir = root.join(format!("{}{}", tag.dir_prefix(), ts));
        match fs::create_dir(&dir) {
            Ok(()) => break dir,
            // Another artifact of the same millisecond.
            Err(e) if e.kind() == ErrorKind::AlreadyExists => ts += 1,
            Err(e) => return Err(e).context(IoSnafu { path: dir }),
        }
    };

    let family_dir = dir.join(family);
    fs::create_dir(&family_dir).context(IoSnafu { path: family_dir })?;

    Ok(dir)
}

pub fn write_manifest(dir: &Path, manifest: &ArtifactManifest) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(manifest).context(EncodeArtifactManifestSnafu)?;
    let tmp = dir.join(ARTIFACT_MANIFEST_TMP);
    fs::write(&tmp, bytes).context(IoSnafu { path: &tmp })?;
    let path = dir.join(ARTIFACT_MANIFEST);
    fs::rename(&tmp, &path).context(IoSnafu { path })?;
    Ok(())
}

/// Reads the manifest of the artifact at `dir`.
pub fn read_manifest(dir: &Path) -> Result<ArtifactManifest> {
    let path = dir.join(ARTIFACT_MANIFEST);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return IncompleteArtifactSnafu { dir }.fail();
        }
        Err(e) => return Err(e).context(IoSnafu { path }),
    };
    serde_json::from_slice(&bytes).context(DecodeArtifactManifestSnafu { path })
}

/// Returns the most recently modified artifact directory of `tag` under
/// `root`. Ties are broken by the timestamp in the directory name.
pub fn find_latest(root: &Path, tag: ArtifactTag) -> Result<PathBuf> {
    let not_found = || {
        ArtifactNotFoundSnafu {
            tag: tag.to_string(),
            root,
        }
        .build()
    };
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(e).context(IoSnafu { path: root }),
    };

    let prefix = tag.dir_prefix();
    let mut candidates: Vec<(SystemTime, u64, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.context(IoSnafu { path: root })?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(suffix) = name.strip_prefix(&prefix) else {
            continue;
        };
        let metadata = entry.metadata().context(IoSnafu { path: entry.path() })?;
        if !metadata.is_dir() {
            continue;
        }
        let modified = metadata
            .modified()
            .context(IoSnafu { path: entry.path() })?;
        candidates.push((modified, suffix.parse().unwrap_or(0), entry.path()));
    }

    candidates
        .into_iter()
        .max()
        .map(|(_, _, path)| path)
        .context(ArtifactNotFoundSnafu {
            tag: tag.to_string(),
            root,
        })
}

#[cfg(test)]
mod tests {
    use common_test_util::temp_dir::create_temp_dir;

    use super::*;
    use crate::error::Error;

    fn manifest() -> ArtifactManifest {
        ArtifactManifest {
            tag: "v1".to_string(),
            family: "cf".to_string(),
            region_count: 1,
            region_start_keys: vec![String::new()],
            region_cells: vec![10],
            puts: 10,
            deletes: 0,
            created_at_ms: 0,
        }
    }

    #[test]
    fn test_tag_and_file_name() {
        assert_eq!("v1", ArtifactTag::V1.to_string());
        assert_eq!("v2_", ArtifactTag::V2.dir_prefix());
        assert_eq!("region_3.hfile", region_file_name(3));
    }

    #[test]
    fn test_create_artifact_dir() {
        let root = create_temp_dir("test_create_artifact_dir");
        let a = create_artifact_dir(root.path(), ArtifactTag::V1, "cf").unwrap();
        let b = create_artifact_dir(root.path(), ArtifactTag::V1, "cf").unwrap();
        assert_ne!(a, b);
        assert!(a.join("cf").is_dir());
        assert!(a
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("v1_"));
    }

    #[test]
    fn test_manifest_required() {
        let root = create_temp_dir("test_manifest_required");
        let dir = create_artifact_dir(root.path(), ArtifactTag::V2, "cf").unwrap();
        let err = read_manifest(&dir).unwrap_err();
        assert!(matches!(err, Error::IncompleteArtifact { .. }));

        write_manifest(&dir, &manifest()).unwrap();
        assert_eq!(manifest(), read_manifest(&dir).unwrap());
    }

    #[test]
    fn test_find_latest() {
        let root = create_temp_dir("test_find_latest");
        let err = find_latest(&root.path().join("missing"), ArtifactTag::V1).unwrap_err();
        assert!(matches!(err, Error::ArtifactNotFound { .. }));
        let err = find_latest(root.path(), ArtifactTag::V1).unwrap_err();
        assert!(matches!(err, Error::ArtifactNotFound { .. }));

        // Created in order, the name breaks a tie of modification times.
        fs::create_dir(root.path().join("v1_100")).unwrap();
        fs::create_dir(root.path().join("v1_200")).unwrap();
        fs::create_dir(root.path().join("v2_300")).unwrap();
        fs::write(root.path().join("v1_999"), b"not a dir").unwrap();

        assert_eq!(
            root.path().join("v1_200"),
            find_latest(root.path(), ArtifactTag::V1).unwrap()
        );
        assert_eq!(
            root.path().join("v2_300"),
            find_latest(root.path(), ArtifactTag::V2).unwrap()
        );

        // A newer directory wins.
        std::thread::sleep(std::time::Duration::from_millis(20));
        let newest = create_artifact_dir(root.path(), ArtifactTag::V1, "cf").unwrap();
        assert_eq!(newest, find_latest(root.path(), ArtifactTag::V1).unwrap());
    }
}
