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

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use common_telemetry::info;
use snafu::{ensure, ResultExt};

use crate::artifact::{find_latest, read_manifest, ArtifactTag, REGION_FILE_EXT};
use crate::context::RebuildContextRef;
use crate::error::{
    FamilyDirNotFoundSnafu, IngestFailedSnafu, IoSnafu, MissingRegionFilesSnafu,
    RegionStoreSnafu, Result,
};

/// Result of a bulk load.
#[derive(Debug, Clone)]
pub struct BulkLoadReport {
    pub dir: PathBuf,
    pub files: usize,
    pub total_bytes: u64,
    pub elapsed: Duration,
}

impl BulkLoadReport {
    pub fn throughput_mb_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_bytes as f64 / (1024.0 * 1024.0) / secs
        } else {
            0.0
        }
    }
}

/// Lists the region files of a family directory with their sizes.
fn list_region_files(family_dir: &Path) -> Result<Vec<(PathBuf, u64)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(family_dir).context(IoSnafu { path: family_dir })? {
        let entry = entry.context(IoSnafu { path: family_dir })?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(REGION_FILE_EXT) {
            continue;
        }
        let metadata = entry.metadata().context(IoSnafu { path: &path })?;
        if metadata.is_file() {
            files.push((path, metadata.len()));
        }
    }
    files.sort();
    Ok(files)
}

/// Ingests artifacts written by the index file writer into the region store.
pub struct BulkLoader {
    ctx: RebuildContextRef,
}

impl BulkLoader {
    pub fn new(ctx: RebuildContextRef) -> Self {
        Self { ctx }
    }

    /// Returns the most recently modified artifact of `tag`.
    pub fn find_latest(&self, tag: ArtifactTag) -> Result<PathBuf> {
        find_latest(self.ctx.staging_root(), tag)
    }

    /// Loads the newest artifact of `tag`.
    pub async fn load_latest(&self, tag: ArtifactTag) -> Result<BulkLoadReport> {
        let dir = self.find_latest(tag)?;
        info!("Found latest {} artifact: {}", tag, dir.display());
        self.load(&dir).await
    }

    /// Validates the artifact at `dir` and ingests it in one call.
    pub async fn load(&self, dir: &Path) -> Result<BulkLoadReport> {
        let manifest = read_manifest(dir)?;
        let family_dir = self.ctx.family_dir(dir);
        ensure!(
            family_dir.is_dir(),
            FamilyDirNotFoundSnafu { dir: &family_dir }
        );

        let files = list_region_files(&family_dir)?;
        ensure!(
            files.len() >= manifest.region_count,
            MissingRegionFilesSnafu {
                dir: &family_dir,
                expected: manifest.region_count,
                actual: files.len(),
            }
        );
        let total_bytes = files.iter().map(|(_, size)| size).sum();
        info!(
            "Loading {} into {}, files: {}, size: {:.2} MB, puts: {}, deletes: {}",
            dir.display(),
            self.ctx.table,
            files.len(),
            total_bytes as f64 / (1024.0 * 1024.0),
            manifest.puts,
            manifest.deletes
        );

        let start = Instant::now();
        let exit_code = self
            .ctx
            .region_store
            .bulk_ingest(dir, &self.ctx.table)
            .await
            .context(RegionStoreSnafu {
                operation: "bulk ingest",
            })?;
        ensure!(exit_code == 0, IngestFailedSnafu { dir, exit_code });

        let report = BulkLoadReport {
            dir: dir.to_path_buf(),
            files: files.len(),
            total_bytes,
            elapsed: start.elapsed(),
        };
        info!(
            "Loaded {}, cost: {:?}, throughput: {:.2} MB/s",
            dir.display(),
            report.elapsed,
            report.throughput_mb_per_sec()
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use common_test_util::temp_dir::create_temp_dir;

    use super::*;

    #[test]
    fn test_list_region_files() {
        let dir = create_temp_dir("test_list_region_files");
        fs::write(dir.path().join("region_1.hfile"), b"abc").unwrap();
        fs::write(dir.path().join("region_0.hfile"), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"abcd").unwrap();
        fs::create_dir(dir.path().join("nested.hfile")).unwrap();

        let files = list_region_files(dir.path()).unwrap();
        assert_eq!(
            vec![
                (dir.path().join("region_0.hfile"), 1),
                (dir.path().join("region_1.hfile"), 3)
            ],
            files
        );
    }

    #[test]
    fn test_throughput() {
        let report = BulkLoadReport {
            dir: PathBuf::new(),
            files: 1,
            total_bytes: 2 * 1024 * 1024,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(1.0, report.throughput_mb_per_sec());
        let report = BulkLoadReport {
            elapsed: Duration::ZERO,
            ..report
        };
        assert_eq!(0.0, report.throughput_mb_per_sec());
    }
}
