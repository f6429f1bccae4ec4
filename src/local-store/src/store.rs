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
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use common_error::ext::BoxedError;
use common_telemetry::{debug, info, warn};
use snafu::{ensure, OptionExt, ResultExt};
use store_api::region::RegionBoundaries;
use store_api::region_store::{RegionStore, RowResult, TableDescriptor, TableName};
use store_api::sst::open_file;
use tokio::sync::Mutex;

use crate::error::{
    FamilyNotFoundSnafu, InvalidTableSnafu, IoSnafu, JoinTaskSnafu, NoFamilySnafu, ReadSstSnafu,
    Result, TableNotFoundSnafu,
};
use crate::manifest::{load_manifest, save_manifest, FileEntry, TableManifest};
use crate::merge::{BoxedCellIter, RowMerger};
use crate::resolve::{resolve_row, SequencedCell};

/// Exit code of a successful ingest.
pub const INGEST_OK: i32 = 0;
/// Exit code of an ingest rejected by validation. Nothing is committed.
pub const INGEST_INVALID: i32 = 1;

/// A [RegionStore] keeping tables under a local directory:
///
/// ```text
/// <data_home>/<namespace>/<table>/manifest.json
/// <data_home>/<namespace>/<table>/<family>/<sequence>_<file>
/// ```
#[derive(Debug, Clone)]
pub struct LocalStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    data_home: PathBuf,
    /// Serializes table creation and ingest.
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Opens a store rooted at `data_home`, creating the directory if absent.
    pub fn open(data_home: impl Into<PathBuf>) -> Result<Self> {
        let data_home = data_home.into();
        fs::create_dir_all(&data_home).context(IoSnafu { path: &data_home })?;
        info!("Opened local store at {}", data_home.display());

        Ok(Self {
            inner: Arc::new(Inner {
                data_home,
                write_lock: Mutex::new(()),
            }),
        })
    }

    pub fn data_home(&self) -> &Path {
        &self.inner.data_home
    }

    fn table_dir(&self, table: &TableName) -> PathBuf {
        self.inner
            .data_home
            .join(&table.namespace)
            .join(&table.table)
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .context(JoinTaskSnafu)?
    }

    pub async fn create_table(&self, desc: &TableDescriptor) -> Result<bool> {
        let _guard = self.inner.write_lock.lock().await;
        let table_dir = self.table_dir(&desc.name);
        let desc = desc.clone();
        self.run_blocking(move || create_table_blocking(&table_dir, desc))
            .await
    }

    pub async fn boundaries(&self, table: &TableName) -> Result<RegionBoundaries> {
        let manifest = self.manifest(table).await?;
        RegionBoundaries::with_split_keys(manifest.split_keys).context(InvalidTableSnafu {
            table: table.to_string(),
        })
    }

    pub async fn ingest(&self, dir: &Path, table: &TableName) -> Result<i32> {
        let _guard = self.inner.write_lock.lock().await;
        let table_dir = self.table_dir(table);
        let dir = dir.to_path_buf();
        let table = table.clone();
        self.run_blocking(move || ingest_blocking(&dir, &table_dir, &table))
            .await
    }

    pub async fn get_row(
        &self,
        table: &TableName,
        row: &[u8],
        family: &str,
        qualifiers: &[Vec<u8>],
    ) -> Result<RowResult> {
        let manifest = self.manifest(table).await?;
        let files = family_files(&manifest, family)?;
        let table_dir = self.table_dir(table);
        let row = row.to_vec();
        let qualifiers = qualifiers.to_vec();

        self.run_blocking(move || {
            let mut cells = Vec::new();
            for entry in files {
                let path = table_dir.join(&entry.file_name);
                let mut reader = open_file(&path).context(ReadSstSnafu { path: &path })?;
                let row_cells = reader.get_row(&row).context(ReadSstSnafu { path: &path })?;
                cells.extend(row_cells.into_iter().map(|cell| SequencedCell {
                    cell,
                    sequence: entry.sequence,
                }));
            }
            let mut columns = resolve_row(cells);
            if !qualifiers.is_empty() {
                columns.retain(|c| qualifiers.contains(&c.qualifier));
            }
            Ok(RowResult { row, columns })
        })
        .await
    }

    pub async fn scan_rows(
        &self,
        table: &TableName,
        family: &str,
        limit: usize,
    ) -> Result<Vec<RowResult>> {
        let manifest = self.manifest(table).await?;
        let files = family_files(&manifest, family)?;
        let table_dir = self.table_dir(table);

        self.run_blocking(move || {
            let mut sources = Vec::with_capacity(files.len());
            for entry in &files {
                let path = table_dir.join(&entry.file_name);
                let reader = open_file(&path).context(ReadSstSnafu { path: &path })?;
                let cells: BoxedCellIter = Box::new(reader.into_cells());
                sources.push((entry.sequence, cells));
            }

            let mut merger = RowMerger::new(sources).context(ReadSstSnafu {
                path: table_dir.clone(),
            })?;
            let mut rows = Vec::new();
            while rows.len() < limit {
                let Some((row, cells)) = merger.next_row().context(ReadSstSnafu {
                    path: table_dir.clone(),
                })?
                else {
                    break;
                };
                let columns = resolve_row(cells);
                if !columns.is_empty() {
                    rows.push(RowResult { row, columns });
                }
            }
            Ok(rows)
        })
        .await
    }

    async fn manifest(&self, table: &TableName) -> Result<TableManifest> {
        let table_dir = self.table_dir(table);
        let name = table.to_string();
        self.run_blocking(move || {
            load_manifest(&table_dir)?.context(TableNotFoundSnafu { table: name })
        })
        .await
    }
}

fn family_files(manifest: &TableManifest, family: &str) -> Result<Vec<FileEntry>> {
    ensure!(
        manifest.has_family(family),
        FamilyNotFoundSnafu {
            family,
            table: manifest.name.to_string(),
        }
    );
    Ok(manifest.family_files(family).cloned().collect())
}

fn create_table_blocking(table_dir: &Path, desc: TableDescriptor) -> Result<bool> {
    if load_manifest(table_dir)?.is_some() {
        debug!("Table {} already exists", desc.name);
        return Ok(false);
    }

    let table = desc.name.to_string();
    ensure!(!desc.families.is_empty(), NoFamilySnafu { table: &table });
    RegionBoundaries::with_split_keys(desc.split_keys.clone())
        .context(InvalidTableSnafu { table: &table })?;

    fs::create_dir_all(table_dir).context(IoSnafu { path: table_dir })?;
    for family in &desc.families {
        let family_dir = table_dir.join(family);
        fs::create_dir_all(&family_dir).context(IoSnafu { path: family_dir })?;
    }
    let num_regions = desc.split_keys.len() + 1;
    save_manifest(
        table_dir,
        &TableManifest::new(desc.name, desc.families, desc.split_keys),
    )?;
    info!("Created table {}, regions: {}", table, num_regions);

    Ok(true)
}

/// Whether a directory entry takes part in an ingest. Names starting with `_`
/// or `.` are bookkeeping files.
fn is_data_entry(name: &str) -> bool {
    !name.starts_with('_') && !name.starts_with('.')
}

fn list_dir(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).context(IoSnafu { path: dir })? {
        let entry = entry.context(IoSnafu { path: dir })?;
        let name = entry.file_name().to_string_lossy().to_string();
        if is_data_entry(&name) {
            entries.push((name, entry.path()));
        }
    }
    entries.sort();
    Ok(entries)
}

struct StagedFile {
    family: String,
    name: String,
    path: PathBuf,
    cell_count: u64,
    file_size: u64,
}

fn ingest_blocking(dir: &Path, table_dir: &Path, table: &TableName) -> Result<i32> {
    let start = Instant::now();
    let mut manifest = load_manifest(table_dir)?.context(TableNotFoundSnafu {
        table: table.to_string(),
    })?;

    // Validates every file before touching the table.
    let mut staged = Vec::new();
    for (family, family_path) in list_dir(dir)? {
        if !family_path.is_dir() {
            continue;
        }
        if !manifest.has_family(&family) {
            warn!(
                "Rejected ingest of {} into {}, unknown family {}",
                dir.display(),
                table,
                family
            );
            return Ok(INGEST_INVALID);
        }
        for (name, path) in list_dir(&family_path)? {
            let reader = match open_file(&path) {
                Ok(reader) => reader,
                Err(e) => {
                    warn!(e; "Rejected ingest into {}, invalid region file {}", table, path.display());
                    return Ok(INGEST_INVALID);
                }
            };
            if reader.meta().family != family {
                warn!(
                    "Rejected ingest into {}, file {} belongs to family {}",
                    table,
                    path.display(),
                    reader.meta().family
                );
                return Ok(INGEST_INVALID);
            }
            staged.push(StagedFile {
                family: family.clone(),
                name,
                path,
                cell_count: reader.meta().cell_count,
                file_size: reader.file_size(),
            });
        }
    }

    if staged.is_empty() {
        warn!("No region file found under {}", dir.display());
        return Ok(INGEST_OK);
    }

    let sequence = manifest.next_sequence;
    let mut total_size = 0;
    for file in staged {
        let file_name = format!("{}/{}_{}", file.family, sequence, file.name);
        let target = table_dir.join(&file_name);
        fs::create_dir_all(table_dir.join(&file.family)).context(IoSnafu { path: table_dir })?;
        fs::copy(&file.path, &target).context(IoSnafu { path: &file.path })?;
        total_size += file.file_size;
        manifest.files.push(FileEntry {
            family: file.family,
            file_name,
            sequence,
            cell_count: file.cell_count,
            file_size: file.file_size,
        });
    }
    manifest.next_sequence += 1;
    save_manifest(table_dir, &manifest)?;

    info!(
        "Ingested {} into {}, sequence: {}, bytes: {}, cost: {:?}",
        dir.display(),
        table,
        sequence,
        total_size,
        start.elapsed()
    );

    Ok(INGEST_OK)
}

#[async_trait]
impl RegionStore for LocalStore {
    async fn create_table_if_not_exists(
        &self,
        desc: &TableDescriptor,
    ) -> std::result::Result<bool, BoxedError> {
        self.create_table(desc).await.map_err(BoxedError::new)
    }

    async fn region_boundaries(
        &self,
        table: &TableName,
    ) -> std::result::Result<RegionBoundaries, BoxedError> {
        self.boundaries(table).await.map_err(BoxedError::new)
    }

    async fn bulk_ingest(
        &self,
        dir: &Path,
        table: &TableName,
    ) -> std::result::Result<i32, BoxedError> {
        self.ingest(dir, table).await.map_err(BoxedError::new)
    }

    async fn get(
        &self,
        table: &TableName,
        row: &[u8],
        family: &str,
        qualifiers: &[Vec<u8>],
    ) -> std::result::Result<RowResult, BoxedError> {
        self.get_row(table, row, family, qualifiers)
            .await
            .map_err(BoxedError::new)
    }

    async fn scan(
        &self,
        table: &TableName,
        family: &str,
        limit: usize,
    ) -> std::result::Result<Vec<RowResult>, BoxedError> {
        self.scan_rows(table, family, limit)
            .await
            .map_err(BoxedError::new)
    }
}
