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

//! Writes segment membership as region-aligned sorted files.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use common_telemetry::{debug, info};
use futures::future::try_join_all;
use roaring::RoaringBitmap;
use snafu::ResultExt;
use store_api::cell::Cell;
use store_api::region::RegionBoundaries;
use store_api::row_key::encode_row_key;
use store_api::sst::{create_file, SstInfo};

use crate::artifact::{
    create_artifact_dir, region_file_name, write_manifest, ArtifactManifest, ArtifactTag,
};
use crate::context::RebuildContextRef;
use crate::error::{JoinTaskSnafu, RegionStoreSnafu, Result, WriteRegionFileSnafu};
use crate::segment::{SegmentGenerator, NEW_SEGMENT, OLD_SEGMENT};

/// Value of a membership cell, a big endian `1i32`.
pub fn membership_value() -> Vec<u8> {
    1i32.to_be_bytes().to_vec()
}

/// What to write for each member.
#[derive(Debug, Clone)]
pub enum IndexPlan {
    /// A put of the old qualifier for every member.
    Insert { members: RoaringBitmap },
    /// A delete marker of the old qualifier for members of `old`, and a put of
    /// the new qualifier for members of `new`. The delete precedes the put.
    Retire {
        old: RoaringBitmap,
        new: RoaringBitmap,
    },
}

impl IndexPlan {
    /// Splits the plan into one plan per range of `ranges`, which must be
    /// ordered and non-overlapping.
    fn split(&self, ranges: &[Range<u64>]) -> Vec<IndexPlan> {
        match self {
            IndexPlan::Insert { members } => split_bitmap(members, ranges)
                .into_iter()
                .map(|members| IndexPlan::Insert { members })
                .collect(),
            IndexPlan::Retire { old, new } => split_bitmap(old, ranges)
                .into_iter()
                .zip(split_bitmap(new, ranges))
                .map(|(old, new)| IndexPlan::Retire { old, new })
                .collect(),
        }
    }

    fn tag(&self) -> ArtifactTag {
        match self {
            IndexPlan::Insert { .. } => ArtifactTag::V1,
            IndexPlan::Retire { .. } => ArtifactTag::V2,
        }
    }
}

/// Distributes the members of `bitmap` over `ranges` in a single pass.
/// Members outside every range are dropped.
fn split_bitmap(bitmap: &RoaringBitmap, ranges: &[Range<u64>]) -> Vec<RoaringBitmap> {
    let mut parts = vec![RoaringBitmap::new(); ranges.len()];
    let mut region = 0;
    for user_id in bitmap {
        let id = u64::from(user_id);
        while region < ranges.len() && ranges[region].end <= id {
            region += 1;
        }
        let Some(range) = ranges.get(region) else {
            break;
        };
        if range.contains(&id) {
            // Members are visited in ascending order.
            parts[region].push(user_id);
        }
    }
    parts
}

/// Parameters shared by all region writers of one artifact.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub family: String,
    pub block_size: usize,
    pub put_timestamp: u64,
    pub delete_timestamp: u64,
}

/// Result of one region file.
#[derive(Debug, Clone)]
pub struct RegionFileReport {
    pub region: usize,
    pub path: PathBuf,
    pub cells: u64,
    pub puts: u64,
    pub deletes: u64,
    pub file_size: u64,
}

impl RegionFileReport {
    fn new(region: usize, path: PathBuf, info: SstInfo) -> Self {
        Self {
            region,
            path,
            cells: info.meta.cell_count,
            puts: info.meta.put_count,
            deletes: info.meta.delete_count,
            file_size: info.file_size,
        }
    }
}

/// Result of an artifact.
#[derive(Debug, Clone)]
pub struct IndexWriteReport {
    pub dir: PathBuf,
    pub regions: Vec<RegionFileReport>,
}

impl IndexWriteReport {
    pub fn puts(&self) -> u64 {
        self.regions.iter().map(|r| r.puts).sum()
    }

    pub fn deletes(&self) -> u64 {
        self.regions.iter().map(|r| r.deletes).sum()
    }

    pub fn cells(&self) -> u64 {
        self.regions.iter().map(|r| r.cells).sum()
    }
}

/// Writes the cells of `plan` restricted to one region into `path`.
fn write_region(path: &Path, opts: &WriteOptions, plan: &IndexPlan) -> Result<SstInfo> {
    let mut writer = create_file(path, opts.family.as_str(), opts.block_size)
        .context(WriteRegionFileSnafu { path })?;
    let family = opts.family.as_str();

    match plan {
        IndexPlan::Insert { members } => {
            for user_id in members {
                let cell = Cell::put(
                    encode_row_key(user_id),
                    family,
                    OLD_SEGMENT,
                    opts.put_timestamp,
                    membership_value(),
                );
                writer.append(&cell).context(WriteRegionFileSnafu { path })?;
            }
        }
        IndexPlan::Retire { old, new } => {
            for user_id in &(old | new) {
                let row = encode_row_key(user_id);
                if old.contains(user_id) {
                    let cell = Cell::delete_column(
                        row.clone(),
                        family,
                        OLD_SEGMENT,
                        opts.delete_timestamp,
                    );
                    writer.append(&cell).context(WriteRegionFileSnafu { path })?;
                }
                if new.contains(user_id) {
                    let cell = Cell::put(
                        row,
                        family,
                        NEW_SEGMENT,
                        opts.put_timestamp,
                        membership_value(),
                    );
                    writer.append(&cell).context(WriteRegionFileSnafu { path })?;
                }
            }
        }
    }

    writer.finish().context(WriteRegionFileSnafu { path })
}

/// Writes one file per region of `boundaries` into a fresh artifact directory
/// under `root`, one blocking task per region, then writes the manifest.
pub async fn write_region_files(
    root: &Path,
    boundaries: &RegionBoundaries,
    plan: IndexPlan,
    opts: WriteOptions,
) -> Result<IndexWriteReport> {
    let tag = plan.tag();
    let dir = create_artifact_dir(root, tag, &opts.family)?;
    let family_dir = dir.join(&opts.family);
    let opts = Arc::new(opts);

    let ranges = boundaries.user_id_ranges();
    let tasks = plan
        .split(&ranges)
        .into_iter()
        .zip(ranges)
        .enumerate()
        .map(|(region, (region_plan, range))| {
            let path = family_dir.join(region_file_name(region));
            let opts = opts.clone();
            async move {
                let info = tokio::task::spawn_blocking({
                    let path = path.clone();
                    move || write_region(&path, &opts, &region_plan)
                })
                .await
                .context(JoinTaskSnafu)??;
                debug!(
                    "Closed region file {}, users: [{}, {}), cells: {}",
                    path.display(),
                    range.start,
                    range.end,
                    info.meta.cell_count
                );
                Ok(RegionFileReport::new(region, path, info))
            }
        })
        .collect::<Vec<_>>();
    let regions = try_join_all(tasks).await?;

    let report = IndexWriteReport { dir, regions };
    write_manifest(
        &report.dir,
        &ArtifactManifest {
            tag: tag.to_string(),
            family: opts.family.clone(),
            region_count: boundaries.num_regions(),
            region_start_keys: boundaries
                .start_keys()
                .iter()
                .map(|k| String::from_utf8_lossy(k).to_string())
                .collect(),
            region_cells: report.regions.iter().map(|r| r.cells).collect(),
            puts: report.puts(),
            deletes: report.deletes(),
            created_at_ms: chrono::Utc::now().timestamp_millis(),
        },
    )?;

    Ok(report)
}

/// Generates the region files of the old and new segments.
pub struct IndexFileWriter {
    ctx: RebuildContextRef,
    segments: SegmentGenerator,
}

impl IndexFileWriter {
    pub fn new(ctx: RebuildContextRef) -> Self {
        let segments = SegmentGenerator::new(ctx.clone());
        Self { ctx, segments }
    }

    /// Writes puts of every member of the old segment.
    pub async fn write_old(&self) -> Result<IndexWriteReport> {
        let members = self.segments.load(OLD_SEGMENT).await?;
        self.write(IndexPlan::Insert { members }).await
    }

    /// Writes delete markers retiring the old segment and puts of the new one.
    pub async fn write_new(&self) -> Result<IndexWriteReport> {
        let old = self.segments.load(OLD_SEGMENT).await?;
        let new = self.segments.load(NEW_SEGMENT).await?;
        info!(
            "Segment delta, to add: {}, to retire: {}, union: {}",
            new.difference_len(&old),
            old.difference_len(&new),
            old.union_len(&new)
        );
        self.write(IndexPlan::Retire { old, new }).await
    }

    async fn write(&self, plan: IndexPlan) -> Result<IndexWriteReport> {
        let start = Instant::now();
        let boundaries = self
            .ctx
            .region_store
            .region_boundaries(&self.ctx.table)
            .await
            .context(RegionStoreSnafu {
                operation: "get region boundaries",
            })?;
        info!(
            "Writing {} region files of table {}",
            boundaries.num_regions(),
            self.ctx.table
        );

        let options = &self.ctx.options;
        let report = write_region_files(
            self.ctx.staging_root(),
            &boundaries,
            plan,
            WriteOptions {
                family: self.ctx.family().to_string(),
                block_size: options.staging.block_size,
                put_timestamp: options.rebuild.put_timestamp,
                delete_timestamp: options.rebuild.delete_timestamp,
            },
        )
        .await?;

        for region in &report.regions {
            debug!(
                "Region {}: cells: {}, bytes: {}",
                region.region, region.cells, region.file_size
            );
        }
        info!(
            "Wrote region files under {}, regions: {}, puts: {}, deletes: {}, total: {}, cost: {:?}",
            report.dir.display(),
            report.regions.len(),
            report.puts(),
            report.deletes(),
            report.cells(),
            start.elapsed()
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use common_test_util::temp_dir::create_temp_dir;
    use store_api::cell::OpType;
    use store_api::sst::open_file;

    use store_api::row_key::USER_ID_SPACE;

    use super::*;
    use crate::artifact::read_manifest;

    fn write_options() -> WriteOptions {
        WriteOptions {
            family: "cf".to_string(),
            block_size: 256,
            put_timestamp: 1,
            delete_timestamp: 1,
        }
    }

    fn boundaries(split_ids: &[u32]) -> RegionBoundaries {
        RegionBoundaries::with_split_keys(split_ids.iter().map(|id| encode_row_key(*id)).collect())
            .unwrap()
    }

    fn read_cells(path: &Path) -> Vec<Cell> {
        open_file(path)
            .unwrap()
            .into_cells()
            .collect::<store_api::error::Result<Vec<_>>>()
            .unwrap()
    }

    fn assert_sorted(cells: &[Cell]) {
        for pair in cells.windows(2) {
            assert!(pair[0].sort_key() <= pair[1].sort_key(), "{:?}", pair);
        }
    }

    #[test]
    fn test_split_bitmap() {
        let bitmap: RoaringBitmap = (0..100).chain([u32::MAX]).collect();
        let ranges = vec![0..10, 10..10, 10..20, 20..USER_ID_SPACE];
        let parts = split_bitmap(&bitmap, &ranges);
        assert_eq!(
            vec![10, 0, 10, 81],
            parts.iter().map(|p| p.len()).collect::<Vec<_>>()
        );
        assert!(parts[3].contains(u32::MAX));

        // Members past the last range are dropped.
        let parts = split_bitmap(&bitmap, &[0..10, 10..50]);
        assert_eq!(50, parts.iter().map(|p| p.len()).sum::<u64>());

        let parts = split_bitmap(&RoaringBitmap::new(), &ranges);
        assert!(parts.iter().all(|p| p.is_empty()));
    }

    #[tokio::test]
    async fn test_write_insert_plan() {
        let root = create_temp_dir("test_write_insert_plan");
        let members: RoaringBitmap = (1..1001).collect();
        let boundaries = boundaries(&[300, 600]);

        let report = write_region_files(
            root.path(),
            &boundaries,
            IndexPlan::Insert { members },
            write_options(),
        )
        .await
        .unwrap();

        assert_eq!(3, report.regions.len());
        assert_eq!(1000, report.puts());
        assert_eq!(0, report.deletes());
        assert_eq!(
            vec![299, 300, 401],
            report.regions.iter().map(|r| r.cells).collect::<Vec<_>>()
        );

        for region in &report.regions {
            let cells = read_cells(&region.path);
            assert_sorted(&cells);
            for cell in &cells {
                assert_eq!(region.region, boundaries.locate(&cell.row));
                assert_eq!(OpType::Put, cell.op_type);
                assert_eq!(OLD_SEGMENT.as_bytes(), cell.qualifier.as_slice());
                assert_eq!(membership_value(), cell.value);
            }
        }

        let manifest = read_manifest(&report.dir).unwrap();
        assert_eq!("v1", manifest.tag);
        assert_eq!(3, manifest.region_count);
        assert_eq!(vec![299, 300, 401], manifest.region_cells);
    }

    #[tokio::test]
    async fn test_write_retire_plan() {
        let root = create_temp_dir("test_write_retire_plan");
        let old: RoaringBitmap = (1..501).collect();
        let new: RoaringBitmap = (101..601).collect();
        let boundaries = boundaries(&[50, 550]);

        let report = write_region_files(
            root.path(),
            &boundaries,
            IndexPlan::Retire { old, new },
            write_options(),
        )
        .await
        .unwrap();
        assert_eq!(500, report.puts());
        assert_eq!(500, report.deletes());

        let mut all = Vec::new();
        for region in &report.regions {
            let cells = read_cells(&region.path);
            assert_sorted(&cells);
            for cell in &cells {
                assert_eq!(region.region, boundaries.locate(&cell.row));
            }
            all.extend(cells);
        }

        // User 300 is in both segments, the delete precedes the put.
        let row = encode_row_key(300);
        let cells: Vec<_> = all.iter().filter(|c| c.row == row).collect();
        assert_eq!(2, cells.len());
        assert_eq!(OpType::DeleteColumn, cells[0].op_type);
        assert_eq!(OLD_SEGMENT.as_bytes(), cells[0].qualifier.as_slice());
        assert_eq!(OpType::Put, cells[1].op_type);
        assert_eq!(NEW_SEGMENT.as_bytes(), cells[1].qualifier.as_slice());

        // User 50 is only retired, user 580 is only added.
        let row = encode_row_key(50);
        assert_eq!(1, all.iter().filter(|c| c.row == row).count());
        let row = encode_row_key(580);
        let cells: Vec<_> = all.iter().filter(|c| c.row == row).collect();
        assert_eq!(1, cells.len());
        assert_eq!(OpType::Put, cells[0].op_type);
    }

    #[tokio::test]
    async fn test_write_empty_bitmap() {
        let root = create_temp_dir("test_write_empty_bitmap");
        let boundaries = boundaries(&[100, 200, 300]);
        let report = write_region_files(
            root.path(),
            &boundaries,
            IndexPlan::Insert {
                members: RoaringBitmap::new(),
            },
            write_options(),
        )
        .await
        .unwrap();

        assert_eq!(4, report.regions.len());
        assert_eq!(0, report.cells());
        for region in &report.regions {
            assert!(region.path.exists());
            assert!(read_cells(&region.path).is_empty());
        }
    }

    /// Sparse pseudo random ids from a linear congruential generator.
    fn random_bitmap(seed: u64, count: usize) -> RoaringBitmap {
        let mut state = seed;
        (0..count)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 32) as u32
            })
            .collect()
    }

    #[tokio::test]
    async fn test_write_random_bitmaps_with_raw_boundaries() {
        let root = create_temp_dir("test_write_random_bitmaps_with_raw_boundaries");
        let mut old = random_bitmap(7, 20_000);
        old.insert(0);
        old.insert(u32::MAX);
        let new = random_bitmap(11, 5_000);
        // Start keys that are not row keys, including a duplicate.
        let boundaries = RegionBoundaries::new(
            [
                "",
                "a",
                "user_00000000125",
                "user_1",
                "user_1",
                "user_3999999999x",
                "z",
            ]
            .iter()
            .map(|k| k.as_bytes().to_vec())
            .collect(),
        )
        .unwrap();

        let report = write_region_files(
            root.path(),
            &boundaries,
            IndexPlan::Retire {
                old: old.clone(),
                new: new.clone(),
            },
            write_options(),
        )
        .await
        .unwrap();

        assert_eq!(7, report.regions.len());
        assert_eq!(old.len() + new.len(), report.cells());
        assert_eq!(old.len(), report.deletes());
        assert_eq!(new.len(), report.puts());

        let mut total = 0;
        for region in &report.regions {
            let cells = read_cells(&region.path);
            assert_sorted(&cells);
            for cell in &cells {
                assert_eq!(region.region, boundaries.locate(&cell.row));
            }
            total += cells.len() as u64;
        }
        assert_eq!(old.len() + new.len(), total);
        // The duplicated start key leaves one region empty.
        assert_eq!(0, report.regions[3].cells);
    }
}
