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

//! Generates, publishes and loads segment membership bitmaps.

use std::time::Instant;

use common_telemetry::info;
use object_store::util::normalize_dir;
use object_store::ErrorKind;
use roaring::RoaringBitmap;
use snafu::ResultExt;

use crate::context::RebuildContextRef;
use crate::error::{BlobNotFoundSnafu, BlobSnafu, DecodeBitmapSnafu, EncodeBitmapSnafu, Result};
use crate::options::SegmentRange;

/// Name of the old segment, also the qualifier of its cells.
pub const OLD_SEGMENT: &str = "segment_v1";
/// Name of the new segment, also the qualifier of its cells.
pub const NEW_SEGMENT: &str = "segment_v2";

/// Cardinalities of the old and new segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentStats {
    pub old: u64,
    pub new: u64,
    pub overlap: u64,
    pub old_only: u64,
    pub new_only: u64,
}

impl SegmentStats {
    pub fn compute(old: &RoaringBitmap, new: &RoaringBitmap) -> Self {
        let overlap = old.intersection_len(new);
        Self {
            old: old.len(),
            new: new.len(),
            overlap,
            old_only: old.len() - overlap,
            new_only: new.len() - overlap,
        }
    }
}

/// Returns a bitmap holding every user id of `range`.
pub fn generate(range: &SegmentRange) -> RoaringBitmap {
    let mut bitmap = RoaringBitmap::new();
    if !range.is_empty() {
        // The last id is `end - 1`, which fits in u32 for a valid range.
        bitmap.insert_range(range.start as u32..=(range.end - 1) as u32);
    }
    bitmap
}

pub struct SegmentGenerator {
    ctx: RebuildContextRef,
}

impl SegmentGenerator {
    pub fn new(ctx: RebuildContextRef) -> Self {
        Self { ctx }
    }

    /// Generates both segments from the configured ranges and publishes them.
    pub async fn run(&self) -> Result<SegmentStats> {
        let segments = &self.ctx.options.segments;

        let old = self.generate_logged(OLD_SEGMENT, &segments.old);
        self.publish(&old, OLD_SEGMENT).await?;
        let new = self.generate_logged(NEW_SEGMENT, &segments.new);
        self.publish(&new, NEW_SEGMENT).await?;

        let stats = SegmentStats::compute(&old, &new);
        info!(
            "Segment stats, old: {}, new: {}, overlap: {}, old only: {}, new only: {}",
            stats.old, stats.new, stats.overlap, stats.old_only, stats.new_only
        );
        for (name, size) in self.list().await? {
            info!("Segment blob {}, size: {} bytes", name, size);
        }

        Ok(stats)
    }

    /// Lists the blobs under the segment prefix with their sizes, sorted by name.
    pub async fn list(&self) -> Result<Vec<(String, u64)>> {
        let prefix = normalize_dir(&self.ctx.options.segment_prefix);
        let store = &self.ctx.blob_store;
        let entries = store
            .list(&prefix)
            .await
            .context(BlobSnafu { path: &prefix })?;

        let mut blobs = Vec::with_capacity(entries.len());
        for entry in entries {
            if !entry.metadata().is_file() {
                continue;
            }
            let meta = store
                .stat(entry.path())
                .await
                .context(BlobSnafu { path: entry.path() })?;
            blobs.push((entry.name().to_string(), meta.content_length()));
        }
        blobs.sort();
        Ok(blobs)
    }

    fn generate_logged(&self, name: &str, range: &SegmentRange) -> RoaringBitmap {
        let start = Instant::now();
        let bitmap = generate(range);
        info!(
            "Generated segment {} [{}, {}), users: {}, cost: {:?}",
            name,
            range.start,
            range.end,
            bitmap.len(),
            start.elapsed()
        );
        bitmap
    }

    /// Serializes `bitmap` and uploads it as the blob of segment `name`,
    /// replacing any previous blob.
    pub async fn publish(&self, bitmap: &RoaringBitmap, name: &str) -> Result<()> {
        let path = self.ctx.segment_path(name);

        let start = Instant::now();
        let mut buf = Vec::with_capacity(bitmap.serialized_size());
        bitmap.serialize_into(&mut buf).context(EncodeBitmapSnafu)?;
        let serialize_cost = start.elapsed();
        let size = buf.len();

        let start = Instant::now();
        self.ctx
            .blob_store
            .write(&path, buf)
            .await
            .context(BlobSnafu { path: &path })?;
        let upload_cost = start.elapsed();

        let size_mb = size as f64 / (1024.0 * 1024.0);
        let secs = upload_cost.as_secs_f64();
        let throughput = if secs > 0.0 { size_mb / secs } else { 0.0 };
        info!(
            "Published segment {} to {}, size: {:.2} MB, serialize cost: {:?}, upload cost: {:?}, throughput: {:.2} MB/s",
            name, path, size_mb, serialize_cost, upload_cost, throughput
        );

        Ok(())
    }

    /// Downloads and decodes the blob of segment `name`.
    pub async fn load(&self, name: &str) -> Result<RoaringBitmap> {
        let path = self.ctx.segment_path(name);
        let buf = match self.ctx.blob_store.read(&path).await {
            Ok(buf) => buf,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return BlobNotFoundSnafu { path }.fail();
            }
            Err(e) => return Err(e).context(BlobSnafu { path }),
        };

        let bytes = buf.to_vec();
        let bitmap =
            RoaringBitmap::deserialize_from(bytes.as_slice()).context(DecodeBitmapSnafu {
                path: &path,
            })?;
        info!(
            "Loaded segment {} from {}, users: {}, range: {:?}..={:?}",
            name,
            path,
            bitmap.len(),
            bitmap.min(),
            bitmap.max()
        );

        Ok(bitmap)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common_test_util::temp_dir::create_temp_dir;
    use object_store::ObjectStoreConfig;

    use super::*;
    use crate::context::RebuildContext;
    use crate::error::Error;
    use crate::options::RebuildOptions;

    fn new_context(dir: &std::path::Path) -> RebuildContextRef {
        let mut options = RebuildOptions::default();
        options.blob = ObjectStoreConfig::Memory;
        options.store.data_home = dir.join("store").to_string_lossy().to_string();
        options.segments.old = SegmentRange::new(1, 501);
        options.segments.new = SegmentRange::new(101, 601);
        Arc::new(RebuildContext::from_options(options).unwrap())
    }

    #[test]
    fn test_generate() {
        assert!(generate(&SegmentRange::new(5, 5)).is_empty());

        let bitmap = generate(&SegmentRange::new(1, 50_000_001));
        assert_eq!(50_000_000, bitmap.len());
        assert_eq!(Some(1), bitmap.min());
        assert_eq!(Some(50_000_000), bitmap.max());
        // Deterministic.
        assert_eq!(bitmap, generate(&SegmentRange::new(1, 50_000_001)));

        let bitmap = generate(&SegmentRange::new(u32::MAX as u64, 1 << 32));
        assert_eq!(Some(u32::MAX), bitmap.max());
    }

    #[test]
    fn test_delta_of_default_segments() {
        let old = generate(&SegmentRange::new(1, 50_000_001));
        let new = generate(&SegmentRange::new(10_000_001, 60_000_001));

        let retire = &old - &new;
        let add = &new - &old;
        assert_eq!(10_000_000, retire.len());
        assert_eq!((Some(1), Some(10_000_000)), (retire.min(), retire.max()));
        assert_eq!(10_000_000, add.len());
        assert_eq!((Some(50_000_001), Some(60_000_000)), (add.min(), add.max()));

        let stats = SegmentStats::compute(&old, &new);
        assert_eq!(
            SegmentStats {
                old: 50_000_000,
                new: 50_000_000,
                overlap: 40_000_000,
                old_only: 10_000_000,
                new_only: 10_000_000,
            },
            stats
        );
    }

    #[tokio::test]
    async fn test_publish_and_load() {
        common_telemetry::init_default_ut_logging();
        let dir = create_temp_dir("test_publish_and_load");
        let generator = SegmentGenerator::new(new_context(dir.path()));

        for range in [
            SegmentRange::new(0, 0),
            SegmentRange::new(7, 8),
            SegmentRange::new(1, 50_000_001),
        ] {
            let bitmap = generate(&range);
            generator.publish(&bitmap, "segment_ut").await.unwrap();
            assert_eq!(bitmap, generator.load("segment_ut").await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_load_missing_or_corrupted() {
        let dir = create_temp_dir("test_load_missing_or_corrupted");
        let ctx = new_context(dir.path());
        let generator = SegmentGenerator::new(ctx.clone());

        let err = generator.load(OLD_SEGMENT).await.unwrap_err();
        assert!(matches!(err, Error::BlobNotFound { .. }), "{err:?}");

        ctx.blob_store
            .write(&ctx.segment_path(OLD_SEGMENT), b"not a bitmap".to_vec())
            .await
            .unwrap();
        let err = generator.load(OLD_SEGMENT).await.unwrap_err();
        assert!(matches!(err, Error::DecodeBitmap { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_run() {
        let dir = create_temp_dir("test_segment_run");
        let generator = SegmentGenerator::new(new_context(dir.path()));

        let stats = generator.run().await.unwrap();
        assert_eq!(500, stats.old);
        assert_eq!(400, stats.overlap);
        assert_eq!(100, stats.new_only);
        assert_eq!(500, generator.load(NEW_SEGMENT).await.unwrap().len());

        let names: Vec<_> = generator
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|(name, size)| {
                assert!(size > 0);
                name
            })
            .collect();
        assert_eq!(vec!["segment_v1.bin", "segment_v2.bin"], names);
    }
}
