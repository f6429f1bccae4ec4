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

use std::ops::Range;

use common_config::error::InvalidConfigSnafu;
use common_config::Configurable;
use common_telemetry::logging::LoggingOptions;
use object_store::ObjectStoreConfig;
use serde::{Deserialize, Serialize};
use snafu::ensure;
use store_api::region_store::TableName;
use store_api::row_key::{encode_row_key, USER_ID_SPACE};

/// Prefix of environment variables overriding options.
pub const ENV_PREFIX: &str = "SEGMENT_REBUILD";

/// Options of the rebuild job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RebuildOptions {
    pub logging: LoggingOptions,
    /// Blob store holding the serialized segment bitmaps.
    pub blob: ObjectStoreConfig,
    /// Directory of segment blobs in the blob store.
    pub segment_prefix: String,
    pub store: StoreOptions,
    pub staging: StagingOptions,
    pub segments: SegmentsOptions,
    pub rebuild: RebuildMarkerOptions,
    pub verify: VerifyOptions,
}

impl Default for RebuildOptions {
    fn default() -> Self {
        Self {
            logging: LoggingOptions::default(),
            blob: ObjectStoreConfig::default(),
            segment_prefix: "segments".to_string(),
            store: StoreOptions::default(),
            staging: StagingOptions::default(),
            segments: SegmentsOptions::default(),
            rebuild: RebuildMarkerOptions::default(),
            verify: VerifyOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreOptions {
    /// Root directory of the bundled region store.
    pub data_home: String,
    /// Target table, `namespace:table`.
    pub table: String,
    pub column_family: String,
    /// Explicit start keys of regions 1..n used when creating the table.
    pub split_keys: Vec<String>,
    /// Pre-splits the segment id space evenly into this many regions when
    /// `split_keys` is empty. `0` or `1` keeps a single region.
    pub pre_split_regions: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            data_home: "/tmp/segment_rebuild/store".to_string(),
            table: "hulk:segment_index".to_string(),
            column_family: "cf".to_string(),
            split_keys: Vec::new(),
            pre_split_regions: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StagingOptions {
    /// Directory holding the `v1_<ms>` and `v2_<ms>` artifacts.
    pub root: String,
    /// Target data block size of region files.
    pub block_size: usize,
}

impl Default for StagingOptions {
    fn default() -> Self {
        Self {
            root: "/tmp/segment_rebuild/staging".to_string(),
            block_size: store_api::sst::DEFAULT_BLOCK_SIZE,
        }
    }
}

/// A half-open range of user ids.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentRange {
    pub start: u64,
    pub end: u64,
}

impl SegmentRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn as_range(&self) -> Range<u64> {
        self.start..self.end
    }

    pub fn contains(&self, user_id: u32) -> bool {
        self.as_range().contains(&(user_id as u64))
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Membership of the old and the new segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SegmentsOptions {
    pub old: SegmentRange,
    pub new: SegmentRange,
}

impl Default for SegmentsOptions {
    fn default() -> Self {
        Self {
            old: SegmentRange::new(1, 50_000_001),
            new: SegmentRange::new(10_000_001, 60_000_001),
        }
    }
}

/// Timestamps of the cells written by the rebuild.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RebuildMarkerOptions {
    pub put_timestamp: u64,
    /// Timestamp of the delete markers retiring the old segment. Must not be
    /// less than `put_timestamp`, otherwise the old puts stay visible.
    pub delete_timestamp: u64,
}

impl Default for RebuildMarkerOptions {
    fn default() -> Self {
        Self {
            put_timestamp: 1,
            delete_timestamp: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerifyOptions {
    pub sample_user_ids: Vec<u32>,
    pub scan_limit: usize,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            sample_user_ids: vec![
                // Old segment only.
                1,
                100_000,
                5_000_000,
                10_000_000,
                // Both segments.
                10_000_001,
                20_000_000,
                30_000_000,
                40_000_000,
                50_000_000,
                // New segment only.
                50_000_001,
                55_000_000,
                60_000_000,
            ],
            scan_limit: 100_000,
        }
    }
}

impl RebuildOptions {
    pub fn table_name(&self) -> store_api::error::Result<TableName> {
        self.store.table.parse()
    }

    /// Start keys of regions 1..n of the target table.
    pub fn split_keys(&self) -> Vec<Vec<u8>> {
        if !self.store.split_keys.is_empty() {
            return self
                .store
                .split_keys
                .iter()
                .map(|k| k.as_bytes().to_vec())
                .collect();
        }

        let regions = self.store.pre_split_regions as u64;
        if regions <= 1 {
            return Vec::new();
        }
        let SegmentsOptions { old, new } = &self.segments;
        let lo = old.start.min(new.start);
        let hi = old.end.max(new.end).min(USER_ID_SPACE);
        let step = hi.saturating_sub(lo) / regions;
        if step == 0 {
            return Vec::new();
        }
        (1..regions)
            .map(|i| encode_row_key((lo + step * i) as u32))
            .collect()
    }
}

impl Configurable for RebuildOptions {
    fn env_list_keys() -> Option<&'static [&'static str]> {
        Some(&["store.split_keys", "verify.sample_user_ids"])
    }

    fn validate_sanitize(&mut self) -> common_config::error::Result<()> {
        let invalid = |msg: String| InvalidConfigSnafu { msg }.build();

        ensure!(
            self.rebuild.delete_timestamp >= self.rebuild.put_timestamp,
            InvalidConfigSnafu {
                msg: format!(
                    "rebuild.delete_timestamp {} must not be less than rebuild.put_timestamp {}",
                    self.rebuild.delete_timestamp, self.rebuild.put_timestamp
                ),
            }
        );
        for (name, range) in [("old", &self.segments.old), ("new", &self.segments.new)] {
            if range.start > range.end || range.end > USER_ID_SPACE {
                return Err(invalid(format!(
                    "segments.{name} [{}, {}) is not a range of user ids",
                    range.start, range.end
                )));
            }
        }
        self.table_name()
            .map_err(|e| invalid(format!("store.table: {e}")))?;
        let family = &self.store.column_family;
        if family.is_empty() || family.len() > u8::MAX as usize || family.starts_with(['_', '.']) {
            return Err(invalid(format!("store.column_family {family:?} is invalid")));
        }
        if self.staging.block_size == 0 {
            return Err(invalid("staging.block_size must be positive".to_string()));
        }
        if !self.store.split_keys.is_empty() && self.store.pre_split_regions > 1 {
            return Err(invalid(
                "store.split_keys and store.pre_split_regions are exclusive".to_string(),
            ));
        }
        if self.store.split_keys.windows(2).any(|w| w[0] > w[1]) {
            return Err(invalid("store.split_keys must be sorted".to_string()));
        }
        if self.segment_prefix.is_empty() {
            return Err(invalid("segment_prefix must not be empty".to_string()));
        }

        Ok(())
    }
}
